//! Tier composition per environment.
//!
//! | Environment | Chain |
//! |-------------|-------|
//! | `production` | remote, memory |
//! | `development` | remote, local, memory |
//! | `test` | memory |
//!
//! Backends that cannot be provisioned (no remote URL, an unopenable
//! SQLite file) still take their slot in the chain and report
//! unavailable on every call, so the cascade skips them.

use std::sync::Arc;

use carledger::Entity;
use tracing::{info, warn};

use crate::chain::TierChain;
use crate::config::{Environment, StoreConfig};
use crate::storage::memory::MemoryTier;
use crate::storage::remote::{RemoteClient, RemoteTier};
use crate::storage::sqlite::{self, SharedConnection, SqliteTier};
use crate::storage::Durability;

/// Which tiers, strongest first, each chain gets in `environment`.
pub fn tiers_for(environment: Environment) -> &'static [Durability] {
    match environment {
        Environment::Production => &[Durability::DurableRemote, Durability::VolatileMemory],
        Environment::Development => &[
            Durability::DurableRemote,
            Durability::DurableLocal,
            Durability::VolatileMemory,
        ],
        Environment::Test => &[Durability::VolatileMemory],
    }
}

/// Backends shared by every chain of one process: one HTTP client and one
/// SQLite connection. Each chain gets its own in-memory tier.
pub struct Topology {
    environment: Environment,
    remote: Result<RemoteClient, String>,
    local: Result<SharedConnection, String>,
}

impl Topology {
    /// Provision the backends `config` asks for. Never fails: a backend
    /// that cannot be set up is recorded as unavailable.
    pub fn from_config(config: &StoreConfig) -> Self {
        let tiers = tiers_for(config.environment);

        let remote = if !tiers.contains(&Durability::DurableRemote) {
            Err("remote tier not used".to_string())
        } else {
            match &config.remote_url {
                None => {
                    warn!("storage: CARLEDGER_REMOTE_URL not set, remote tier unavailable");
                    Err("remote tier not configured".to_string())
                }
                Some(url) => RemoteClient::new(
                    url.clone(),
                    config.remote_key.clone(),
                    config.remote_timeout,
                )
                .map(|client| {
                    info!("storage: remote tier at {url}");
                    client
                })
                .map_err(|e| {
                    warn!("storage: remote client setup failed: {e}");
                    e.to_string()
                }),
            }
        };

        let local = if !tiers.contains(&Durability::DurableLocal) {
            Err("local tier not used".to_string())
        } else {
            sqlite::open_shared(&config.local_db)
                .map(|conn| {
                    info!("storage: SQLite at {}", config.local_db);
                    conn
                })
                .map_err(|e| {
                    warn!("storage: cannot open {}: {e}", config.local_db);
                    format!("cannot open {}: {e}", config.local_db)
                })
        };

        let names: Vec<_> = tiers.iter().map(|t| t.short_name()).collect();
        info!(
            "storage: {} topology [{}]",
            config.environment,
            names.join(", ")
        );

        Self {
            environment: config.environment,
            remote,
            local,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn tiers(&self) -> &'static [Durability] {
        tiers_for(self.environment)
    }

    /// Build the chain for records of type `T`.
    pub fn chain<T: Entity>(&self) -> TierChain<T> {
        let mut chain = TierChain::<T>::new();
        for &durability in self.tiers() {
            chain = match durability {
                Durability::DurableRemote => {
                    let tier = match &self.remote {
                        Ok(client) => RemoteTier::<T>::new(client.clone()),
                        Err(_) => RemoteTier::unconfigured(),
                    };
                    chain.with_tier(durability, Arc::new(tier))
                }
                Durability::DurableLocal => {
                    let tier = match &self.local {
                        Ok(conn) => {
                            SqliteTier::<T>::from_shared(conn.clone()).unwrap_or_else(|e| {
                                warn!("storage: cannot create {} table: {e}", T::COLLECTION);
                                SqliteTier::unavailable(e.to_string())
                            })
                        }
                        Err(reason) => SqliteTier::unavailable(reason.clone()),
                    };
                    chain.with_tier(durability, Arc::new(tier))
                }
                Durability::VolatileMemory => {
                    chain.with_tier(durability, Arc::new(MemoryTier::<T>::new()))
                }
            };
        }
        chain
    }
}
