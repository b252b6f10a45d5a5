//! `carledger`: operator CLI for the tiered record store.
//!
//! The tier topology comes from the environment (`ENVIRONMENT`,
//! `CARLEDGER_REMOTE_URL`, ...; see `StoreConfig`). Subcommands:
//!
//! - **`tiers`**: print each chain's tiers and probe their health.
//! - **`user`**: register, look up, list, patch and delete users, and drive
//!   shop applications.
//! - **`vehicle`**: the same for vehicles.
//! - **`expense`**: record, list, summarise, patch and delete expenses.
//!
//! Results are printed to stdout as pretty JSON. When a stronger tier was
//! skipped, a warning line naming the serving tier goes to stderr. Logs go
//! to stderr too, filtered by `RUST_LOG`.

use std::process;

use carledger::{
    ExpenseCategory, ExpenseEntry, ExpensePatch, ShopApplication, ShopStatus, UserPatch,
    UserRecord, UserType, Vehicle, VehiclePatch,
};
use carledger_storage::{
    degraded_notice, DeleteScope, Durability, Environment, LookupResult, Records, StorageError,
    StoreConfig, TierFailure,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};

/// carledger: tiered record store CLI
///
/// Reads and writes users, vehicles and expenses through the remote, local
/// and in-memory tiers configured for the current environment.
#[derive(Parser)]
#[command(name = "carledger", version, about, long_about = None)]
struct Cli {
    /// Override the ENVIRONMENT variable: production | development | test
    #[arg(long = "env", global = true, value_name = "ENV")]
    environment: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every chain's tiers with their probed reachability.
    Tiers,

    /// Manage users and shop applications.
    #[command(subcommand)]
    User(UserCommand),

    /// Manage vehicles.
    #[command(subcommand)]
    Vehicle(VehicleCommand),

    /// Manage expenses.
    #[command(subcommand)]
    Expense(ExpenseCommand),
}

/// Delete from the serving tier only, or from every tier.
#[derive(Args)]
struct DeleteArgs {
    /// Record id.
    id: String,

    /// Remove the copy in every tier instead of only the serving one.
    #[arg(long)]
    everywhere: bool,
}

impl DeleteArgs {
    fn scope(&self) -> DeleteScope {
        if self.everywhere {
            DeleteScope::EveryTier
        } else {
            DeleteScope::ServingTier
        }
    }
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a new customer account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Pre-computed password hash.
        #[arg(long, value_name = "HASH")]
        password_hash: String,
        /// CUSTOMER | SHOP | ADMIN
        #[arg(long = "type", value_name = "TYPE", default_value = "CUSTOMER")]
        user_type: UserType,
    },

    /// Look a user up by id or by email.
    Get {
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        id: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// List every user across all tiers.
    List,

    /// Patch a user's fields.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_name = "HASH")]
        password_hash: Option<String>,
        #[arg(long = "type", value_name = "TYPE")]
        user_type: Option<UserType>,
    },

    /// Delete a user.
    Delete(DeleteArgs),

    /// File a shop application for a user.
    ApplyShop {
        id: String,
        #[arg(long)]
        shop_name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        business_number: Option<String>,
    },

    /// Approve, reject or reopen a shop application.
    ReviewShop {
        id: String,
        /// APPROVED | REJECTED | PENDING
        decision: ShopStatus,
        #[arg(long)]
        note: Option<String>,
    },

    /// List users holding a shop application.
    Applications {
        /// Only applications in this status.
        #[arg(long)]
        status: Option<ShopStatus>,
    },
}

#[derive(Subcommand)]
enum VehicleCommand {
    /// Register a vehicle for an existing user.
    Add {
        #[arg(long, value_name = "USER_ID")]
        owner: String,
        #[arg(long)]
        plate: String,
        #[arg(long)]
        make: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_name = "KM")]
        mileage: Option<u64>,
        /// Free-form attribute, repeatable: --attr color=white
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attributes: Vec<String>,
    },

    /// Look a vehicle up by id or by license plate.
    Get {
        #[arg(long, conflicts_with = "plate", required_unless_present = "plate")]
        id: Option<String>,
        #[arg(long)]
        plate: Option<String>,
    },

    /// List vehicles, optionally only one owner's.
    List {
        #[arg(long, value_name = "USER_ID")]
        owner: Option<String>,
    },

    /// Patch a vehicle's fields.
    Update {
        id: String,
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_name = "KM")]
        mileage: Option<u64>,
        /// Set an attribute (KEY=VALUE) or remove it (KEY=), repeatable.
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attributes: Vec<String>,
    },

    /// Delete a vehicle.
    Delete(DeleteArgs),
}

#[derive(Subcommand)]
enum ExpenseCommand {
    /// Record an expense against one of the user's vehicles.
    Add {
        #[arg(long, value_name = "USER_ID")]
        user: String,
        #[arg(long, value_name = "VEHICLE_ID")]
        car: String,
        /// fuel | maintenance | repair | insurance | tax | parking | toll | wash | other
        #[arg(long)]
        category: ExpenseCategory,
        /// Amount in minor currency units.
        #[arg(long, value_name = "CENTS")]
        amount: i64,
        /// Spend date, YYYY-MM-DD.
        #[arg(long, value_name = "DATE")]
        date: NaiveDate,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "KM")]
        mileage: Option<u64>,
    },

    /// List a user's expenses, oldest first.
    List {
        #[arg(long, value_name = "USER_ID")]
        user: String,
        #[arg(long, value_name = "VEHICLE_ID")]
        car: Option<String>,
    },

    /// Category totals from the authoritative tier.
    Summary {
        #[arg(long, value_name = "USER_ID")]
        user: String,
        #[arg(long, value_name = "VEHICLE_ID")]
        car: Option<String>,
    },

    /// Patch an expense.
    Update {
        id: String,
        #[arg(long)]
        category: Option<ExpenseCategory>,
        #[arg(long, value_name = "CENTS")]
        amount: Option<i64>,
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "KM")]
        mileage: Option<u64>,
    },

    /// Delete an expense.
    Delete(DeleteArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carledger_storage=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().unwrap_or_else(|e| fatal(&e.to_string()));
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    let records = Records::from_config(&config);

    match cli.command {
        Command::Tiers => {
            let status = records.probe().await;
            print_json(&serde_json::json!({
                "environment": config.environment.to_string(),
                "chains": status,
            }));
        }
        Command::User(cmd) => run_user(&records, cmd).await,
        Command::Vehicle(cmd) => run_vehicle(&records, cmd).await,
        Command::Expense(cmd) => run_expense(&records, cmd).await,
    }
}

async fn run_user(records: &Records, cmd: UserCommand) {
    match cmd {
        UserCommand::Register {
            email,
            name,
            password_hash,
            user_type,
        } => {
            let mut user = UserRecord::new(email, name, password_hash);
            user.user_type = user_type;
            let written = or_fatal(records.register_user(&user).await);
            warn_degraded(written.source, &written.warnings);
            print_json(&written.record);
        }
        UserCommand::Get { id, email } => {
            let found = match (id, email) {
                (Some(id), _) => records.user_by_id(&id).await,
                (None, Some(email)) => records.user_by_email(&email).await,
                (None, None) => fatal("pass --id or --email"),
            };
            print_found(or_fatal(found));
        }
        UserCommand::List => {
            let list = or_fatal(records.list_users().await);
            warn_skipped(&list.warnings);
            print_json(&list.items);
        }
        UserCommand::Update {
            id,
            name,
            password_hash,
            user_type,
        } => {
            let patch = UserPatch {
                name,
                password_hash,
                user_type,
                ..Default::default()
            };
            let updated = or_fatal(records.update_user(&id, patch).await);
            warn_degraded(updated.source, &updated.warnings);
            print_json(&updated.record);
        }
        UserCommand::Delete(args) => {
            let deleted = or_fatal(records.delete_user(&args.id, args.scope()).await);
            warn_skipped(&deleted.warnings);
            print_json(&deleted);
        }
        UserCommand::ApplyShop {
            id,
            shop_name,
            address,
            phone,
            business_number,
        } => {
            let mut application = ShopApplication::new(shop_name, address, phone);
            application.business_number = business_number;
            let updated = or_fatal(records.apply_for_shop(&id, application).await);
            warn_degraded(updated.source, &updated.warnings);
            print_json(&updated.record);
        }
        UserCommand::ReviewShop { id, decision, note } => {
            let updated = or_fatal(records.review_shop_application(&id, decision, note).await);
            warn_degraded(updated.source, &updated.warnings);
            print_json(&updated.record);
        }
        UserCommand::Applications { status } => {
            let list = or_fatal(records.list_shop_applications(status).await);
            warn_skipped(&list.warnings);
            print_json(&list.items);
        }
    }
}

async fn run_vehicle(records: &Records, cmd: VehicleCommand) {
    match cmd {
        VehicleCommand::Add {
            owner,
            plate,
            make,
            model,
            year,
            mileage,
            attributes,
        } => {
            let mut vehicle = Vehicle::new(owner, plate, make, model);
            vehicle.year = year;
            vehicle.mileage_km = mileage.unwrap_or(0);
            vehicle.attributes = parse_attributes(&attributes, false);
            let written = or_fatal(records.add_vehicle(&vehicle).await);
            warn_degraded(written.source, &written.warnings);
            print_json(&written.record);
        }
        VehicleCommand::Get { id, plate } => {
            let found = match (id, plate) {
                (Some(id), _) => records.vehicle_by_id(&id).await,
                (None, Some(plate)) => records.vehicle_by_plate(&plate).await,
                (None, None) => fatal("pass --id or --plate"),
            };
            print_found(or_fatal(found));
        }
        VehicleCommand::List { owner } => {
            let list = or_fatal(records.list_vehicles(owner.as_deref()).await);
            warn_skipped(&list.warnings);
            print_json(&list.items);
        }
        VehicleCommand::Update {
            id,
            make,
            model,
            year,
            mileage,
            attributes,
        } => {
            let patch = VehiclePatch {
                make,
                model,
                year,
                mileage_km: mileage,
                attributes: parse_attributes(&attributes, true),
                ..Default::default()
            };
            let updated = or_fatal(records.update_vehicle(&id, patch).await);
            warn_degraded(updated.source, &updated.warnings);
            print_json(&updated.record);
        }
        VehicleCommand::Delete(args) => {
            let deleted = or_fatal(records.delete_vehicle(&args.id, args.scope()).await);
            warn_skipped(&deleted.warnings);
            print_json(&deleted);
        }
    }
}

async fn run_expense(records: &Records, cmd: ExpenseCommand) {
    match cmd {
        ExpenseCommand::Add {
            user,
            car,
            category,
            amount,
            date,
            description,
            mileage,
        } => {
            let mut expense = ExpenseEntry::new(user, car, category, amount, date);
            expense.description = description;
            expense.mileage_km = mileage;
            let written = or_fatal(records.add_expense(&expense).await);
            warn_degraded(written.source, &written.warnings);
            print_json(&written.record);
        }
        ExpenseCommand::List { user, car } => {
            let list = or_fatal(records.list_expenses(&user, car.as_deref()).await);
            warn_skipped(&list.warnings);
            print_json(&list.items);
        }
        ExpenseCommand::Summary { user, car } => {
            let summary = or_fatal(records.expense_summary(&user, car.as_deref()).await);
            warn_degraded(summary.served_by, &summary.warnings);
            print_json(&summary);
        }
        ExpenseCommand::Update {
            id,
            category,
            amount,
            date,
            description,
            mileage,
        } => {
            let patch = ExpensePatch {
                category,
                amount_cents: amount,
                description,
                mileage_km: mileage,
                spent_on: date,
            };
            let updated = or_fatal(records.update_expense(&id, patch).await);
            warn_degraded(updated.source, &updated.warnings);
            print_json(&updated.record);
        }
        ExpenseCommand::Delete(args) => {
            let deleted = or_fatal(records.delete_expense(&args.id, args.scope()).await);
            warn_skipped(&deleted.warnings);
            print_json(&deleted);
        }
    }
}

/// Parse repeated `KEY=VALUE` arguments. Values that parse as JSON (numbers,
/// booleans) keep their type; anything else is a string. With `allow_remove`,
/// `KEY=` becomes `null`, which a merge patch treats as removal.
fn parse_attributes(raw: &[String], allow_remove: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for item in raw {
        let (key, value) = item.split_once('=').unwrap_or_else(|| {
            fatal(&format!("invalid --attr {item:?}: expected KEY=VALUE"))
        });
        let value = if value.is_empty() && allow_remove {
            Value::Null
        } else {
            serde_json::from_str::<Value>(value)
                .ok()
                .filter(|v| v.is_number() || v.is_boolean())
                .unwrap_or_else(|| Value::String(value.to_string()))
        };
        out.insert(key.trim().to_string(), value);
    }
    out
}

fn print_found<T: Serialize>(found: Option<LookupResult<T>>) {
    match found {
        Some(found) => {
            warn_degraded(found.served_by, &found.warnings);
            print_json(&found.record);
        }
        None => {
            eprintln!("carledger: not found");
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => fatal(&format!("failed to encode output: {e}")),
    }
}

fn warn_degraded(source: Durability, warnings: &[TierFailure]) {
    if let Some(notice) = degraded_notice(source, warnings) {
        eprintln!("carledger: warning: {notice}");
    }
}

fn warn_skipped(warnings: &[TierFailure]) {
    for w in warnings {
        eprintln!("carledger: warning: {w}");
    }
}

fn or_fatal<T>(result: Result<T, StorageError>) -> T {
    match result {
        Ok(value) => value,
        Err(StorageError::NotFound) => {
            eprintln!("carledger: not found");
            process::exit(1);
        }
        Err(e) => fatal(&e.to_string()),
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("carledger: {msg}");
    process::exit(2);
}
