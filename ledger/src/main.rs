use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recurring_ledger::backend::domain::commands::projection::ProjectAccountCommand;
use recurring_ledger::backend::domain::{BatchTrigger, Clock, SystemClock};
use recurring_ledger::{initialize_backend, LedgerConfig};

#[derive(Parser, Debug)]
#[command(name = "recurring-ledger")]
#[command(about = "Apply, audit and project recurring debits and incomes", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply every rule due on a date (today by default)
    Batch {
        /// Date to process, YYYY-MM-DD
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Record the run as an administrator-triggered batch
        #[arg(long)]
        manual: bool,

        /// Identity recorded on the task run
        #[arg(long)]
        by: Option<String>,
    },
    /// Simulate an account's balance over the coming months
    Project {
        #[arg(long)]
        account: String,

        /// First day of the projection, YYYY-MM-DD (today by default)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Number of months, 1 to 60
        #[arg(long, default_value_t = 12)]
        months: u32,

        #[arg(long)]
        no_debits: bool,

        #[arg(long)]
        no_incomes: bool,
    },
    /// Budget summary and recently applied occurrences of an account
    Summary {
        #[arg(long)]
        account: String,
    },
    /// Check an account's stored balance against its ledger
    Verify {
        #[arg(long)]
        account: String,
    },
    /// Show the most recent task runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = LedgerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    info!("Opening ledger at {}", config.database_url);
    let state = initialize_backend(&config).await?;

    match args.command {
        Commands::Batch { as_of, manual, by } => {
            let trigger = if manual { BatchTrigger::Manual } else { BatchTrigger::Scheduled };
            let as_of = as_of.unwrap_or_else(|| SystemClock.today());
            let summary = state.transaction_processor.run_daily_batch(as_of, trigger, by).await?;
            print_json(&summary)
        }
        Commands::Project {
            account,
            start,
            months,
            no_debits,
            no_incomes,
        } => {
            let command = ProjectAccountCommand {
                account_id: account,
                start_date: start.unwrap_or_else(|| SystemClock.today()),
                months,
                include_debits: !no_debits,
                include_incomes: !no_incomes,
            };
            let projection = state.projection_service.project(command).await?;
            print_json(&projection)
        }
        Commands::Summary { account } => {
            let budget = state.budget_summary_service.summarize(&account).await?;
            let automatic = state.budget_summary_service.automatic_summary(&account, None, None).await?;
            print_json(&serde_json::json!({ "budget": budget, "automatic": automatic }))
        }
        Commands::Verify { account } => {
            let check = state.balance_service.verify(&account).await?;
            print_json(&check)
        }
        Commands::Runs { limit } => {
            let runs = state.task_audit_service.list_recent(limit).await?;
            print_json(&runs)
        }
    }
}
