use cashplan::api::{PlannerDefaults, run_http_server};
use cashplan::core::{
    Pillar, PillarNumber, PlannerError, TaxDeadline, apply_targets, calculate_annual_taxes,
    compute_targets, generate_deadlines, suggest_allocation,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "cashplan",
    about = "Freelancer cash planner: flat-rate taxes, monthly forecast and savings pillars"
)]
struct Cli {
    #[arg(short, long, global = true, help = "Log at debug level")]
    verbose: bool,
    #[command(flatten)]
    defaults: PlannerDefaults,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print the tax breakdown for a year and the payment calendar it produces
    Taxes {
        #[arg(long)]
        income: Decimal,
        #[arg(long)]
        year: i32,
    },
    /// Suggest how to split a surplus across the four pillars
    Allocate {
        #[arg(long)]
        surplus: Decimal,
        #[arg(long, help = "Average monthly spending used for pillar targets")]
        avg_monthly_expense: Decimal,
        #[arg(long, default_value = "0")]
        liquidity_balance: Decimal,
        #[arg(long, default_value = "0")]
        emergency_balance: Decimal,
        #[arg(long, default_value = "0")]
        planned_balance: Decimal,
        #[arg(long, default_value = "0")]
        investments_balance: Decimal,
        #[arg(long, help = "Date targets are computed from, e.g. 2026-01-01")]
        as_of: NaiveDate,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG > --verbose > info
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let outcome = match cli.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port, cli.defaults).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
            return;
        }
        Command::Taxes { income, year } => taxes(&cli.defaults, income, year),
        Command::Allocate {
            surplus,
            avg_monthly_expense,
            liquidity_balance,
            emergency_balance,
            planned_balance,
            investments_balance,
            as_of,
        } => allocate(
            &cli.defaults,
            surplus,
            avg_monthly_expense,
            [
                liquidity_balance,
                emergency_balance,
                planned_balance,
                investments_balance,
            ],
            as_of,
        ),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), PlannerError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PlannerError::InvalidConfiguration(format!("cannot render output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn taxes(defaults: &PlannerDefaults, income: Decimal, year: i32) -> Result<(), PlannerError> {
    let settings = defaults.tax_settings(year);
    let breakdown = calculate_annual_taxes(income, &settings)?;
    let next_year = DeadlineCalendar {
        year: year + 1,
        deadlines: generate_deadlines(
            year + 1,
            &breakdown,
            &defaults.tax_settings(year + 1),
            &[],
        )?,
    };
    print_json(&breakdown)?;
    print_json(&next_year)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadlineCalendar {
    year: i32,
    deadlines: Vec<TaxDeadline>,
}

fn allocate(
    defaults: &PlannerDefaults,
    surplus: Decimal,
    avg_monthly_expense: Decimal,
    balances: [Decimal; 4],
    as_of: NaiveDate,
) -> Result<(), PlannerError> {
    let targets = compute_targets(&defaults.profile(), avg_monthly_expense, &[], &[], as_of)?;
    let mut pillars: Vec<Pillar> = PillarNumber::ALL
        .into_iter()
        .zip(balances)
        .map(|(number, balance)| Pillar::new(number, balance, None))
        .collect();
    apply_targets(&mut pillars, &targets);
    print_json(&suggest_allocation(surplus, &pillars)?)
}
