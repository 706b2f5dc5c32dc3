use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nftopt::scenario::{self, Scenario, ScenarioReport};
use nftopt_ledger::{format_units, parse_units, DEFAULT_DECIMALS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nftopt")]
#[command(about = "NFT option sellers vault", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a vault epoch scenario from a TOML file
    Run {
        scenario: String,
        /// Print the full report and event log as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a decimal amount to scaled units and back
    Units {
        value: String,
        #[arg(long, default_value_t = DEFAULT_DECIMALS)]
        decimals: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scenario: path, json } => {
            let scenario = Scenario::load(&path).with_context(|| format!("loading scenario {}", path))?;
            info!(asset_class = %scenario.asset_class, "running scenario");
            let report = scenario::run(&scenario).with_context(|| format!("running scenario {}", path))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
        }
        Commands::Units { value, decimals } => {
            let scaled = parse_units(&value, decimals).with_context(|| format!("parsing {}", value))?;
            println!("{}", scaled);
            println!("{}", format_units(scaled, decimals));
        }
    }

    Ok(())
}

fn print_summary(report: &ScenarioReport) {
    println!("vault {} ({})", report.vault, report.asset_class);
    println!("epoch {} settled at {}", report.epoch, report.settlement_price);
    for strike in &report.strikes {
        println!(
            "  strike {:>8}  premium {:>6}  {}  deposits {}  {}",
            strike.strike, strike.premium, strike.outcome, strike.deposits, strike.token_name
        );
    }
    for holder in report.holders.iter().chain(std::iter::once(&report.payout_destination)) {
        println!(
            "  {:<16} {}  balance {:>8}  assets {:?}",
            holder.label, holder.address, holder.payment_balance, holder.assets
        );
    }
    println!(
        "withdrawn {}  released {}  vault liquidity {}  events {}",
        report.withdrawn,
        report.released,
        report.vault_liquidity,
        report.events.len()
    );
}
