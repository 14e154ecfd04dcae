use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use nexa_stats::{
    config::{Command, Config, NodeConfig},
    logging,
    node_client::Client,
    run,
    stats::HourlySummary,
    stopper,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

async fn check(node: &NodeConfig) -> Result<()> {
    let client = Client::new_from_config(node);
    let help = client.help().await?;
    info!(
        "nexa-cli reachable at {}, {} commands listed",
        node.nexa_cli_path.display(),
        help.lines().filter(|l| !l.is_empty() && !l.starts_with("==")).count()
    );
    let height = client.get_block_count().await?;
    info!("Latest block height: {}", height);
    Ok(())
}

fn print_table(table: &BTreeMap<DateTime<Utc>, HourlySummary>) {
    fn cell<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }
    println!(
        "{:<20} {:>18} {:>14} {:>8} {:>16}",
        "hour", "hourly_volume", "hourly_fees", "tx/hour", "closing_diff"
    );
    for (hour, row) in table {
        println!(
            "{:<20} {:>18} {:>14} {:>8} {:>16}",
            hour.format("%Y-%m-%d %H:%M"),
            cell(row.hourly_volume),
            cell(row.hourly_fees),
            cell(row.transactions_per_hour),
            cell(row.closing_difficulty),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::setup(config.log_format);
    info!("nexa-stats");

    let cancel_token = CancellationToken::new();
    let stopper = stopper::run(cancel_token.clone());

    let result = match &config.command {
        Command::Check(node) => check(node).await,
        Command::Fetch(args) => run::fetch(
            Client::new_from_config(&args.node),
            &config.data_files(),
            args.block_count,
            args.workers(),
            cancel_token.clone(),
        )
        .await
        .map(|_| ()),
        Command::Process(args) => {
            run::process(&config.data_files(), &config.resolve(&args.chart_path))
                .map(|table| print_table(&table))
        }
    };

    cancel_token.cancel();
    let _ = stopper.await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("Exited");
    result
}
