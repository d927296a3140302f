use anyhow::Context;
use clap::Parser;
use rgs_master::{models::*, MasterServerQuerier};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master server address
    #[arg(default_value = "hl2master.steampowered.com:27011")]
    master: Host,

    /// App id to list servers for, may be repeated
    #[arg(short = 'a', long = "appid")]
    app_ids: Vec<u32>,

    /// Preformatted filter such as `\dedicated\1`, may be repeated
    #[arg(short = 'f', long = "filter")]
    filters: Vec<String>,

    /// JSON file with query settings
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print every page as a JSON line instead of one address per line
    #[arg(long)]
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MasterQueryConfig> {
    match path {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse config {}", path.display()))
        }
        None => Ok(MasterQueryConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    debug!("Using {:?}", config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping query");
                cancel.cancel();
            }
        }
    });

    let mut querier = MasterServerQuerier::new(args.master)
        .with_config(config)
        .with_cancellation(cancel);
    querier
        .filter_app_ids(args.app_ids)
        .add_filters(args.filters.into_iter().map(FilterToken::raw));

    let json = args.json;
    let summary = querier
        .query_udp(|page| {
            if json {
                println!("{}", serde_json::to_string(&page)?);
            } else {
                for addr in page {
                    println!("{}", addr);
                }
            }
            Ok(())
        })
        .await
        .context("master query failed")?;

    info!(
        "Queried {} servers in {} pages",
        summary.servers, summary.pages
    );

    Ok(())
}
