use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use guardia_connector::{
    AttributeRegistry, ClusterStore, Connector, InMemoryClusterStore,
    config::{ConnectorConfig, read_config_file},
    connector::SOURCE_HEADER,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Interval between two bulk reads of all attributes
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(short)]
    file: String,

    /// Source reported for measurements read from stdin
    #[arg(short, long)]
    source: Option<String>,
}

/// Both the library and this binary log under the `guardia_connector` target
fn log_targets() -> filter::Targets {
    filter::Targets::new().with_target("guardia_connector", LevelFilter::DEBUG)
}

fn init() {
    let filter = log_targets();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn build_runtime(config: &ConnectorConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let runtime = match config.threads {
        Some(threads) => tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .enable_all()
            .build(),
        None => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
    };
    runtime.context("failed to build runtime")
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    config.apply_env_overrides();
    config
        .validate(&AttributeRegistry::standard())
        .context("invalid connector configuration")?;

    let runtime = build_runtime(&config)?;
    runtime.block_on(run(config, args.source))
}

async fn run(config: ConnectorConfig, source: Option<String>) -> anyhow::Result<()> {
    let store: Arc<dyn ClusterStore> = Arc::new(InMemoryClusterStore::new());
    let connector = Connector::from_config(&config, tokio::runtime::Handle::current(), Some(store))?;

    let headers: HashMap<String, String> = source
        .map(|source| HashMap::from([(SOURCE_HEADER.to_string(), source)]))
        .unwrap_or_default();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(ticket) = connector.dispatch(&headers, line.as_bytes()) {
                            trace!("dispatched #{}", ticket.sequence_number());
                        }
                    }
                    Ok(None) => {
                        debug!("end of input");
                        break;
                    }
                    Err(e) => {
                        error!("failed to read input: {e}");
                        break;
                    }
                }
            }

            _ = report.tick() => {
                match connector.get_attributes(None).await {
                    Ok(values) => {
                        let mut ids: Vec<_> = values.keys().collect();
                        ids.sort();
                        for id in ids {
                            info!("{id}: {}", values[id]);
                        }
                    }
                    Err(e) => warn!("failed to read attributes: {e}"),
                }
            }

            _ = &mut shutdown => {
                debug!("received interrupt");
                break;
            }
        }
    }

    connector.close().await;
    Ok(())
}
