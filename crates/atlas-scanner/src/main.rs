//! CLI entry point for the Atlas asset graph.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use atlas_core::Settings;
use atlas_engine::{export, GraphEngine, LocalEngine, RemoteEngine};
use atlas_graph::{GraphClient, GraphConfig, SyncedStore};
use atlas_store::{AssetStore, GraphWriter};

use atlas_scanner::{
    Alerter, CertScheduler, MultiAlerter, ScanRequest, ScanScheduler, Scanner,
    TerraformStateParser, WebhookAlerter,
};

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Infrastructure asset graph and blast radius analysis")]
struct Cli {
    /// Config file prefix (default: atlas, reads atlas.toml).
    #[arg(short, long, default_value = "atlas")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one discovery scan and exit.
    Scan {
        /// Source kind: terraform, kubernetes, k8s-live, ansible, all.
        #[arg(short, long)]
        source: String,

        /// Paths handed to the parser (state files, manifest dirs).
        #[arg(short, long)]
        path: Vec<String>,
    },

    /// Run both schedulers until interrupted.
    Daemon,

    /// Show everything that would be affected if an asset failed.
    Blast {
        id: String,

        /// Render as an impact tree instead of a flat list.
        #[arg(long)]
        tree: bool,
    },

    /// Show what an asset depends on, to a depth.
    Deps {
        id: String,

        #[arg(long, default_value_t = 10)]
        depth: usize,
    },

    /// Shortest path between two assets.
    Path { from: String, to: String },

    /// Export the whole graph.
    Export {
        /// Output format: json, dot, mermaid.
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// List certificates with lifetime status.
    Certs {
        /// Only certificates expiring within this many days.
        #[arg(long)]
        days: Option<i64>,
    },

    /// Rebuild the Neo4j mirror from the local store.
    Resync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let store = Arc::new(AssetStore::open(&settings.database.path).await?);

    match cli.command {
        Command::Scan { source, path } => {
            let scanner = build_scanner(&settings, store.clone()).await;
            let outcome = scanner.run_scan(&ScanRequest::new(&source, path)).await?;
            println!(
                "scan {} complete: {} nodes, {} edges",
                outcome.scan_id, outcome.nodes_found, outcome.edges_found
            );
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
        }

        Command::Daemon => {
            let scanner = build_scanner(&settings, store.clone()).await;
            let scan_handle = ScanScheduler::new(scanner, &settings.scan.interval)?.start();
            let cert_handle =
                CertScheduler::new(store.clone(), build_alerter(&settings)?, &settings.certs.interval)?
                    .start();

            tracing::info!("Atlas daemon running; Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;

            scan_handle.stop().await;
            cert_handle.stop().await;
        }

        Command::Blast { id, tree } => {
            let engine = build_engine(&settings, store.clone()).await;
            if tree {
                let tree = engine.blast_radius_tree(&id).await?;
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                let blast = engine.blast_radius(&id).await?;
                println!("{}", serde_json::to_string_pretty(&blast)?);
            }
        }

        Command::Deps { id, depth } => {
            let engine = build_engine(&settings, store.clone()).await;
            let chain = engine.dependency_chain(&id, depth).await?;
            println!("{}", serde_json::to_string_pretty(&chain)?);
        }

        Command::Path { from, to } => {
            let engine = build_engine(&settings, store.clone()).await;
            let path = engine.shortest_path(&from, &to).await?;
            println!("{}", serde_json::to_string_pretty(&path)?);
        }

        Command::Export { format } => {
            let snapshot = store.export_graph().await?;
            match format.as_str() {
                "json" => println!("{}", export::to_json(&snapshot)?),
                "dot" => println!("{}", export::to_dot(&snapshot)),
                "mermaid" => println!("{}", export::to_mermaid(&snapshot)),
                other => anyhow::bail!("unknown export format: {other}"),
            }
        }

        Command::Certs { days } => {
            let records = match days {
                Some(days) => atlas_certs::expiring_certs(&store, days).await?,
                None => atlas_certs::list_certs(&store).await?,
            };
            for record in records {
                println!(
                    "{:<10} {:>6} {}",
                    record.status,
                    record
                        .days_remaining
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record.node.name
                );
            }
        }

        Command::Resync => {
            let Some(neo4j) = &settings.neo4j else {
                anyhow::bail!("no [neo4j] section configured");
            };
            let client = GraphClient::connect(&graph_config(neo4j)).await?;
            SyncedStore::new(store.clone(), client).resync().await?;
            println!("mirror resynchronized");
        }
    }

    Ok(())
}

/// Wire the scanner with its parsers and, when configured, the Neo4j
/// mirror as the write sink.
async fn build_scanner(settings: &Settings, store: Arc<AssetStore>) -> Scanner {
    let sink: Arc<dyn GraphWriter> = match connect_mirror(settings).await {
        Some(client) => Arc::new(SyncedStore::new(store.clone(), client)),
        None => store.clone(),
    };

    Scanner::new(
        store,
        sink,
        vec![Arc::new(TerraformStateParser)],
        settings.scan.sources.clone(),
    )
}

/// Prefer the remote engine when a mirror is configured and reachable.
async fn build_engine(settings: &Settings, store: Arc<AssetStore>) -> Box<dyn GraphEngine> {
    let local = LocalEngine::new(store);
    match connect_mirror(settings).await {
        Some(client) => Box::new(RemoteEngine::new(client, local)),
        None => Box::new(local),
    }
}

async fn connect_mirror(settings: &Settings) -> Option<GraphClient> {
    let neo4j = settings.neo4j.as_ref()?;
    match GraphClient::connect(&graph_config(neo4j)).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "Neo4j unavailable, continuing with local store only");
            None
        }
    }
}

fn graph_config(neo4j: &atlas_core::config::Neo4jSettings) -> GraphConfig {
    GraphConfig {
        uri: neo4j.uri.clone(),
        user: neo4j.user.clone(),
        password: neo4j.password.clone(),
        ..Default::default()
    }
}

fn build_alerter(settings: &Settings) -> anyhow::Result<Arc<dyn Alerter>> {
    let mut alerters: Vec<Arc<dyn Alerter>> = Vec::new();
    if let Some(url) = &settings.certs.webhook_url {
        alerters.push(Arc::new(WebhookAlerter::new(url)?));
    }
    Ok(Arc::new(MultiAlerter::new(alerters)))
}
