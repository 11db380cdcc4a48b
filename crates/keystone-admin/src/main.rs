//! CLI entry point for trusted Keystone administration.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use keystone_core::config::Settings;
use keystone_core::{CurrentViewer, EdgeFilter, NodeId};
use keystone_graph::BackendRegistry;
use keystone_schema::catalog::{Organization, Person};
use keystone_schema::Schema;

#[derive(Parser)]
#[command(name = "keystone-admin")]
#[command(about = "Administration tool for the Keystone graph")]
struct Cli {
    /// Config file prefix (default: keystone).
    #[arg(short, long, default_value = "keystone")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the SDL of the built-in node classes.
    Schema,

    /// Inspect the configured storage backend.
    Backend {
        #[command(subcommand)]
        action: BackendAction,
    },

    /// Read nodes as the internal omni viewer.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(Subcommand)]
enum BackendAction {
    /// Open the backend, print its capabilities, and close it.
    Check,
}

#[derive(Subcommand)]
enum NodeAction {
    /// Print a node as JSON.
    Get { id: String },

    /// Print every edge touching a node.
    Edges { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let schema = Arc::new(
        Schema::builder()
            .register::<Organization>()
            .register::<Person>()
            .build()?,
    );

    if let Command::Schema = cli.command {
        print!("{}", schema.to_sdl());
        return Ok(());
    }

    let settings = Settings::load(&cli.config)?;
    tracing::info!(backend = %settings.backend.backend, "Loaded settings");
    let registry = BackendRegistry::new(settings.backend);
    let backend = registry.get().await?;

    let outcome = match cli.command {
        Command::Schema => Ok(()),
        Command::Backend {
            action: BackendAction::Check,
        } => {
            println!("{}", serde_json::to_string_pretty(&backend.capabilities())?);
            Ok(())
        }
        Command::Node { action } => {
            let store = schema.store(Arc::clone(&backend));
            let omni = CurrentViewer::omni();
            match action {
                NodeAction::Get { id } => store
                    .get_node(&omni, &NodeId::from(id))
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|node| {
                        println!("{}", serde_json::to_string_pretty(&node)?);
                        Ok(())
                    }),
                NodeAction::Edges { id } => print_edges(&store, &omni, NodeId::from(id)).await,
            }
        }
    };

    registry.close().await?;
    outcome
}

async fn print_edges(
    store: &keystone_graph::GraphStore,
    viewer: &CurrentViewer,
    id: NodeId,
) -> anyhow::Result<()> {
    let mut edges = store
        .query_edges(viewer, &EdgeFilter::from_source(&id))
        .await?;
    edges.extend(store.query_edges(viewer, &EdgeFilter::to_target(&id)).await?);
    edges.sort_by_key(|e| e.sort_value);
    println!("{}", serde_json::to_string_pretty(&edges)?);
    Ok(())
}
