//! sqliteserver - SQLite over HTTP with statement replication
//!
//! Starts a leader or follower node serving the HTTP query API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqliteserver::api::{Dispatcher, HttpServer};
use sqliteserver::config::{NodeRole, ServerConfig};
use sqliteserver::error::Result;
use sqliteserver::executor::{Database, StatementClassifier};
use sqliteserver::replication::{register_with_leader, HttpTransport, ReplicaRegistry, Replicator};
use sqliteserver::writelog::WriteLog;

/// sqliteserver - SQLite over HTTP with statement replication
#[derive(Parser)]
#[command(name = "sqliteserver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sqliteserver.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Start {
        /// Run as a follower of --leader-addr
        #[arg(long)]
        follower: bool,

        /// Leader base URL (e.g. http://localhost:5050)
        #[arg(long)]
        leader_addr: Option<String>,

        /// Database file path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Listen port
        #[arg(short, long)]
        port: Option<String>,

        /// Append mutating statements to the write log
        #[arg(long)]
        write_log: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "sqliteserver.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            follower,
            leader_addr,
            db,
            port,
            write_log,
        } => {
            let mut config = ServerConfig::load_or_default(&cli.config)?;
            config.apply_env();
            if follower {
                config.node.role = NodeRole::Follower;
            }
            if leader_addr.is_some() {
                config.node.leader_address = leader_addr;
            }
            if let Some(db) = db {
                config.database.path = db;
            }
            if let Some(port) = port {
                config.override_port(&port);
            }
            if write_log {
                config.write_log.enabled = true;
            }

            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level), &config.logging.format);
            config.validate()?;
            run_start(config).await
        }
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the node
async fn run_start(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting sqliteserver as {}", config.node.role);

    let db = match Database::open(&config.database) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("Failed to open database {:?}: {}", config.database.path, e);
            return Err(e);
        }
    };

    let registry = Arc::new(ReplicaRegistry::new());
    let classifier = StatementClassifier::new(&config.replication.mutating_keywords);
    tracing::info!("Mutating keywords: {:?}", classifier.keywords());

    let mut dispatcher = Dispatcher::new(Arc::clone(&db), Arc::clone(&registry))
        .with_classifier(classifier);

    if config.replicates() {
        if config.request_timeout().is_none() {
            tracing::info!("Follower requests have no timeout");
        }
        let transport = Arc::new(HttpTransport::new(
            config.api.secret.clone(),
            config.request_timeout(),
        )?);
        dispatcher = dispatcher.with_replicator(Replicator::new(Arc::clone(&registry), transport));
        tracing::info!("Replication to followers enabled");
    }

    if config.write_log.enabled {
        let write_log = WriteLog::open(Arc::clone(&db)).await?;
        tracing::info!("Write log enabled, {} entries so far", write_log.len().await?);
        dispatcher = dispatcher.with_write_log(write_log);
    }

    let server = HttpServer::new(config.api.clone(), dispatcher);
    let listener = tokio::net::TcpListener::bind(&config.api.bind_address).await?;
    tracing::info!("HTTP API listening on {}", config.api.bind_address);

    // Register only once the listener is up, so the leader can reach us
    if config.node.role == NodeRole::Follower {
        let leader = config.node.leader_address.clone().unwrap_or_default();
        let client = reqwest::Client::new();
        if let Err(e) = register_with_leader(&client, &leader, &config.follower_endpoint(), &config.api.secret).await {
            tracing::error!("Failed to register with leader {}: {}", leader, e);
            return Err(e);
        }
        tracing::info!("Registered with leader {}", leader);
    }

    tokio::select! {
        result = server.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# sqliteserver Configuration

[node]
role = "leader"
# role = "follower"
# leader_address = "http://localhost:5050"
advertise_address = "http://localhost"

[database]
path = "./database.db"
pool_size = 4
busy_timeout_ms = 5000

[api]
bind_address = "0.0.0.0:5050"
secret = "secret"
cors_enabled = false

[replication]
enabled = true
mutating_keywords = ["INSERT", "UPDATE", "DELETE", "CREATE"]
# 0 waits on a follower indefinitely
request_timeout_ms = 0

[write_log]
enabled = false

[logging]
level = "info"
format = "pretty"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then start with: sqliteserver --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match ServerConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Role:         {}", config.node.role);
            if let Some(leader) = &config.node.leader_address {
                println!("  Leader:       {}", leader);
            }
            println!("  Bind Address: {}", config.api.bind_address);
            println!("  Database:     {}", config.database.path.display());
            println!("  Replication:  {}", config.replicates());
            println!("  Write Log:    {}", config.write_log.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
