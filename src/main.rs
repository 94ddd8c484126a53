use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use odoo_mcp::config::{AppConfig, ConfigFile, LogFormat, TransportMode, ENV_VARS};
use odoo_mcp::mcp::{serve_health, McpServer, ToolRegistry};
use odoo_mcp::OdooClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Odoo MCP - Expose an Odoo ERP instance to MCP clients
#[derive(Parser, Debug)]
#[command(name = "odoo-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server for Odoo over XML-RPC", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Transport override for `serve`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    /// JSON-RPC over stdin/stdout
    Stdio,
    /// HTTP with server-sent events
    Sse,
}

impl From<Transport> for TransportMode {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Stdio => TransportMode::Stdio,
            Transport::Sse => TransportMode::Sse,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (default)
    Serve {
        /// Transport, overrides MCP_TRANSPORT
        #[arg(long, short, value_enum)]
        transport: Option<Transport>,

        /// Host to bind to in sse mode, overrides HOST
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to in sse mode, overrides PORT
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Authenticate against Odoo and print the server version
    #[command(alias = "doctor")]
    Check,

    /// List the tools exposed to MCP clients
    Tools,

    /// Write a configuration file template
    InitConfig {
        /// Where to write the template
        #[arg(default_value = "odoo-mcp.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

/// Print all available environment variables
fn print_env_vars() {
    println!("Odoo MCP - Environment Variables");
    println!();
    for (name, description) in ENV_VARS {
        println!("  {:<18}{}", name, description);
    }
    println!();
    println!("Other Settings:");
    println!("  {:<18}{}", "RUST_LOG", "Tracing filter, overrides LOG_LEVEL (e.g., odoo_mcp=debug)");
    println!();
    println!("Example:");
    println!("  export ODOO_URL=\"https://erp.example.com\"");
    println!("  export ODOO_DB=\"production\"");
    println!("  export ODOO_USERNAME=\"bot@example.com\"");
    println!("  export ODOO_PASSWORD=\"api-key\"");
}

/// Tracing filter for a `LOG_LEVEL` value; accepts Python-style names
fn filter_directive(log_level: &str, verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => match log_level.trim().to_ascii_lowercase().as_str() {
                "trace" => "trace",
                "debug" => "debug",
                "warn" | "warning" => "warn",
                "error" | "critical" | "fatal" => "error",
                _ => "info",
            },
            1 => "debug",
            _ => "trace",
        }
    };
    format!("odoo_mcp={}", level)
}

/// Logs go to stderr; stdout carries the stdio protocol
fn init_tracing(directive: String, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(directive));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }
    ConfigFile::template()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote configuration template to {}", path.display());
    println!("Set ODOO_PASSWORD in the environment or add it under [odoo].");
    Ok(())
}

async fn serve(config: AppConfig, client: Arc<OdooClient>) -> Result<()> {
    let server = McpServer::new(client.clone())?;

    // Authenticate in the background; a failure here is retried on first use
    tokio::spawn(async move {
        if let Err(e) = client.connect().await {
            tracing::warn!("Initial Odoo authentication failed: {}", e);
        }
    });

    match config.server.transport {
        TransportMode::Stdio => {
            server.run().await?;
        }
        TransportMode::Sse => {
            let (health_addr, health_handle) = serve_health(&config.server.health_addr())
                .await
                .with_context(|| {
                    format!("Failed to bind health endpoint on {}", config.server.health_addr())
                })?;
            let (bound_addr, handle) = server.run_http(&config.server.bind_addr()).await?;
            tracing::info!(
                mcp = %bound_addr,
                health = %health_addr,
                "MCP server listening"
            );

            tokio::select! {
                result = handle => {
                    result.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
            health_handle.abort();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        return Ok(());
    }

    if let Some(Commands::InitConfig { path, force }) = &cli.command {
        return init_config(path, *force);
    }

    // Missing or invalid settings stop here, before anything is opened
    let mut config =
        AppConfig::from_env(cli.config.as_deref()).context("Invalid configuration")?;

    if let Some(Commands::Serve {
        transport,
        host,
        port,
    }) = &cli.command
    {
        if let Some(transport) = transport {
            config.server.transport = (*transport).into();
        }
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }

    init_tracing(
        filter_directive(&config.server.log_level, cli.verbose, cli.quiet),
        config.server.log_format,
    );
    tracing::info!(
        version = odoo_mcp::VERSION,
        url = %config.odoo.url,
        database = %config.odoo.database,
        username = %config.odoo.username,
        timeout_secs = config.odoo.timeout.as_secs(),
        verify_ssl = config.odoo.verify_ssl,
        transport = ?config.server.transport,
        "Configuration loaded"
    );

    let client = Arc::new(OdooClient::new(config.odoo.clone())?);

    match cli.command {
        None | Some(Commands::Serve { .. }) => serve(config, client).await?,

        Some(Commands::Check) => {
            let version = client.server_version().await?;
            let session = client.connect().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "url": config.odoo.url,
                    "database": config.odoo.database,
                    "uid": session.uid,
                    "server_version": version.get("server_version"),
                }))?
            );
        }

        Some(Commands::Tools) => {
            let registry = ToolRegistry::new(client);
            for tool in registry.all() {
                println!("{:<28} {}", tool.name, tool.description);
            }
        }

        Some(Commands::InitConfig { .. }) => {}
    }

    Ok(())
}
