use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::application::Application;
use crate::config::AppConfig;
use crate::echo::EchoRoutes;
use crate::router::RouteTable;
use crate::runtime_config::RuntimeConfig;
use crate::server::serve_until_shutdown;

/// Command-line interface for brrtcore
#[derive(Parser, Debug)]
#[command(name = "brrtcore")]
#[command(about = "Dispatch core with echo routes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the routes file with echo operations
    Serve {
        /// Application config (YAML)
        #[arg(short, long, env = "BRRTC_CONFIG")]
        config: Option<PathBuf>,

        /// Routes file (YAML)
        #[arg(short, long)]
        routes: Option<PathBuf>,

        /// Address to bind, overrides `http.addr`
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the route table
    Routes {
        #[arg(short, long, env = "BRRTC_CONFIG")]
        config: Option<PathBuf>,

        #[arg(short, long)]
        routes: PathBuf,
    },
}

/// Application with every route in `routes` mounted as an echo operation
///
/// # Errors
///
/// Unreadable files, invalid methods or conflicting routes.
pub fn build_application(
    config: Option<&Path>,
    routes: Option<&Path>,
    addr: Option<String>,
) -> Result<Application> {
    let mut config = match config {
        Some(path) => AppConfig::load(path)?,
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Some(addr) = addr {
        config.http.addr = addr;
    }

    let mut app = Application::new(config);
    if let Some(path) = routes {
        for route in EchoRoutes::load(path)?.routes {
            let spec = route.to_spec()?;
            app.route(spec)
                .with_context(|| format!("Cannot register {} {}", route.method, route.path))?;
        }
    }
    Ok(app)
}

/// One `METHOD pattern -> operation` line per route
#[must_use]
pub fn format_routes(table: &RouteTable) -> String {
    table
        .routes()
        .iter()
        .map(|r| format!("{:<7} {} -> {}", r.method.as_str(), r.path_pattern, r.operation_name()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute the parsed command line
///
/// # Errors
///
/// Configuration, route or server startup failures.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            routes,
            addr,
        } => {
            RuntimeConfig::from_env().apply();
            let app = build_application(config.as_deref(), routes.as_deref(), addr)?;
            let handle = app.serve()?;
            info!(addr = %handle.addr(), "brrtcore serving - press Ctrl+C to stop");
            serve_until_shutdown(handle).context("Server terminated abnormally")?;
            Ok(())
        }
        Commands::Routes { config, routes } => {
            let app = build_application(config.as_deref(), Some(&routes), None)?;
            println!("{}", format_routes(app.routes()));
            Ok(())
        }
    }
}
