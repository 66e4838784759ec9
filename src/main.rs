use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;

use glance::config::{self, Overrides, Settings};
use glance::model::{CandleEngine, DeviceKind, Engine};
use glance::{response, Handler, InvokeFault, Task};

#[derive(Parser)]
#[command(
    name = "glance",
    version,
    about = "Image detection and classification, one invocation at a time"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Task to run (overrides GLANCE_TASK and the config file)
    #[arg(long, global = true, value_enum)]
    task: Option<Task>,

    /// Execution device (overrides GLANCE_DEVICE and the config file)
    #[arg(long, global = true, value_enum)]
    device: Option<DeviceKind>,

    /// Model cache directory (overrides GLANCE_CACHE_DIR and the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Read one request from stdin and write one response to stdout
    Invoke,
    #[cfg(feature = "server")]
    /// Serve invocations over HTTP from a warm process
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:8080
        #[arg(long)]
        listen: Option<String>,
    },
    /// Download model artifacts into the cache without running inference
    Fetch {
        /// Fetch every catalog entry instead of the configured one
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        task: cli.task,
        device: cli.device,
        cache_dir: cli.cache_dir,
    };

    match cli.command.unwrap_or(Command::Invoke) {
        Command::Invoke => invoke(overrides),
        #[cfg(feature = "server")]
        Command::Serve { listen } => {
            let settings = startup(overrides)?;
            let handler = Handler::from_settings(&settings)?;
            let listen = listen.unwrap_or_else(|| settings.listen.clone());
            glance::server::run_server(&handler, &listen)
        }
        Command::Fetch { all } => fetch(&startup(overrides)?, all),
    }
}

/// Resolves settings and applies the cache redirection before anything
/// touches the model store.
fn startup(overrides: Overrides) -> Result<Settings> {
    let config = config::load_config()?;
    let settings = Settings::from_env(config, overrides)?;
    settings.prepare_cache_dir()?;
    Ok(settings)
}

fn invoke(overrides: Overrides) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let handler = match startup(overrides).and_then(|s| Handler::from_settings(&s)) {
        Ok(handler) => handler,
        Err(e) => {
            // Setup failures still owe the caller a response document.
            error!("startup failed: {:#}", e);
            let fault = InvokeFault::Unexpected(format!("startup failed: {e:#}"));
            out.write_all(response::failure_envelope(&fault).as_bytes())?;
            return Ok(out.flush()?);
        }
    };

    let stdin = std::io::stdin();
    handler
        .handle(&mut stdin.lock(), &mut out)
        .context("writing response")
}

fn fetch(settings: &Settings, all: bool) -> Result<()> {
    let engine = CandleEngine::new(settings.device)?;
    let zoo = settings.hub_zoo(engine.device());

    if all {
        for entry in zoo.catalog() {
            zoo.prefetch(entry)?;
        }
    } else {
        let query = settings.profile.query(engine.identity());
        let entry = zoo.resolve(&query)?;
        zoo.prefetch(entry)?;
    }
    info!("cache ready at {}", settings.cache_dir.display());
    Ok(())
}
