use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

use lambda_sandbox::engine::DockerCli;
use lambda_sandbox::{Config, ConfigError, SandboxManager};

use crate::logger::LogOptions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "lambda-sandbox")]
#[command(about = "Acquire handler code and drive handler sandboxes by hand")]
pub struct Cli {
    /// Worker configuration file (YAML or JSON)
    #[arg(short, long, global = true, default_value = "worker.yaml")]
    config: PathBuf,

    /// Write logs here instead of the state directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Echo logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            file: self.log_file.clone(),
            stderr: self.verbose,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Make a handler's code available using the configured registry mode
    Pull {
        /// Handler name
        name: String,
    },

    /// Provision a sandbox for a handler
    Create {
        /// Handler name
        name: String,

        /// Host directory shared with the sandbox (created if missing)
        sandbox_dir: PathBuf,

        /// Start the container after creating it
        #[arg(long)]
        start: bool,
    },

    /// List containers known to the engine
    Dump {
        /// Only containers labelled with this worker's cluster
        #[arg(long)]
        cluster: bool,
    },

    /// Validate the configuration and engine setup, then exit
    Check,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn build_manager(config_path: &Path) -> Result<SandboxManager> {
    let config = Config::load(config_path)?;
    let engine = DockerCli::new().map_err(|e| ConfigError::EngineUnavailable(e.to_string()))?;
    // The code registry client is supplied by the embedding worker; this
    // binary has none, so `olregistry` mode is rejected here.
    let manager = SandboxManager::new(&config, Arc::new(engine), None)
        .with_context(|| format!("Invalid worker configuration in {}", config_path.display()))?;
    Ok(manager)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Pull { name } => {
            let manager = build_manager(&cli.config)?;
            manager
                .pull(&name)
                .with_context(|| format!("Failed to pull handler '{}'", name))?;
            println!("Pulled {}", name);
            Ok(())
        }
        Commands::Create {
            name,
            sandbox_dir,
            start,
        } => {
            let manager = build_manager(&cli.config)?;
            std::fs::create_dir_all(&sandbox_dir).with_context(|| {
                format!("Failed to create sandbox directory {}", sandbox_dir.display())
            })?;
            let mut sandbox = manager
                .create(&name, &sandbox_dir)
                .with_context(|| format!("Failed to create sandbox for '{}'", name))?;
            if start {
                sandbox.start()?;
            }
            let state = sandbox.state()?;
            println!("{} {}", sandbox.container_id(), state);
            if let Some(pid) = sandbox.ns_pid() {
                println!("pid {}", pid);
            }
            Ok(())
        }
        Commands::Dump { cluster } => {
            let manager = build_manager(&cli.config)?;
            let entries = if cluster {
                manager.dump_cluster()?
            } else {
                manager.dump()?
            };
            for (idx, entry) in entries.iter().enumerate() {
                println!(
                    "CONTAINER {}: {}, {}, {}",
                    idx, entry.image, entry.short_id, entry.state
                );
            }
            Ok(())
        }
        Commands::Check => {
            let manager = build_manager(&cli.config)?;
            println!("ok: {} mode", manager.mode().as_str());
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
