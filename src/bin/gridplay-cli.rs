//! gridplay CLI - run block scripts against a level from the command line
//!
//! Provides subcommands for running a script (instantly or with real-time
//! replay), checking a level file, and writing a default configuration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gridplay::runtime::agent::Pose;
use gridplay::runtime::scheduler::{Frame, ReplaySink};
use gridplay::runtime::outcome::ExecutionResult;
use gridplay::runtime::{ActionId, PlayOutcome, Runtime, RuntimeConfig, play, storage};
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "gridplay")]
#[command(about = "Execute and replay block programs on grid puzzle levels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script against a level and replay the result
    Run {
        /// Level file (JSON)
        #[arg(short, long)]
        level: PathBuf,

        /// Script file
        #[arg(short, long)]
        script: PathBuf,

        /// Runtime configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Replay with real delays instead of jumping through timers
        #[arg(long)]
        realtime: bool,

        /// Print the execution report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a level file and print its solution path
    Check {
        /// Level file (JSON)
        #[arg(short, long)]
        level: PathBuf,

        /// Script whose block budget should be checked against the level
        #[arg(short, long)]
        script: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "gridplay.json")]
        path: PathBuf,
    },
}

/// Prints replay callbacks to stdout
struct ConsoleSink;

impl ReplaySink for ConsoleSink {
    fn highlight(&mut self, block: &ActionId) {
        print!("[{}] ", block);
    }

    fn render(&mut self, pose: Pose, frame: Frame) {
        match frame {
            Frame::Step => println!("at {} facing {}", pose.position, pose.facing),
            Frame::Crash => println!("crashed at {} facing {}", pose.position, pose.facing),
            Frame::Victory(n) => println!("victory frame {}", n + 1),
        }
    }

    fn done(&mut self, result: ExecutionResult) {
        println!("Result: {}", result);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The config decides the log level, so it is read before tracing starts
    let config = match &cli.command {
        Commands::Run {
            config: Some(path), ..
        } => storage::load_config(path)?,
        _ => RuntimeConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level().into()),
        )
        .init();

    match cli.command {
        Commands::Run {
            level,
            script,
            realtime,
            json,
            ..
        } => {
            let level = storage::load_level(&level)?;
            let mut runtime = Runtime::new(config, level)?;
            let source = storage::read_script(&script)?;
            let report = runtime.run(&source)?;

            if json {
                let text = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                println!("{}", text);
            } else {
                println!(
                    "Program '{}' on '{}': {} ({} actions, {} ticks)",
                    report.program,
                    runtime.level().name(),
                    report.result,
                    report.actions,
                    report.ticks
                );
            }

            let mut sink = ConsoleSink;
            if realtime {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to start async runtime")?;
                let outcome = rt.block_on(async {
                    let (tx, rx) = watch::channel(false);
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            let _ = tx.send(true);
                        }
                    });
                    play(&mut runtime, &mut sink, rx).await
                });
                if outcome == PlayOutcome::Cancelled {
                    println!("Replay cancelled");
                }
            } else {
                runtime.replay_to_end(&mut sink);
            }
        }

        Commands::Check { level, script } => {
            let level = storage::load_level(&level)?;
            let world = level.world();
            println!("Level '{}' ({}x{})", level.name(), world.width(), world.height());
            let path: Vec<String> = world.solution_path().iter().map(|c| c.to_string()).collect();
            println!("Solution path: {}", path.join(" -> "));

            let stray = world.off_path_cells();
            if !stray.is_empty() {
                println!("Open cells off the path: {}", stray.len());
            }

            if let Some(script) = script {
                let source = storage::read_script(&script)?;
                let runtime = Runtime::new(RuntimeConfig::default(), level)?;
                match runtime.remaining_capacity(&source)? {
                    Some(left) if left < 0 => println!("Script uses {} blocks too many", -left),
                    Some(left) => println!("Blocks remaining: {}", left),
                    None => println!("Level has no block limit"),
                }
            }
        }

        Commands::InitConfig { path } => {
            storage::write_config(&path, &RuntimeConfig::default())?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}
