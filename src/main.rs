use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

mod actions;
mod app;

use actions::Action;
use agent_presence::{AgentDetector, DetectorConfig, PatternLibrary};
use app::App;

#[derive(Parser)]
#[command(name = "agent-presence", version, about = "Replay terminal I/O through the agent presence detector")]
struct Cli {
    /// Detector config (JSON). Defaults to the user config dir when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines transcript ("-" for stdin) and print status events
    Replay {
        path: String,
        /// Do not print the final snapshot
        #[arg(long)]
        quiet: bool,
    },
    /// Show how the pattern library classifies a single output line
    Classify { line: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries replay output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DetectorConfig::load_default().context("Failed to load default config")?,
    };

    match cli.command {
        Command::Replay { path, quiet } => replay(config, &path, quiet).await,
        Command::Classify { line } => {
            let patterns = PatternLibrary::new(config.termination_line_cutoff);
            let normalized = agent_presence::detector::normalize(&line);
            let classification = patterns.classify(&normalized, "");
            println!(
                "{}",
                serde_json::json!({
                    "line": normalized,
                    "startup": classification.startup,
                    "invocation": patterns.detect_invocation(&normalized),
                    "exit": classification.exit,
                    "prompt_return": classification.prompt_return,
                })
            );
            Ok(())
        }
    }
}

async fn replay(config: DetectorConfig, path: &str, quiet: bool) -> Result<()> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = if path == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open transcript {path}"))?,
        )
    };

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<Action>>();

    // Spawn transcript reader
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut line_number = 0;
        loop {
            line_number += 1;
            match lines.next_line().await {
                Ok(Some(line)) => match Action::parse(&line, line_number) {
                    Ok(Some(action)) => {
                        if tx.send(Ok(action)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e.into()));
                        break;
                    }
                },
                Ok(None) => {
                    let _ = tx.send(Ok(Action::Quit));
                    break;
                }
                Err(e) => {
                    let _ = tx.send(Err(anyhow::Error::new(e).context("Failed to read transcript")));
                    break;
                }
            }
        }
    });

    let detector = Arc::new(AgentDetector::new(config).context("Invalid detector config")?);
    let mut app = App::new(detector, std::io::stdout().lock());

    // Main event loop
    let result = loop {
        match rx.recv().await {
            Some(Ok(action)) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            Some(Err(e)) => break Err(e),
            None => break Ok(()),
        }
    };

    if let Err(e) = &result {
        error!("replay stopped: {e:#}");
    } else {
        info!(actions = app.processed, "replay finished");
        if !quiet {
            app.write_snapshot()?;
        }
        app.into_output().flush()?;
    }
    result
}
