use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use clap::Parser;
use claude_deck::cli::{run_cli, Args};
use claude_deck::config::ConfigFile;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "claude-deck.log";

/// The TUI owns the terminal, so it logs to `~/.claude-deck/logs`; subcommands log to stderr.
fn init_logging(tui: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tui {
        let file = ConfigFile::base_dir().ok().and_then(|base| {
            let dir = base.join("logs");
            fs::create_dir_all(&dir).ok()?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE))
                .ok()
        });
        match file {
            Some(file) => fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init(),
            // Nowhere safe to write; stay silent rather than draw over the UI.
            None => fmt()
                .with_env_filter(EnvFilter::new("off"))
                .with_writer(std::io::sink)
                .init(),
        }
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI args
    let args = Args::parse();

    init_logging(args.is_tui());

    // Run CLI or TUI
    if let Err(e) = run_cli(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
