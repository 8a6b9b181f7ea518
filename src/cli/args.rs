use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "claude-deck")]
#[command(version, about = "Browse and resume Claude Code sessions", long_about = None)]
pub struct Args {
    /// Directory holding one sub-directory per project
    #[arg(long, global = true, env = "CLAUDE_DECK_PROJECTS_DIR")]
    pub projects_dir: Option<PathBuf>,

    /// `claude` executable used to resume and start sessions
    #[arg(long, global = true, env = "CLAUDE_DECK_CLAUDE_BIN")]
    pub claude_bin: Option<String>,

    /// Config file (default: ~/.claude-deck/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// Without a subcommand the interactive UI runs.
    pub fn is_tui(&self) -> bool {
        self.command.is_none()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List projects
    Projects {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the sessions of one project
    Sessions {
        /// Project name, directory name or path
        project: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version
    Version,
}
