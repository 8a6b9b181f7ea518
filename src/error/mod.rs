use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Project directory no longer exists: {}", .0.display())]
    ProjectMissing(PathBuf),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Cannot construct page '{page}': missing {missing}")]
    PageConstruction { page: &'static str, missing: String },

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Render error: {0}")]
    Render(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn page_construction(page: &'static str, missing: impl Into<String>) -> Self {
        Self::PageConstruction {
            page,
            missing: missing.into(),
        }
    }
}
