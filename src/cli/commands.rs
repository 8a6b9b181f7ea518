use chrono::Utc;

use crate::cli::{Args, Command};
use crate::config::{AppConfig, ConfigOverrides};
use crate::error::{Error, Result};
use crate::projects::{scan, ProjectSummary, SessionLoader};
use crate::ui::render::relative_time;

pub async fn run_cli(args: Args) -> Result<()> {
    let overrides = ConfigOverrides {
        projects_dir: args.projects_dir,
        claude_bin: args.claude_bin,
        config_path: args.config,
    };

    match args.command {
        Some(Command::Projects { json }) => {
            let config = AppConfig::load(overrides).await?;
            handle_projects(&config, json).await
        }

        Some(Command::Sessions { project, json }) => {
            let config = AppConfig::load(overrides).await?;
            handle_sessions(&config, &project, json).await
        }

        Some(Command::Version) => {
            println!("claude-deck v{}", crate::VERSION);
            Ok(())
        }

        None => {
            // Launch TUI
            let config = AppConfig::load(overrides).await?;
            let mut app = crate::ui::App::new(config).await?;
            app.run().await
        }
    }
}

async fn handle_projects(config: &AppConfig, json: bool) -> Result<()> {
    let projects = scan(&config.projects_dir).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!(
            "No projects found in {}.",
            config.projects_dir.display()
        );
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<24} {:>8} {:<12} {:<16} {}",
        "NAME", "SESSIONS", "LAST", "BRANCH", "PATH"
    );
    println!("{}", "-".repeat(90));
    for p in &projects {
        println!(
            "{:<24} {:>8} {:<12} {:<16} {}",
            truncate(&p.name, 24),
            p.session_count,
            relative_time(p.last_activity, now),
            truncate(p.last_branch.as_deref().unwrap_or("-"), 16),
            p.path.display()
        );
    }
    println!("\nTotal: {} projects", projects.len());
    Ok(())
}

async fn handle_sessions(config: &AppConfig, identifier: &str, json: bool) -> Result<()> {
    let projects = scan(&config.projects_dir).await?;
    let project = find_project(&projects, identifier)
        .ok_or_else(|| Error::ProjectNotFound(identifier.to_string()))?;

    let loader = SessionLoader::new();
    let detail = loader.load(project).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail.sessions)?);
        return Ok(());
    }

    println!("Project: {} ({})\n", project.name, project.path.display());
    let now = Utc::now();
    println!(
        "{:<38} {:<11} {:<12} {:<16} {}",
        "SESSION", "KIND", "WHEN", "BRANCH", "PREVIEW"
    );
    println!("{}", "-".repeat(100));
    for s in detail.sessions.iter().rev() {
        println!(
            "{:<38} {:<11} {:<12} {:<16} {}",
            truncate(&s.session_id, 38),
            s.kind.as_str(),
            relative_time(s.timestamp, now),
            truncate(s.branch.as_deref().unwrap_or("-"), 16),
            s.preview
        );
    }
    println!("\nTotal: {} sessions", detail.sessions.len());
    Ok(())
}

/// Match by exact name, directory name or path, then by case-insensitive name.
fn find_project<'a>(projects: &'a [ProjectSummary], identifier: &str) -> Option<&'a ProjectSummary> {
    projects
        .iter()
        .find(|p| {
            p.name == identifier
                || p.dir_name == identifier
                || p.path.to_string_lossy() == identifier
        })
        .or_else(|| {
            projects
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(identifier))
        })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max <= 3 {
        s.chars().take(max).collect()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    }
}
