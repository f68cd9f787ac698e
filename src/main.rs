//! SandboxBuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use sandboxbuddy::{
    cli::{Args, Commands},
    tools::{SafeExecutor, ToolRegistry},
    types::ExecutionContext,
    SandboxConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.verbosity().log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match &args.command {
        Commands::Exec {
            tool,
            input,
            allow,
            cwd,
            timeout,
            session,
        } => {
            let success = run_exec(
                config,
                tool,
                input,
                allow,
                cwd.clone(),
                timeout.map(Duration::from_millis),
                session.clone(),
            )
            .await?;

            if !success {
                std::process::exit(1);
            }
        }
        Commands::Tools { category } => {
            list_tools(category.as_deref());
        }
        Commands::Config => {
            show_config(&args, &config)?;
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<SandboxConfig> {
    match &args.config {
        Some(path) => SandboxConfig::load(path),
        None => SandboxConfig::load_or_default(),
    }
}

async fn run_exec(
    mut config: SandboxConfig,
    tool: &str,
    input: &str,
    allow: &[PathBuf],
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    session: Option<String>,
) -> Result<bool> {
    let current_dir = std::env::current_dir().context("Could not determine current directory")?;

    for root in allow {
        let root = if root.is_absolute() {
            root.clone()
        } else {
            current_dir.join(root)
        };
        config.allowed_roots.push(root);
    }

    if config.allowed_roots.is_empty() {
        warn!(root = %current_dir.display(), "No allowed roots configured, confining to current directory");
        config.allowed_roots.push(current_dir.clone());
    }

    if let Some(cwd) = cwd {
        config.working_dir = Some(if cwd.is_absolute() {
            cwd
        } else {
            current_dir.join(cwd)
        });
    }

    let executor = SafeExecutor::new(config, Arc::new(ToolRegistry::new()))
        .context("Failed to initialize sandbox")?;

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let context = ExecutionContext::new(session_id);

    let result = executor
        .execute_with_timeout(tool, input, &context, timeout)
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        eprintln!(
            "{} {} ({}ms)",
            "✓".green(),
            tool.bold(),
            result.execution_time_ms
        );
    } else {
        eprintln!(
            "{} {}: {}",
            "✗".red(),
            tool.bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(result.success)
}

fn list_tools(category: Option<&str>) {
    let registry = ToolRegistry::new();
    let tools = match category {
        Some(category) => registry.list_tools_by_category(category),
        None => registry.list_tools(),
    };

    if tools.is_empty() {
        println!("No tools registered.");
        return;
    }

    println!("{}", "Registered tools:".bold());
    for tool in tools {
        println!(
            "  {} {} [{}]",
            tool.id.cyan(),
            format!("v{}", tool.version).dimmed(),
            tool.category
        );
        println!("      {}", tool.description);
        for parameter in &tool.parameters {
            let marker = if parameter.required {
                "required".yellow()
            } else {
                "optional".dimmed()
            };
            println!(
                "      - {} ({}, {}): {}",
                parameter.name, parameter.param_type, marker, parameter.description
            );
        }
    }
}

fn show_config(args: &Args, config: &SandboxConfig) -> Result<()> {
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => SandboxConfig::config_path()?.display().to_string(),
    };

    println!("{}", "SandboxBuddy Configuration".bold());
    println!("  Source: {}", source.dimmed());
    println!("  Verbosity: {}", args.verbosity().as_str());
    println!();
    println!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);

    Ok(())
}
