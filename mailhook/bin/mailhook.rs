#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use mailhook::{Mailhook, RunOptions};

const CONFIG_ENV: &str = "MAILHOOK_CONFIG";

/// Receive mail over SMTP and forward each subject to a chat webhook
#[derive(Parser, Debug)]
#[command(name = "mailhook")]
#[command(version)]
struct Cli {
    /// Configuration file, instead of searching the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Forward spooled mail to the configured webhooks
    #[arg(short, long)]
    notify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(
        cli.config,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &default_locations(),
    )?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let mailhook: Mailhook = ron::from_str(&config_content).map_err(|e| {
        anyhow::anyhow!("Failed to parse config {}: {}", config_path.display(), e)
    })?;

    println!("Configuration:");
    print!("{}", mailhook.directory());

    mailhook
        .run(RunOptions {
            debug: cli.debug,
            notify: cli.notify,
        })
        .await
}

fn default_locations() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./mailhook.config.ron"),
        PathBuf::from("./config/mailhook.config.ron"),
        PathBuf::from("/etc/mailhook/mailhook.config.ron"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `MAILHOOK_CONFIG` environment variable
/// 3. each of `defaults`, in order
fn find_config_file(
    explicit: Option<PathBuf>,
    from_env: Option<PathBuf>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
