use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use termpilot::{tools::default_registry, Cli, Commands};
use termpilot_logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command.clone().unwrap_or(Commands::Serve) {
        Commands::Tools => {
            let definitions = default_registry().definitions();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
            Ok(())
        }
        Commands::Serve => {
            let policy = cli.policy();
            eprintln!(
                "{} {} {}",
                "termpilot".bright_cyan().bold(),
                env!("CARGO_PKG_VERSION").dimmed(),
                "serving JSON lines on stdin/stdout".green()
            );
            eprintln!(
                "  max sessions: {}  danger detection: {}  redaction: {}  sandbox: {}",
                cli.max_sessions,
                on_off(cli.danger_detection),
                on_off(cli.redact_secrets),
                on_off(cli.sandbox),
            );
            if !policy.allowed_commands.is_empty() {
                eprintln!("  allowed commands: {}", policy.allowed_commands.join(", ").yellow());
            }
            if policy.has_path_restrictions() {
                let roots: Vec<String> = policy.allowed_paths.iter().map(|p| p.display().to_string()).collect();
                eprintln!("  allowed paths: {}", roots.join(", ").yellow());
            }

            termpilot::server::run(&cli).await
        }
    }
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".red()
    }
}
