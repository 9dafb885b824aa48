use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use demobot::config::Config;
use demobot::runner;

#[derive(Parser)]
#[command(name = "demobot")]
#[command(version, about = "Turns labelled GitHub issues into generated-code pull requests")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every configured repository once
    Run,
    /// Show the resolved configuration (secrets redacted)
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "demobot=debug" } else { "demobot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn redact(secret: &str) -> String {
    // Truncate by characters, not bytes; values are operator-supplied and
    // may not be ASCII.
    if secret.chars().count() > 8 {
        let head: String = secret.chars().take(4).collect();
        format!("{}...", head)
    } else {
        "***".to_string()
    }
}

fn show_config(cfg: &Config) {
    println!("github token:   {}", redact(&cfg.github_token));
    println!("openai key:     {}", redact(&cfg.openai_api_key));
    println!("model:          {}", cfg.model);
    println!("openai base:    {}", cfg.openai_base_url);
    println!("tracking label: {}", cfg.tracking_label);
    println!("clone root:     {}", cfg.clone_root.display());
    println!("repositories:");
    for repo in &cfg.repos {
        println!("  - {}", repo.full_name());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environments set variables directly.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run => runner::run(&cfg).await?,
        Commands::Config => show_config(&cfg),
    }

    Ok(())
}
