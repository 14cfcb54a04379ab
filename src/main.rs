//! crawldesk CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use crawldesk::{
    commands::{
        cmd_crawl, cmd_db_init, cmd_db_status, cmd_serve, print_db_status, print_summary,
        CrawlOptions,
    },
    config::Config,
    error::{Error, Result},
    logging,
};

#[derive(Parser)]
#[command(name = "crawldesk")]
#[command(version, about = "Chat and crawl-to-vector-store dashboard", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard
    Serve {
        /// Address to bind (overrides CRAWLDESK_BIND)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Crawl a site and index its pages without the dashboard
    Crawl {
        /// URL to crawl
        url: String,

        /// Maximum pages to crawl
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Manage the Qdrant collection
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Initialize/create the Qdrant collection
    Init,

    /// Show Qdrant collection status
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be installed yet when configuration fails
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "crawldesk", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::from_env()?;
    logging::init(&config.logging, cli.verbose, cli.json)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.dashboard.bind_addr = bind;
            }
            cmd_serve(&config).await?;
        }

        Commands::Crawl { url, limit } => {
            let summary = cmd_crawl(&config, CrawlOptions { url, limit }).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            if !summary.succeeded() {
                return Err(Error::Crawl(format!(
                    "crawl ended with status '{}'",
                    summary.status
                )));
            }
        }

        Commands::Db { action } => handle_db_action(&config, action, cli.json).await?,

        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

async fn handle_db_action(config: &Config, action: DbAction, json: bool) -> Result<()> {
    match action {
        DbAction::Init => match cmd_db_init(config).await? {
            Some(spec) => println!(
                "✓ Collection '{}' ready ({} dims, {})",
                spec.name, spec.dimension, spec.distance
            ),
            None => println!("QDRANT_URL is not set; nothing to initialize"),
        },

        DbAction::Status => {
            let status = cmd_db_status(config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_db_status(&status);
            }
        }
    }

    Ok(())
}
