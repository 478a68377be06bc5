//! miharu CLI
//!
//! Local execution entry point for monitor checks and event discovery.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miharu::{
    engine::{
        ContentFetcher, DateRange, HttpFetcher, Runner, extract_dates, extract_dates_from_html,
        fingerprint, validate_selector,
    },
    error::{AppError, Result},
    lark::{LarkClient, LarkEnv},
    models::{Config, NewMonitor},
    notify::LarkMessenger,
    store::{LarkStore, RecordStore},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// miharu - Web Page Change Monitor
#[derive(Parser, Debug)]
#[command(
    name = "miharu",
    version,
    about = "Watches web pages for changes and discovers event pages"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full cycle: discovery, then all monitor checks
    Run,

    /// Check monitor targets without a discovery pass
    Check {
        /// Check a single record instead of all of them
        #[arg(long)]
        id: Option<String>,
    },

    /// Run the discovery phase only
    Discover,

    /// Fetch a page and print the extracted text, fingerprint and dates
    Extract {
        /// Page URL
        url: String,

        /// CSS selector to extract
        selector: String,

        /// Also run keyword-window date extraction over the raw HTML
        #[arg(long)]
        html_dates: bool,
    },

    /// Validate the configuration file, and optionally one selector
    Validate {
        /// Selector string to syntax-check
        #[arg(long)]
        selector: Option<String>,
    },

    /// List monitor targets, discovery rules and known events
    List,

    /// Create a monitor target
    Add {
        /// Page URL to watch
        url: String,

        /// CSS selector identifying the watched content
        selector: String,

        /// Display name used in notifications
        #[arg(long)]
        label: Option<String>,
    },

    /// Delete a monitor target
    Remove {
        /// Record id to delete
        id: String,
    },
}

/// Initialize logging based on verbosity flag. `RUST_LOG` wins when set.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Lark-backed collaborators shared by the store-touching commands.
struct Backend {
    fetcher: Arc<HttpFetcher>,
    store: Arc<LarkStore>,
    messenger: Arc<LarkMessenger>,
}

impl Backend {
    /// Wire the Lark adapters from the process environment.
    fn from_env(config: &Config) -> Result<Self> {
        let env = LarkEnv::from_env()?;
        let client = Arc::new(LarkClient::new(&env)?);
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::new(&config.fetch)?),
            store: Arc::new(LarkStore::new(client.clone(), &env)),
            messenger: Arc::new(LarkMessenger::new(client, &env)),
        })
    }

    fn runner(&self) -> Runner {
        Runner::new(
            self.fetcher.clone(),
            self.store.clone(),
            self.messenger.clone(),
        )
    }
}

/// Human-readable form of an extracted date range.
fn format_range(range: &DateRange) -> String {
    match (range.start, range.end) {
        (Some(start), Some(end)) if start == end => start.to_string(),
        (Some(start), Some(end)) => format!("{start} to {end}"),
        _ => "none".to_string(),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("miharu starting...");

    let config = Config::load_or_default(&cli.config);
    info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            let backend = Backend::from_env(&config)?;
            let outcome = backend.runner().run_cycle().await?;

            if let Some(discovery) = outcome.discovery {
                info!(
                    "Discovery: {} rules run, {} created, {} updated, {} failed",
                    discovery.rules, discovery.created, discovery.updated, discovery.failed
                );
            }
        }

        Command::Check { id } => {
            let backend = Backend::from_env(&config)?;
            let runner = backend.runner();

            match id {
                Some(id) => {
                    let outcome = runner.check_one(&id).await?;
                    info!("Check finished: {outcome:?}");
                }
                None => {
                    runner.check_all().await?;
                }
            }
        }

        Command::Discover => {
            let backend = Backend::from_env(&config)?;
            let outcome = backend.runner().run_discovery().await?;

            info!(
                "Discovery: {} rules run, {} created, {} updated, {} failed",
                outcome.rules, outcome.created, outcome.updated, outcome.failed
            );
        }

        Command::Extract {
            url,
            selector,
            html_dates,
        } => {
            let fetcher = HttpFetcher::new(&config.fetch)?;
            let content = fetcher.fetch_content(&url, &selector).await?;

            println!("{content}");
            println!();
            println!("Fingerprint: {}", fingerprint(&content));
            println!("Dates: {}", format_range(&extract_dates(&content)));

            if html_dates {
                let html = fetcher.fetch_raw_html(&url).await?;
                println!(
                    "HTML dates: {}",
                    format_range(&extract_dates_from_html(&html))
                );
            }
        }

        Command::Validate { selector } => {
            info!("Validating configuration...");

            if let Err(e) = config.validate() {
                tracing::error!("Config validation failed: {e}");
                return Err(e);
            }
            info!(
                "✓ Config OK ({} site profiles, {} render patterns)",
                config.fetch.site_profiles.len(),
                config.fetch.render_url_contains.len()
            );

            if let Some(selector) = selector {
                validate_selector(&selector)?;
                info!("✓ Selector OK");
            }

            info!("All validations passed!");
        }

        Command::List => {
            let backend = Backend::from_env(&config)?;

            let monitors = backend.store.list_monitors().await?;
            println!("Monitor targets ({}):", monitors.len());
            for target in &monitors {
                let status = match target.status.as_str() {
                    "" => "unchecked",
                    s => s,
                };
                println!(
                    "  {} [{}] {} -> {}",
                    target.id,
                    status,
                    target.url.as_deref().unwrap_or("-"),
                    target.selector.as_deref().unwrap_or("-")
                );
            }

            let rules = backend.store.list_rules().await?;
            println!("\nDiscovery rules ({}):", rules.len());
            for rule in &rules {
                println!(
                    "  {} [{}] {}",
                    rule.id,
                    if rule.is_active { "active" } else { "inactive" },
                    rule.source_url.as_deref().unwrap_or("-")
                );
            }

            let events = backend.store.list_events().await?;
            println!("\nKnown events ({}):", events.len());
            for event in &events {
                println!(
                    "  {} {} ({})",
                    event.id,
                    event.title.as_deref().unwrap_or("-"),
                    event.url.as_deref().unwrap_or("-")
                );
            }
        }

        Command::Add {
            url,
            selector,
            label,
        } => {
            if url.trim().is_empty() || selector.trim().is_empty() {
                return Err(AppError::validation("URL and selector are required"));
            }
            if !url.starts_with("http") {
                return Err(AppError::validation("URL must start with http"));
            }
            validate_selector(&selector)?;

            let backend = Backend::from_env(&config)?;
            let id = backend
                .store
                .create_monitor(&NewMonitor {
                    label,
                    url: url.clone(),
                    selector,
                })
                .await?;

            info!("Created monitor {id} for {url}");
        }

        Command::Remove { id } => {
            let backend = Backend::from_env(&config)?;
            backend.store.delete_monitor(&id).await?;

            info!("Deleted monitor {id}");
        }
    }

    info!("Done!");

    Ok(())
}
