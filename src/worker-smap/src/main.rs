use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use core_smap::registry::DEFAULT_HREFLANG;
use core_smap::{
    GenerationBudget, PassOutcome, QueueWorker, SitemapTypeRegistry, StaticSite, Stores, TimeUnit, VariantRegistry,
    get_poll_interval, setup_logging,
};
use data_model_smap::{PgStore, get_db_pool};

use worker_smap::{Error, generate, poll_loop, rebuild_queue, seed_settings};

#[derive(Parser)]
#[command(name = "worker-smap")]
#[command(about = "Builds and publishes the XML sitemaps of a site", long_about = None)]
struct WorkerCli {
    /// JSON manifest of the site (languages, entities, paths, per-variant link configuration).
    #[arg(long, env = "SMAP_SITE_MANIFEST", global = true)]
    site: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever: run budgeted generation passes, resuming where the last one stopped.
    Run,
    /// Run one full generation pass to completion.
    Generate,
    /// Discard queued work and enqueue every enabled variant again.
    RebuildQueue,
    /// Manage sitemap variants.
    Variants {
        #[command(subcommand)]
        command: VariantCommands,
    },
}

#[derive(Subcommand)]
enum VariantCommands {
    /// List variants in processing order.
    List,
    Add {
        name: String,
        /// Registered sitemap type of the variant.
        #[arg(long, default_value = DEFAULT_HREFLANG)]
        sitemap_type: String,
        #[arg(long)]
        label: Option<String>,
        /// Variants are processed (and listed) by ascending weight.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        weight: i32,
    },
    /// Remove a variant with its queued work and published sitemap.
    Remove { name: String },
    Enable { name: String },
    Disable { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file., if it exists
    dotenvy::dotenv().ok();

    setup_logging("worker_smap=debug,core_smap=info,data_model_smap=info");

    let cli = WorkerCli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Busy) => {
            tracing::warn!("{}", Error::Busy);
            ExitCode::from(2)
        }
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: WorkerCli) -> Result<(), Error> {
    let pool = get_db_pool().await?;
    let stores = Stores::from_store(PgStore::new(pool));
    let settings = seed_settings(&stores).await?;
    let registry = VariantRegistry::new(stores.clone(), SitemapTypeRegistry::builtin());

    let command = match cli.command {
        Commands::Variants { command } => return manage_variants(&registry, command).await,
        command => command,
    };

    let site_path = cli
        .site
        .ok_or_else(|| Error::SiteError("no site manifest given (--site or SMAP_SITE_MANIFEST)".to_string()))?;
    let site = StaticSite::from_json_file(&site_path)
        .map_err(|e| Error::SiteError(format!("{}: {}", site_path.display(), e)))?
        .into_site();
    let mut worker = QueueWorker::new(stores, site, registry).with_fallback_settings(settings);

    match command {
        Commands::Run => {
            let poll_interval = get_poll_interval(TimeUnit::Milliseconds, "WORKER_POLL_INTERVAL_MS", 60_000);
            poll_loop(&mut worker, poll_interval).await;
        }
        Commands::Generate => match generate(&mut worker, GenerationBudget::Unbounded).await? {
            PassOutcome::Completed(progress) => println!("Sitemaps generated: {}", progress),
            PassOutcome::Suspended(progress) => println!("Sitemap generation suspended: {}", progress),
        },
        Commands::RebuildQueue => {
            let queued = rebuild_queue(&mut worker).await?;
            println!("Queued {} tasks", queued);
        }
        Commands::Variants { .. } => {}
    }
    Ok(())
}

async fn manage_variants(registry: &VariantRegistry, command: VariantCommands) -> Result<(), Error> {
    match command {
        VariantCommands::List => {
            for variant in registry.get_variants().await? {
                println!(
                    "{}\t{}\tweight={}\t{}\t{}",
                    variant.name,
                    variant.sitemap_type,
                    variant.weight,
                    if variant.enabled { "enabled" } else { "disabled" },
                    variant.label
                );
            }
        }
        VariantCommands::Add {
            name,
            sitemap_type,
            label,
            weight,
        } => {
            let variant = registry
                .add_variant(&name, &sitemap_type, label.as_deref(), weight)
                .await?;
            println!(
                "Added variant {} ({})",
                variant.name,
                if variant.enabled { "enabled" } else { "disabled" }
            );
        }
        VariantCommands::Remove { name } => {
            registry.remove_variant(&name).await?;
            println!("Removed variant {}", name);
        }
        VariantCommands::Enable { name } => {
            registry.set_enabled(&name, true).await?;
            println!("Enabled variant {}", name);
        }
        VariantCommands::Disable { name } => {
            registry.set_enabled(&name, false).await?;
            println!("Disabled variant {}", name);
        }
    }
    Ok(())
}
