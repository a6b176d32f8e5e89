//! Command-line interface for cratedigger.
//!
//! Provides commands for syncing the collection, harvesting a mailbox
//! export, and inspecting the cache and ledger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::config::paths::StateLock;
use crate::config::{config, ResolvedConfig};
use crate::core::{reconcile, ListenedSet, ReconcileStats};
use crate::domain::{Collection, FetchedBatch};
use crate::ingest::{FolderSpec, HarvestReport, Harvester, JsonMailboxSource};
use crate::store::{Ledger, LedgerStatus, ProcessedCache};

/// cratedigger - Mailbox-fed music collection with tombstone-aware sync
#[derive(Parser, Debug)]
#[command(name = "cratedigger")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge new mail and listened marks into the collection
    Sync {
        /// Browser export with the listened marks
        #[arg(short, long)]
        listened: Option<PathBuf>,

        /// Mailbox export to harvest before reconciling
        #[arg(short, long)]
        mailbox: Option<PathBuf>,

        /// Folders to harvest, "path:genre" (defaults to the config file)
        #[arg(short, long, num_args = 1..)]
        folders: Vec<String>,

        /// Collection to read (defaults to the configured collection)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the new collection (defaults to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Reconcile previously harvested items into the collection
    Reconcile {
        /// Fetched items (output of `harvest`)
        #[arg(short, long)]
        fetched: PathBuf,

        /// Browser export with the listened marks
        #[arg(short, long)]
        listened: Option<PathBuf>,

        /// Collection to read (defaults to the configured collection)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the new collection (defaults to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Scan a mailbox export and write the releases found
    Harvest {
        /// Mailbox export file
        #[arg(short, long)]
        mailbox: PathBuf,

        /// Folders to harvest, "path:genre" (defaults to the config file)
        #[arg(short, long, num_args = 1..)]
        folders: Vec<String>,

        /// Output file for the fetched items
        #[arg(short, long, default_value = "fetched.json")]
        output: PathBuf,

        /// Ignore the processed-message cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Manage the processed-message cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Inspect the membership ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Delete every cache entry
    Clear,

    /// Delete entries older than the TTL
    Evict {
        /// Age limit in days (defaults to the configured TTL)
        #[arg(short, long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Show active and removed counts
    Stats {
        /// Limit to one genre
        #[arg(short, long)]
        genre: Option<String>,
    },

    /// List the ledger entries of a genre
    Show {
        /// Genre name
        genre: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        self.run(config()?)
    }

    /// Execute against an explicit configuration
    pub fn run(self, config: &ResolvedConfig) -> Result<()> {
        match self.command {
            Commands::Sync {
                listened,
                mailbox,
                folders,
                input,
                output,
                dry_run,
            } => {
                let fetch = match mailbox {
                    Some(path) => Fetch::Mailbox { path, folders },
                    None => Fetch::Nothing,
                };
                sync(config, SyncOptions { listened, fetch, input, output, dry_run })
            }
            Commands::Reconcile {
                fetched,
                listened,
                input,
                output,
                dry_run,
            } => {
                let fetch = Fetch::File(fetched);
                sync(config, SyncOptions { listened, fetch, input, output, dry_run })
            }
            Commands::Harvest {
                mailbox,
                folders,
                output,
                no_cache,
            } => harvest(config, &mailbox, &folders, &output, no_cache),
            Commands::Cache { command } => execute_cache(config, command),
            Commands::Ledger { command } => execute_ledger(config, command),
            Commands::Config => show_config(config),
        }
    }
}

/// Where a sync gets its fetched items from
enum Fetch {
    Nothing,
    File(PathBuf),
    Mailbox { path: PathBuf, folders: Vec<String> },
}

struct SyncOptions {
    listened: Option<PathBuf>,
    fetch: Fetch,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
}

/// Folder specs from the command line, falling back to the config file
fn resolve_folders(config: &ResolvedConfig, folders: &[String]) -> Result<Vec<FolderSpec>> {
    if folders.is_empty() {
        if config.folders.is_empty() {
            anyhow::bail!("No folders given. Use --folders \"INBOX/Rock:Rock\" or set `folders` in the config file");
        }
        return Ok(config.folders.clone());
    }

    folders
        .iter()
        .map(|s| s.parse::<FolderSpec>().map_err(anyhow::Error::from))
        .collect()
}

/// Run the full pipeline: harvest, reconcile, persist
fn sync(config: &ResolvedConfig, options: SyncOptions) -> Result<()> {
    // A dry run writes nothing, the lock file included.
    let _lock = if options.dry_run {
        None
    } else {
        Some(StateLock::acquire(&config.lock_path())?)
    };

    let input = options.input.unwrap_or_else(|| config.collection.clone());
    let old = Collection::load(&input)?;
    info!(items = old.len(), path = %input.display(), "Collection loaded");

    let listened = match &options.listened {
        Some(path) => ListenedSet::load(path)?,
        None => ListenedSet::new(),
    };

    let mut cache = ProcessedCache::open(config.cache_path());
    if options.dry_run {
        cache = cache.detached();
    }
    let mut cache_failures = 0;
    let fetched = match &options.fetch {
        Fetch::Nothing => FetchedBatch::new(),
        Fetch::File(path) => FetchedBatch::load(path)?,
        Fetch::Mailbox { path, folders } => {
            let folders = resolve_folders(config, folders)?;
            let mut source = JsonMailboxSource::open(path)
                .with_context(|| format!("Failed to open mailbox export: {}", path.display()))?;
            let (batch, report) = Harvester::new(&mut cache).harvest(&mut source, &folders);
            print_harvest_report(&report);
            cache_failures = report.persist_failures;
            batch
        }
    };

    let mut ledger = Ledger::open(config.ledger_path());
    let (next, stats) = reconcile(&old, &fetched, &listened, &mut ledger);
    print_reconcile_stats(&stats);

    let warnings = cache.warnings().len() + ledger.warnings().len();
    if warnings > 0 {
        println!("\n{} state file warning(s); see the log for details", warnings);
    }

    if options.dry_run {
        println!("\nDry run: nothing written");
        return Ok(());
    }

    // The ledger goes first: a collection saved without its tombstones would
    // let the next harvest bring the removed releases back.
    ledger.persist().map_err(|e| {
        error!(error = %e, "Failed to persist ledger");
        anyhow::anyhow!(e).context("Ledger not saved; collection left unchanged")
    })?;

    let output = options.output.unwrap_or(input);
    next.save(&output)?;
    println!("\nCollection written to {}", output.display());

    if cache_failures > 0 {
        anyhow::bail!("Cache could not be saved; the next run will extract these messages again");
    }

    Ok(())
}

/// Scan a mailbox export into a fetched-items file
fn harvest(
    config: &ResolvedConfig,
    mailbox: &Path,
    folders: &[String],
    output: &Path,
    no_cache: bool,
) -> Result<()> {
    let folders = resolve_folders(config, folders)?;
    let _lock = StateLock::acquire(&config.lock_path())?;

    let mut source = JsonMailboxSource::open(mailbox)
        .with_context(|| format!("Failed to open mailbox export: {}", mailbox.display()))?;

    let mut cache = if no_cache {
        ProcessedCache::in_memory()
    } else {
        ProcessedCache::open(config.cache_path())
    };

    let (batch, report) = Harvester::new(&mut cache).harvest(&mut source, &folders);
    print_harvest_report(&report);

    batch.save(output)?;
    println!("\n{} item(s) written to {}", batch.len(), output.display());

    if report.persist_failures > 0 {
        anyhow::bail!("Cache could not be saved; the next run will extract these messages again");
    }

    Ok(())
}

fn execute_cache(config: &ResolvedConfig, command: CacheCommands) -> Result<()> {
    match command {
        CacheCommands::Stats => {
            let cache = ProcessedCache::open(config.cache_path());
            let stats = cache.stats();

            println!("Cache: {}", config.cache_path().display());
            println!("  Messages: {}", stats.messages);
            println!("  Servers:  {}", stats.servers);
            println!("  Accounts: {}", stats.accounts);
            println!("  Folders:  {}", stats.folders);
            if !cache.warnings().is_empty() {
                println!("  Warnings: {}", cache.warnings().len());
            }
            Ok(())
        }
        CacheCommands::Clear => {
            let _lock = StateLock::acquire(&config.lock_path())?;
            let mut cache = ProcessedCache::open(config.cache_path());
            let removed = cache.clear();
            cache.persist()?;
            println!("Cleared {} cache entries", removed);
            Ok(())
        }
        CacheCommands::Evict { days } => {
            let _lock = StateLock::acquire(&config.lock_path())?;
            let days = days.unwrap_or(config.cache_ttl_days);
            let mut cache = ProcessedCache::open(config.cache_path());
            let report = cache.evict_older_than(days);
            if report.removed > 0 {
                cache.persist()?;
            }

            println!("Evicted {} entries older than {} days", report.removed, days);
            if report.untimestamped > 0 {
                println!("Kept {} entries without a valid timestamp", report.untimestamped);
            }
            Ok(())
        }
    }
}

fn execute_ledger(config: &ResolvedConfig, command: LedgerCommands) -> Result<()> {
    let ledger = Ledger::open(config.ledger_path());
    if !ledger.warnings().is_empty() {
        warn!(count = ledger.warnings().len(), "Ledger loaded with warnings");
    }

    match command {
        LedgerCommands::Stats { genre } => {
            let genres: Vec<&str> = match &genre {
                Some(g) => vec![g.as_str()],
                None => ledger.genres().collect(),
            };

            println!("{:<30} {:>8} {:>8}", "GENRE", "ACTIVE", "REMOVED");
            println!("{}", "-".repeat(48));
            for g in genres {
                println!(
                    "{:<30} {:>8} {:>8}",
                    g,
                    ledger.active_count(Some(g)),
                    ledger.removed_count(Some(g))
                );
            }
            println!("{}", "-".repeat(48));
            println!(
                "{:<30} {:>8} {:>8}",
                "TOTAL",
                ledger.active_count(genre.as_deref()),
                ledger.removed_count(genre.as_deref())
            );
            Ok(())
        }
        LedgerCommands::Show { genre } => {
            let mut found = false;
            println!("{:<24} {:<8} {:<26} URL", "ID", "STATUS", "ADDED");
            println!("{}", "-".repeat(90));

            for (id, entry) in ledger.entries(&genre) {
                found = true;
                let status = match entry.status {
                    LedgerStatus::Active => "active",
                    LedgerStatus::Removed => "removed",
                };
                let added = entry
                    .added_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<24} {:<8} {:<26} {}", id.as_str(), status, added, entry.url);
            }

            if !found {
                println!("No ledger entries for genre '{}'", genre);
            }
            Ok(())
        }
    }
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Home:       {}", config.home.display());
    println!("Collection: {}", config.collection.display());
    println!("Cache:      {}", config.cache_path().display());
    println!("Ledger:     {}", config.ledger_path().display());
    println!("Cache TTL:  {} days", config.cache_ttl_days);
    match &config.config_file {
        Some(path) => println!("Config:     {}", path.display()),
        None => println!("Config:     (none, using defaults)"),
    }
    for spec in &config.folders {
        println!("Folder:     {} -> {}", spec.folder, spec.genre);
    }
    Ok(())
}

fn print_harvest_report(report: &HarvestReport) {
    println!("Harvest:");
    println!("  Listed:     {}", report.listed);
    println!("  From cache: {}", report.cached);
    println!("  Extracted:  {}", report.extracted);
    println!("  No release: {}", report.no_release);
    if report.failed > 0 || report.failed_folders > 0 {
        println!(
            "  Failed:     {} message(s), {} folder(s)",
            report.failed, report.failed_folders
        );
    }
}

fn print_reconcile_stats(stats: &ReconcileStats) {
    println!(
        "\n{:<30} {:>6} {:>6} {:>8} {:>8}",
        "GENRE", "KEPT", "ADDED", "REMOVED", "SKIPPED"
    );
    println!("{}", "-".repeat(62));

    for (genre, s) in &stats.by_genre {
        println!(
            "{:<30} {:>6} {:>6} {:>8} {:>8}",
            genre, s.kept, s.added, s.removed, s.skipped
        );
    }

    let t = &stats.total;
    println!("{}", "-".repeat(62));
    println!(
        "{:<30} {:>6} {:>6} {:>8} {:>8}",
        "TOTAL", t.kept, t.added, t.removed, t.skipped
    );

    if t.duplicates > 0 {
        println!("\n{} duplicate link(s) dropped", t.duplicates);
    }
    if t.unmatched_listened > 0 {
        println!(
            "\n{} listened id(s) matched no release. The page may be reporting ids \
             from an older scheme; regenerate it from the current collection.",
            t.unmatched_listened
        );
    }
}
