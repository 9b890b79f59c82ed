//! Sanity Pack CLI
//!
//! Entry point for the `sanity-pack` command-line tool.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use sanity_cache::{CacheKind, CacheManager, Region};
use sanity_pack::config::DEFAULT_CONFIG_FILE;
use sanity_pack::pipeline::{self, Stage, StageContext};
use sanity_pack::{AssetSource, Config, LoadedConfig, MirrorSource};
use sanity_schema::{FlatcDecoder, GitHistory};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sanity-pack")]
#[command(about = "Incremental game-data extraction and decoding", version)]
struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Restrict to these regions (default: all enabled regions)
    #[arg(long, short = 'r', global = true, value_delimiter = ',')]
    region: Vec<Region>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cache management commands
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Schema history commands
    Schemas {
        #[command(subcommand)]
        action: SchemaCommands,
    },

    /// Fetch changed assets
    Download {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resolve schemas and decode binary tables
    Decode {
        /// Decode even when the JSON output is up to date
        #[arg(long)]
        force: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Download then decode
    Pipeline {
        /// Decode even when the JSON output is up to date
        #[arg(long)]
        force: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Clear cache documents
    Clear {
        /// Which cache to clear
        #[arg(value_enum, default_value = "all")]
        kind: KindArg,

        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Report whether each cache document is readable
    Validate,

    /// Print the cached hash of one asset
    CheckAsset {
        region: Region,
        path: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Clone or fast-forward the schema history checkout
    Sync,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Versions,
    Assets,
    Bindings,
    All,
}

impl From<KindArg> for CacheKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Versions => CacheKind::Versions,
            KindArg::Assets => CacheKind::Assets,
            KindArg::Bindings => CacheKind::Bindings,
            KindArg::All => CacheKind::All,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loaded = match Config::load(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Cache { action } => match action {
            CacheCommands::Show { json } => run_cache_show(&loaded.config, json),
            CacheCommands::Clear { kind, force } => {
                run_cache_clear(&loaded.config, kind.into(), single_region(&cli.region), force)
            }
            CacheCommands::Validate => run_cache_validate(&loaded.config),
            CacheCommands::CheckAsset { region, path } => {
                run_cache_check_asset(&loaded.config, region, &path)
            }
        },
        Commands::Config { action } => match action {
            ConfigCommands::Show => run_config_show(&loaded),
        },
        Commands::Schemas { action } => match action {
            SchemaCommands::Sync => run_schemas_sync(&loaded.config),
        },
        Commands::Download { json } => {
            run_stages(&loaded.config, &cli.region, &[Stage::Download], false, json)
        }
        Commands::Decode { force, json } => {
            run_stages(&loaded.config, &cli.region, &[Stage::Decode], force, json)
        }
        Commands::Pipeline { force, json } => {
            run_stages(&loaded.config, &cli.region, &Stage::ALL, force, json)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_caches(config: &Config) -> CacheManager {
    match CacheManager::new(&config.cache_dir) {
        Ok(caches) => caches,
        Err(e) => {
            eprintln!("Error opening cache directory: {}", e);
            process::exit(1);
        }
    }
}

/// `--region` for commands that act on at most one region.
fn single_region(regions: &[Region]) -> Option<Region> {
    match regions {
        [] => None,
        [region] => Some(*region),
        _ => {
            eprintln!("Error: this command accepts a single --region");
            process::exit(2);
        }
    }
}

fn run_cache_show(config: &Config, json_output: bool) {
    let caches = open_caches(config);
    let stats = caches.stats();

    if json_output {
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing stats: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Cache directory: {}", stats.cache_dir.display());
    println!(
        "Documents: versions={} assets={} bindings={}",
        present(stats.version_cache_exists),
        present(stats.asset_cache_exists),
        present(stats.binding_cache_exists)
    );
    println!("Tracked regions: {}", stats.tracked_regions);
    println!("Total assets:    {}", stats.total_assets);
    println!("Total bindings:  {}", stats.total_bindings);

    if stats.regions.is_empty() {
        return;
    }
    println!();
    println!("{:<7} {:<20} {:<14} {:>8} {:>9}", "REGION", "RESOURCE", "CLIENT", "ASSETS", "BINDINGS");
    for (region, region_stats) in &stats.regions {
        let (resource, client) = region_stats
            .version
            .as_ref()
            .map_or(("-", "-"), |v| (v.resource.as_str(), v.client.as_str()));
        println!(
            "{:<7} {:<20} {:<14} {:>8} {:>9}",
            region.code(),
            resource,
            client,
            region_stats.assets,
            region_stats.bindings
        );
    }
}

fn present(exists: bool) -> &'static str {
    if exists {
        "present"
    } else {
        "missing"
    }
}

fn run_cache_clear(config: &Config, kind: CacheKind, region: Option<Region>, force: bool) {
    let scope = region.map_or("all regions".to_string(), |r| r.to_string());
    if !force && !confirm(&format!("Clear {:?} cache for {}?", kind, scope)) {
        println!("Aborted");
        return;
    }

    let caches = open_caches(config);
    caches.clear(kind, region);
    if let Err(e) = caches.save(kind) {
        eprintln!("Error saving caches: {}", e);
        process::exit(1);
    }
    println!("Cleared {:?} cache for {}", kind, scope);
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn run_cache_validate(config: &Config) {
    let caches = open_caches(config);
    let report = caches.validate();

    for (kind, path, status) in &report.entries {
        match status {
            sanity_cache::DocumentStatus::Corrupt(reason) => {
                println!("{:<9} {:<8} {} ({})", format!("{:?}", kind), status.as_str(), path.display(), reason)
            }
            _ => println!("{:<9} {:<8} {}", format!("{:?}", kind), status.as_str(), path.display()),
        }
    }

    if !report.is_healthy() {
        process::exit(1);
    }
}

fn run_cache_check_asset(config: &Config, region: Region, path: &str) {
    let caches = open_caches(config);
    let path = sanity_cache::normalize_path(path);
    match caches.assets().read(|a| a.get_hash(region, &path).map(str::to_string)) {
        Some(hash) => println!("{} {} {}", region, path, hash),
        None => {
            println!("{} {} not cached", region, path);
            process::exit(1);
        }
    }
}

fn run_config_show(loaded: &LoadedConfig) {
    println!("Config file: {}", loaded.path.display());
    match &loaded.digest {
        Some(digest) => println!("Digest:      sha256:{}", digest),
        None => println!("Digest:      (defaults, file not found)"),
    }
    match toml::to_string_pretty(&loaded.config) {
        Ok(text) => {
            println!();
            print!("{}", text);
        }
        Err(e) => {
            eprintln!("Error rendering config: {}", e);
            process::exit(1);
        }
    }
}

fn run_schemas_sync(config: &Config) {
    let Some(url) = config.schema_repo_url.as_deref() else {
        eprintln!("Error: schema_repo_url is not configured");
        process::exit(1);
    };
    let history = GitHistory::new(&config.schema_repo);
    if let Err(e) = history.sync(url) {
        eprintln!("Error syncing schema repository: {}", e);
        process::exit(1);
    }
    println!("Schema repository ready at {}", config.schema_repo.display());
}

fn run_stages(config: &Config, regions: &[Region], stages: &[Stage], force: bool, json_output: bool) {
    let regions = if regions.is_empty() {
        config.enabled_regions()
    } else {
        regions.to_vec()
    };
    if regions.is_empty() {
        eprintln!("Error: no regions enabled in config and none given with --region");
        process::exit(1);
    }

    let caches = open_caches(config);
    let mirror = config.mirror_dir.as_ref().map(MirrorSource::new);
    let history = GitHistory::new(&config.schema_repo);
    let decoder = FlatcDecoder::new(&config.flatc_path);

    let ctx = StageContext {
        config,
        caches: &caches,
        source: mirror.as_ref().map(|m| m as &dyn AssetSource),
        history: &history,
        decoder: &decoder,
        force,
    };

    let summary = match pipeline::run(&ctx, &regions, stages) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if json_output {
        match summary.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing summary: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", summary.to_text());
    }

    process::exit(summary.exit_code);
}
