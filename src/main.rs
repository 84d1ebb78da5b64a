//! Historian CLI - merge per-user browser histories and query the result

use clap::{Parser, Subcommand};
use historian::config::{self, HistorianConfig};
use historian::importer::Importer;
use historian::query::{QueryEngine, UrlFilter, VisitGraph};
use historian::registry::SourceRegistry;
use historian::storage::SqliteStore;
use historian::ui::{self, Icons};
use historian::{LocalKey, WebkitTime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "historian")]
#[command(version)]
#[command(about = "Merge per-user browser history databases into one queryable store")]
#[command(long_about = r#"
Historian merges the Chromium-style History files of several users into a
single consolidated store, enabling:
  • Change detection (unchanged sources are skipped)
  • Filtered, paginated URL queries across users
  • Visit lineage: predecessors, successors, bounded walks

Example usage:
  historian init --histories ./histories
  historian import
  historian urls --user alice --url github --limit 20
  historian chain 1/4242 --depth 5
"#)]
struct Cli {
    /// Config file (defaults to ./historian.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Consolidated store (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a historian.toml
    Init {
        /// Directory holding one history file per user
        #[arg(long)]
        histories: Option<String>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Import every user's history file from a directory
    Import {
        /// Directory of source files, named after their users
        histories: Option<PathBuf>,

        /// Only import these users
        #[arg(short, long)]
        user: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// List merged users
    Users {
        #[arg(long)]
        json: bool,
    },

    /// List urls, most recently visited first
    Urls {
        #[arg(short, long)]
        user: Option<String>,

        /// Last visited before (raw timestamp, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        before: Option<WebkitTime>,

        /// Last visited after (raw timestamp, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        after: Option<WebkitTime>,

        /// Substring of the address
        #[arg(long)]
        url: Option<String>,

        /// Substring of the title
        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        offset: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show one url and its visits
    Url {
        /// Url key, `<user_id>/<local_id>`
        key: LocalKey,

        #[arg(long)]
        json: bool,
    },

    /// Show one visit with its neighbours
    Visit {
        /// Visit key, `<user_id>/<local_id>`
        key: LocalKey,

        #[arg(long)]
        json: bool,
    },

    /// Follow a visit's predecessors
    Chain {
        key: LocalKey,

        /// Maximum number of predecessors
        #[arg(long, default_value = "10")]
        depth: usize,

        #[arg(long)]
        json: bool,
    },

    /// Visits reachable from a visit in either direction
    Graph {
        key: LocalKey,

        /// Node cap (defaults to max_graph_nodes from the config)
        #[arg(long)]
        max_nodes: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show statistics about the consolidated store
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Serve the read-only JSON API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let settings = match config::load_config(Some(&config_path))? {
        Some(loaded) => loaded,
        None if cli.config.is_some() => anyhow::bail!("config not found: {}", config_path.display()),
        None => HistorianConfig::default(),
    };
    let database = cli.database.clone().unwrap_or_else(|| settings.database_path());

    match cli.command {
        Commands::Init { histories, force } => {
            let written = HistorianConfig {
                database: Some(database.display().to_string()),
                histories: histories.or(settings.histories.clone()),
                max_graph_nodes: Some(settings.max_graph_nodes()),
                port: Some(settings.port()),
            };
            config::write_config(&config_path, &written, force)?;
            ui::success(&format!("Wrote {}", config_path.display()));
        }

        Commands::Import { histories, user, json } => {
            let directory = histories
                .or_else(|| settings.histories_path())
                .ok_or_else(|| anyhow::anyhow!("no histories directory given and none configured"))?;
            run_import(&directory, &database, &user, json)?;
        }

        Commands::Users { json } => {
            let store = open_store(&database)?;
            let users = QueryEngine::new(&store).list_users()?;
            if json {
                print_json(&users)?;
            } else if users.is_empty() {
                println!("∅ No users imported yet.");
            } else {
                println!("{}", ui::user_table(&users));
            }
        }

        Commands::Urls { user, before, after, url, title, limit, offset, json } => {
            let store = open_store(&database)?;
            let engine = QueryEngine::new(&store);
            let filter = UrlFilter {
                user,
                visited_before: before,
                visited_after: after,
                url_pattern: url,
                title_pattern: title,
                limit,
                offset,
            };
            let urls = engine.list_urls(&filter)?;

            if json {
                print_json(&urls)?;
            } else if urls.is_empty() {
                println!("❌ No urls found.");
            } else {
                println!("{}", ui::url_table(&urls));
                let total = engine.url_count(filter.user.as_deref())?;
                ui::summary_row("Shown", &format!("{} of {}", urls.len(), total));
            }
        }

        Commands::Url { key, json } => {
            let store = open_store(&database)?;
            let engine = QueryEngine::new(&store);
            let url = engine.get_url(key)?;
            let visits = engine.visits_for_url(key)?;

            if json {
                print_json(&serde_json::json!({ "url": url, "visits": visits }))?;
            } else {
                ui::header(&url.address);
                ui::status(Icons::INFO, "Title", &url.title);
                ui::status(Icons::CLOCK, "Last visit", &url.last_visit_time.to_string());
                ui::status(Icons::STATS, "Visits / typed", &format!("{} / {}", url.visit_count, url.typed_count));
                ui::section("Visits");
                println!("{}", ui::visit_table(&visits));
            }
        }

        Commands::Visit { key, json } => {
            let store = open_store(&database)?;
            let engine = QueryEngine::new(&store);
            let graph = VisitGraph::new(&store);
            let visit = engine.get_visit(key)?;
            let url = engine.get_url(visit.url_key())?;
            let source = engine.visit_source(key)?;
            let predecessor = graph.predecessor(&visit)?;
            let successors = graph.successors(&visit)?;

            if json {
                print_json(&serde_json::json!({
                    "visit": visit,
                    "url": url,
                    "source": source,
                    "predecessor": predecessor,
                    "successors": successors,
                }))?;
            } else {
                ui::header(&format!("Visit {}", visit.key()));
                ui::status(Icons::LINK, "Url", &url.address);
                ui::status(Icons::CLOCK, "Time", &visit.visit_time.to_string());
                ui::status(Icons::GEAR, "Transition", &visit.transition.to_string());
                if let Some(source) = source {
                    ui::status(Icons::INFO, "Source", &source.source.to_string());
                }
                match predecessor {
                    Some(prev) => ui::status(Icons::UP, "From", &prev.key().to_string()),
                    None => ui::status(Icons::UP, "From", &ui::muted("(chain start)")),
                }
                ui::status(Icons::DOWN, "Led to", &successors.len().to_string());
                if !successors.is_empty() {
                    println!("{}", ui::visit_table(&successors));
                }
            }
        }

        Commands::Chain { key, depth, json } => {
            let store = open_store(&database)?;
            let visit = QueryEngine::new(&store).get_visit(key)?;
            let chain = VisitGraph::new(&store).lineage_chain(&visit, depth)?;

            if json {
                print_json(&chain)?;
            } else {
                println!("{} Lineage of {} (depth: {})...", Icons::LINK, key, depth);
                println!("{}", ui::visit_table(&chain));
            }
        }

        Commands::Graph { key, max_nodes, json } => {
            let store = open_store(&database)?;
            let max_nodes = max_nodes.unwrap_or_else(|| settings.max_graph_nodes());
            let visit = QueryEngine::new(&store).get_visit(key)?;
            let nodes = VisitGraph::new(&store).reachable_subgraph(&visit, max_nodes)?;

            if json {
                print_json(&nodes)?;
            } else {
                println!("{} Reachable from {} (max: {})...", Icons::LINK, key, max_nodes);
                println!("{}", ui::visit_table(&nodes));
                if nodes.len() >= max_nodes {
                    ui::warn("Node cap reached; the walk may be incomplete.");
                }
            }
        }

        Commands::Stats { json } => {
            let store = open_store(&database)?;
            let stats = QueryEngine::new(&store).stats()?;

            if json {
                print_json(&stats)?;
            } else {
                println!("{} Historian Statistics ({})", Icons::STATS, database.display());
                let users = stats.users.to_string();
                let urls = stats.urls.to_string();
                let visits = stats.visits.to_string();
                let sources = stats.visit_sources.to_string();
                println!(
                    "{}",
                    ui::stats_table(&[
                        ("Users", users.as_str()),
                        ("Urls", urls.as_str()),
                        ("Visits", visits.as_str()),
                        ("Visit sources", sources.as_str()),
                    ])
                );
            }
        }

        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| settings.port());
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(historian::server::start_server(port, database, settings.max_graph_nodes()))?;
        }
    }

    Ok(())
}

fn open_store(database: &Path) -> anyhow::Result<SqliteStore> {
    if !database.exists() {
        anyhow::bail!("no consolidated store at {} (run `historian import` first)", database.display());
    }
    Ok(SqliteStore::open_read_only(database)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_import(directory: &Path, database: &Path, only: &[String], json: bool) -> anyhow::Result<()> {
    let discovered = SourceRegistry::discover(directory)?;
    let registry = if only.is_empty() {
        discovered
    } else {
        let mut selected = SourceRegistry::new();
        for name in only {
            let path = discovered
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("no history file for user '{}' in {}", name, directory.display()))?;
            selected.insert(name.clone(), path)?;
        }
        selected
    };

    config::ensure_db_dir(database)?;
    let mut store = SqliteStore::open(database)?;
    let mut importer = Importer::new(&mut store);

    let report = if json {
        let report = importer.import_all(&registry);
        print_json(&report)?;
        report
    } else {
        ui::header(&format!("Importing {} histories", registry.len()));
        ui::status(Icons::FOLDER, "Sources", &directory.display().to_string());
        ui::status(Icons::DATABASE, "Database", &database.display().to_string());

        let started = Instant::now();
        let progress = ui::ImportProgress::new(registry.len());
        let report = importer.import_all_with(&registry, |user, outcome| progress.finish_user(user, outcome));
        progress.finish_with_summary(started.elapsed(), &report);

        for (user, error) in report.failures() {
            ui::error(&format!("{}: {}", user, error));
        }
        report
    };

    // non-zero exit so scripts notice partial imports
    if let Some(summary) = report.failure_summary() {
        anyhow::bail!(summary);
    }
    Ok(())
}
