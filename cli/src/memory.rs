use clap::Parser;
use clouvel_memory::MatchConfig;
use clouvel_memory::MatchQuery;
use clouvel_memory::MemoryLifecycleManager;
use clouvel_memory::MemoryStore;
use clouvel_memory::MemoryTextPatch;
use clouvel_memory::NewMemory;
use clouvel_memory::ReinforcementTracker;
use clouvel_memory::SearchQuery;
use clouvel_memory::TieredMatcher;
use clouvel_memory::factory;
use clouvel_memory::lifecycle::DEFAULT_STALE_DAYS;
use clouvel_memory::types::DEFAULT_SEVERITY;
use serde_json::json;

/// CLI for regression memory commands.
#[derive(Debug, Parser)]
pub struct MemoryCli {
    #[command(subcommand)]
    pub cmd: MemoryCommand,
}

/// Memory subcommands. Every command prints JSON on stdout.
#[derive(Debug, clap::Subcommand)]
pub enum MemoryCommand {
    /// Record a resolved error as a new memory.
    Add(AddArgs),
    /// Show one memory by id.
    Get { id: i64 },
    /// List memories, newest first.
    List {
        /// Include archived memories.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Find memories relevant to an error message.
    Match(MatchArgs),
    /// Count a reuse of a memory.
    Hit { id: i64 },
    /// Count a prevented repeat mistake.
    Saved { id: i64 },
    /// Edit the free-text fields of a memory.
    Edit {
        id: i64,
        #[arg(long)]
        task: Option<String>,
        #[arg(long = "root-cause")]
        root_cause: Option<String>,
        #[arg(long)]
        prevention: Option<String>,
    },
    /// Hide a memory from matching.
    Archive { id: i64 },
    /// Make an archived memory matchable again.
    Unarchive { id: i64 },
    /// Print the shareable lesson of a memory that has been hit.
    Promote { id: i64 },
    /// Flag never-hit memories older than the threshold.
    Stale {
        #[arg(long, default_value_t = DEFAULT_STALE_DAYS)]
        days: i64,
        /// Also archive what was flagged.
        #[arg(long)]
        archive: bool,
    },
    /// Keyword search over task, root cause and prevention rule.
    Search {
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Include archived memories.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show basic statistics about stored memories.
    Stats,
    /// Summarize activity over a period.
    Report {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Rebuild the full-text index from stored records.
    Reindex,
    /// Print the normalized signature of an error message.
    Normalize { text: String },
}

#[derive(Debug, clap::Args)]
pub struct AddArgs {
    /// Error message; normalized before storage.
    #[arg(long)]
    pub signature: String,
    #[arg(long = "root-cause", default_value = "")]
    pub root_cause: String,
    #[arg(long, default_value = "")]
    pub prevention: String,
    #[arg(long, default_value = "")]
    pub category: String,
    #[arg(long, default_value = "")]
    pub project: String,
    #[arg(long, default_value = "")]
    pub task: String,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long = "lib")]
    pub libraries: Vec<String>,
    #[arg(long = "file")]
    pub files: Vec<String>,
    #[arg(long, default_value = "")]
    pub code: String,
    #[arg(long, default_value = "")]
    pub fix: String,
    /// What must never be done again.
    #[arg(long, default_value = "")]
    pub negative: String,
    #[arg(long, default_value_t = DEFAULT_SEVERITY, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub severity: u8,
    #[arg(long = "source-error")]
    pub source_error_id: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct MatchArgs {
    pub text: String,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long = "lib")]
    pub libraries: Vec<String>,
    /// Files involved in the error; matched by path containment.
    #[arg(long = "file")]
    pub files: Vec<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long = "min-results")]
    pub min_results: Option<usize>,
    /// Keep searching lower levels after an exact hit.
    #[arg(long = "no-short-circuit")]
    pub no_short_circuit: bool,
}

/// Execute the memory command.
pub fn run(cli: MemoryCli) -> anyhow::Result<()> {
    if let MemoryCommand::Normalize { text } = &cli.cmd {
        print_json(&json!({ "signature": clouvel_memory::normalize(text) }))?;
        return Ok(());
    }

    let project_root = std::env::current_dir()?;
    tracing::debug!(
        command = ?cli.cmd,
        db = %factory::memory_db_path(&project_root).display(),
        "running memory command"
    );
    let store = factory::open_project_store(&project_root)?;
    match cli.cmd {
        MemoryCommand::Add(args) => {
            let id = store.create(args.into_new_memory())?;
            print_json(&json!({ "id": id }))?;
        }
        MemoryCommand::Get { id } => print_json(&store.get(id)?)?,
        MemoryCommand::List { all, limit } => print_json(&store.list(all, limit)?)?,
        MemoryCommand::Match(args) => run_match(&store, args)?,
        MemoryCommand::Hit { id } => {
            ReinforcementTracker::new(&store).increment_hit(id)?;
            print_counters(&store, id)?;
        }
        MemoryCommand::Saved { id } => {
            ReinforcementTracker::new(&store).increment_times_saved(id)?;
            print_counters(&store, id)?;
        }
        MemoryCommand::Edit {
            id,
            task,
            root_cause,
            prevention,
        } => {
            let patch = MemoryTextPatch {
                task_description: task,
                root_cause,
                prevention_rule: prevention,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to edit: pass --task, --root-cause or --prevention");
            }
            store.update_text(id, patch)?;
            print_json(&store.get(id)?)?;
        }
        MemoryCommand::Archive { id } => {
            MemoryLifecycleManager::new(&store).archive(id)?;
            print_json(&json!({ "id": id, "archived": true }))?;
        }
        MemoryCommand::Unarchive { id } => {
            MemoryLifecycleManager::new(&store).unarchive(id)?;
            print_json(&json!({ "id": id, "archived": false }))?;
        }
        MemoryCommand::Promote { id } => {
            print_json(&MemoryLifecycleManager::new(&store).promote_for_sharing(id)?)?;
        }
        MemoryCommand::Stale { days, archive } => {
            let Some(threshold) = chrono::TimeDelta::try_days(days) else {
                anyhow::bail!("--days {days} is out of range");
            };
            let lifecycle = MemoryLifecycleManager::new(&store);
            let sweep = if archive {
                lifecycle.archive_stale(threshold)?
            } else {
                lifecycle.mark_stale(threshold)?
            };
            print_json(&sweep)?;
        }
        MemoryCommand::Search {
            query,
            category,
            all,
            limit,
        } => {
            let query = SearchQuery {
                query: query.unwrap_or_default(),
                category,
                include_archived: all,
                limit,
            };
            print_json(&store.search(&query)?)?;
        }
        MemoryCommand::Stats => print_json(&store.stats()?)?,
        MemoryCommand::Report { days } => print_json(&store.report(days)?)?,
        MemoryCommand::Reindex => {
            store.rebuild_index()?;
            print_json(&json!({ "reindexed": true }))?;
        }
        MemoryCommand::Normalize { .. } => {}
    }
    Ok(())
}

fn run_match(store: &MemoryStore, args: MatchArgs) -> anyhow::Result<()> {
    let mut config = MatchConfig::default().with_short_circuit(!args.no_short_circuit);
    if let Some(min) = args.min_results {
        config = config.with_min_results(min);
    }
    let query = MatchQuery {
        tags: args.tags,
        libraries: args.libraries,
        file_paths: args.files,
        category: args.category,
        project_name: args.project,
        limit: args.limit,
        ..MatchQuery::new(args.text)
    };
    let outcome = TieredMatcher::with_config(store, config).find_matches(&query)?;
    if outcome.full_text_skipped {
        tracing::warn!("keyword search was skipped; run `clouvel memory reindex`");
    }
    print_json(&outcome)
}

fn print_counters(store: &MemoryStore, id: i64) -> anyhow::Result<()> {
    let record = store.get(id)?;
    print_json(&json!({
        "id": id,
        "hit_count": record.hit_count,
        "times_saved": record.times_saved,
    }))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl AddArgs {
    fn into_new_memory(self) -> NewMemory {
        NewMemory {
            project_name: self.project,
            error_signature: self.signature,
            error_category: self.category,
            file_paths: self.files,
            libraries: self.libraries,
            tags: self.tags,
            task_description: self.task,
            code_snippet: self.code,
            fix_snippet: self.fix,
            root_cause: self.root_cause,
            prevention_rule: self.prevention,
            negative_constraint: self.negative,
            severity: self.severity,
            source_error_id: self.source_error_id,
        }
    }
}
