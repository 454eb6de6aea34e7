use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use phplens::actions::detector::DetectorAction;
use phplens::actions::events::{ActionOutcome, EngineEvent};
use phplens::actions::file_check::FileCheckAction;
use phplens::actions::scan::ProjectScanAction;
use phplens::actions::scheduler::{ActionScheduler, DEFAULT_WORKERS};
use phplens::actions::store_init::StoreInitAction;
use phplens::actions::EngineContext;
use phplens::project::{self, ProjectSettings, SourceDirConfig};
use phplens::store::{store_write_lock, NativeFinder, SearchTier, TagCache, TagFinder, TagStore};
use phplens::tokenizer::PhpVersion;
use phplens::watcher::SourceWatcher;

#[derive(Parser)]
#[command(name = "phplens", version, about = "PHP source-code intelligence engine")]
struct Cli {
    /// Project root; defaults to the current directory
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the project's source roots into the tag store
    Index {
        /// Source roots to index; defaults to the saved settings, or the
        /// project root when nothing is saved yet
        sources: Vec<PathBuf>,
        /// PHP language level for the tokenizer
        #[arg(long)]
        php_version: Option<PhpVersion>,
    },
    /// Search the indexed tags and file names
    Search {
        query: String,
        /// Restrict results to files under these directories
        #[arg(long)]
        dir: Vec<PathBuf>,
    },
    /// List the files recorded in the tag store
    Files,
    /// Watch the source roots and rescan changed files
    Watch,
    /// Run the external artifact detector over a source root
    Detect {
        /// Detector executable
        program: PathBuf,
        /// Source root to hand to the detector; defaults to the project root
        source: Option<PathBuf>,
    },
    /// Remove one source root and everything indexed from it
    RemoveSource { directory: PathBuf },
    /// Drop all indexed data for the project
    Wipe,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_path = cli
        .project
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let result = match cli.command {
        Command::Index {
            sources,
            php_version,
        } => cmd_index(&project_path, sources, php_version),
        Command::Search { query, dir } => cmd_search(&project_path, &query, &dir),
        Command::Files => cmd_files(&project_path),
        Command::Watch => cmd_watch(&project_path),
        Command::Detect { program, source } => cmd_detect(&project_path, program, source),
        Command::RemoveSource { directory } => cmd_remove_source(&project_path, &directory),
        Command::Wipe => cmd_wipe(&project_path),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn load_or_default_settings(project_path: &std::path::Path) -> ProjectSettings {
    project::load_settings(project_path).unwrap_or_default()
}

/// Drain events until every submitted action reached a terminal state.
fn drain_events(
    rx: &std::sync::mpsc::Receiver<EngineEvent>,
    mut outstanding: usize,
) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::new();
    while outstanding > 0 {
        let event = match rx.recv_timeout(Duration::from_secs(600)) {
            Ok(event) => event,
            Err(_) => {
                warn!("timed out waiting for background work");
                break;
            }
        };
        match event {
            EngineEvent::Started { label, .. } => info!("{}", label),
            EngineEvent::Progress { .. } => {}
            EngineEvent::Completed { outcome, .. } => {
                outstanding -= 1;
                outcomes.push(outcome);
            }
            EngineEvent::Failed { label, message, .. } => {
                outstanding -= 1;
                eprintln!("{} failed: {}", label, message);
            }
            EngineEvent::Cancelled { .. } => outstanding -= 1,
        }
    }
    outcomes
}

fn cmd_index(
    project_path: &std::path::Path,
    sources: Vec<PathBuf>,
    php_version: Option<PhpVersion>,
) -> Result<(), Box<dyn std::error::Error>> {
    project::init_phplens_dir(project_path)?;
    let mut settings = load_or_default_settings(project_path);
    if let Some(version) = php_version {
        settings.php_version = version;
    }
    if !sources.is_empty() {
        settings.sources = sources.into_iter().map(SourceDirConfig::new).collect();
    } else if settings.sources.is_empty() {
        settings.sources = vec![SourceDirConfig::new(project_path)];
    }
    settings.updated_at = chrono::Utc::now();
    project::save_settings(project_path, &settings)?;

    let db_path = project::tags_db_path(project_path);
    let (event_tx, event_rx) = channel();
    let scheduler = ActionScheduler::new(DEFAULT_WORKERS, event_tx);
    let mut ctx = EngineContext::new();
    ctx.php_version = settings.php_version;
    ctx.sources = settings.sources.clone();

    let mut outstanding = 0;
    if scheduler
        .submit(Box::new(StoreInitAction::new(&db_path)), &mut ctx)
        .is_some()
    {
        outstanding += 1;
    }
    for source in &settings.sources {
        match scheduler.submit(
            Box::new(ProjectScanAction::walk(&db_path, source.clone())),
            &mut ctx,
        ) {
            Some(_) => outstanding += 1,
            None => warn!(dir = %source.directory.display(), "source root skipped"),
        }
    }

    for outcome in drain_events(&event_rx, outstanding) {
        if let ActionOutcome::ScanFinished {
            source_dir,
            files_scanned,
            errors,
            ..
        } = outcome
        {
            println!("{}: {} files indexed", source_dir.display(), files_scanned);
            for error in errors {
                eprintln!("  {}", error);
            }
        }
    }
    scheduler.shutdown();
    Ok(())
}

fn build_cache(project_path: &std::path::Path) -> Result<TagCache, Box<dyn std::error::Error>> {
    let db_path = project::tags_db_path(project_path);
    let mut cache = TagCache::new();
    if db_path.exists() {
        cache.register_global_finder(Box::new(TagFinder::open(&db_path)?));
    }
    cache.set_native_finder(Box::new(NativeFinder::new()));
    Ok(cache)
}

fn cmd_search(
    project_path: &std::path::Path,
    query: &str,
    dirs: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = build_cache(project_path)?;
    let hits = cache.search(query, dirs)?;

    match hits.tier {
        Some(SearchTier::ExactTag) | Some(SearchTier::NearMatchTag) | None => {
            for tag in &hits.tags {
                let path = tag.full_path.as_deref().unwrap_or("<native>");
                println!(
                    "{}\t{}\t{}:{}",
                    tag.key, tag.kind, path, tag.line_number
                );
            }
        }
        Some(SearchTier::ExactFile) | Some(SearchTier::NearMatchFile) => {
            for record in &hits.files {
                println!("{}", record.full_path);
            }
        }
    }
    if hits.is_empty() {
        eprintln!("no matches for '{}'", query);
    }
    Ok(())
}

fn cmd_files(project_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = TagStore::open(&project::tags_db_path(project_path))?;
    for record in store.file_records()? {
        let marker = if record.is_parsed { " " } else { "!" };
        println!("{} {}", marker, record.full_path);
    }
    Ok(())
}

fn cmd_watch(project_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_or_default_settings(project_path);
    if settings.sources.is_empty() {
        return Err("no source roots configured; run 'phplens index' first".into());
    }
    let db_path = project::tags_db_path(project_path);
    let roots: Vec<PathBuf> = settings
        .sources
        .iter()
        .map(|s| s.directory.clone())
        .collect();

    let (event_tx, event_rx) = channel();
    let scheduler = Arc::new(ActionScheduler::new(DEFAULT_WORKERS, event_tx));
    let ctx = Arc::new(Mutex::new({
        let mut ctx = EngineContext::new();
        ctx.php_version = settings.php_version;
        ctx.sources = settings.sources.clone();
        ctx
    }));

    let sources = settings.sources.clone();
    let sched = scheduler.clone();
    let sched_ctx = ctx.clone();
    let scan_db = db_path.clone();
    let _watcher = SourceWatcher::new(&roots, move |batch: HashSet<PathBuf>| {
        info!(changed = batch.len(), "change batch");
        // Known mtime 0 forces every surviving path through the rescan.
        let entries = batch.iter().map(|p| (p.clone(), 0)).collect();
        let mut ctx = sched_ctx.lock().unwrap();
        let _ = sched.submit(Box::new(FileCheckAction::new(entries)), &mut ctx);
        for source in &sources {
            let files: Vec<PathBuf> = batch
                .iter()
                .filter(|p| p.starts_with(&source.directory) && source.matches(p))
                .cloned()
                .collect();
            if !files.is_empty() {
                let _ = sched.submit(
                    Box::new(ProjectScanAction::file_list(
                        &scan_db,
                        source.clone(),
                        files,
                    )),
                    &mut ctx,
                );
            }
        }
    })?;

    println!("watching {} source root(s); ctrl-c to stop", roots.len());
    loop {
        match event_rx.recv() {
            Ok(EngineEvent::Completed {
                outcome: ActionOutcome::FileCheck { deleted, .. },
                ..
            }) if !deleted.is_empty() => {
                let lock = store_write_lock(&db_path);
                let _guard = lock.lock().unwrap();
                let mut store = TagStore::open(&db_path)?;
                store.delete_file_items(&deleted)?;
                info!(removed = deleted.len(), "dropped deleted files from index");
            }
            Ok(EngineEvent::Completed {
                outcome:
                    ActionOutcome::ScanFinished {
                        files_scanned,
                        errors,
                        ..
                    },
                ..
            }) => {
                info!(files_scanned, errors = errors.len(), "rescan finished");
            }
            Ok(EngineEvent::Failed { label, message, .. }) => {
                eprintln!("{} failed: {}", label, message);
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}

fn cmd_detect(
    project_path: &std::path::Path,
    program: PathBuf,
    source: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    project::init_phplens_dir(project_path)?;
    let source = source.unwrap_or_else(|| project_path.to_path_buf());
    let output_db = project::detector_db_path(project_path);

    let (event_tx, event_rx) = channel();
    // One worker, so the store is guaranteed to be created and
    // version-guarded before the helper writes into it.
    let scheduler = ActionScheduler::new(1, event_tx);
    let mut ctx = EngineContext::new();
    let mut outstanding = 0;
    if scheduler
        .submit(Box::new(StoreInitAction::new(&output_db)), &mut ctx)
        .is_some()
    {
        outstanding += 1;
    }
    if scheduler
        .submit(
            Box::new(DetectorAction::new(program, source, output_db)),
            &mut ctx,
        )
        .is_some()
    {
        outstanding += 1;
    }

    let outcomes = drain_events(&event_rx, outstanding);
    scheduler.shutdown();
    for outcome in outcomes {
        if let ActionOutcome::DetectorFinished { exit_code, errors } = outcome {
            for error in &errors {
                eprintln!("{}", error);
            }
            if exit_code != 0 {
                return Err(format!("detector exited with code {}", exit_code).into());
            }
            println!("detector finished");
        }
    }
    Ok(())
}

fn cmd_remove_source(
    project_path: &std::path::Path,
    directory: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = load_or_default_settings(project_path);
    settings.sources.retain(|s| s.directory != directory);
    settings.updated_at = chrono::Utc::now();
    project::save_settings(project_path, &settings)?;

    let db_path = project::tags_db_path(project_path);
    if db_path.exists() {
        let lock = store_write_lock(&db_path);
        let _guard = lock.lock().unwrap();
        let mut store = TagStore::open(&db_path)?;
        store.delete_source(directory)?;
    }
    println!("removed {}", directory.display());
    Ok(())
}

fn cmd_wipe(project_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = project::tags_db_path(project_path);
    if db_path.exists() {
        let lock = store_write_lock(&db_path);
        let _guard = lock.lock().unwrap();
        let mut store = TagStore::open(&db_path)?;
        store.wipe()?;
        println!("tag store wiped");
    } else {
        println!("nothing to wipe");
    }
    Ok(())
}
