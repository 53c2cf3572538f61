mod logging;

use anyhow::{anyhow, Context};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use gravity_renamer_core::{
    app_paths, collect_files, commit, load_config, load_journal, undo, AppConfig, CommitError,
    Conflict, JournalStore, OperationStatus, Pipeline, PlanError, PreviewGenerator, PreviewItem,
    RealFileSystem, RuleDefinition,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gravity-renamer-cli")]
#[command(about = "Preview, commit and undo batch renames as journaled transactions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Preview(PreviewArgs),
    Commit(CommitArgs),
    Undo(UndoArgs),
    History(HistoryArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct SelectionArgs {
    #[arg(long)]
    rules: PathBuf,
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long, default_value_t = false)]
    recursive: bool,
    #[arg(long, default_value_t = false)]
    include_hidden: bool,
    #[arg(long, default_value_t = false)]
    include_extension: bool,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct CommitArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[arg(long)]
    journal_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("which").required(true).args(["journal", "latest"])))]
struct UndoArgs {
    #[arg(long)]
    journal: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    latest: bool,
    #[arg(long)]
    journal_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long)]
    journal_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug)]
enum CliError {
    Validation(String),
    Io(anyhow::Error),
    Journal(anyhow::Error),
    Residual(String),
    Failure(anyhow::Error),
}

type CliResult<T> = Result<T, CliError>;

impl CliError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Io(_) => 3,
            Self::Journal(_) => 4,
            Self::Residual(_) => 5,
            Self::Failure(_) => 1,
        }
    }

    fn display_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::Residual(message) => message.clone(),
            Self::Io(error) | Self::Journal(error) | Self::Failure(error) => format!("{error:#}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = load_config();
    logging::init_logger(
        config
            .as_ref()
            .map(|c| c.log_filter.as_str())
            .unwrap_or("warn"),
    );

    let result = config
        .map_err(CliError::failure)
        .and_then(|config| run(cli, &config));
    if let Err(err) = result {
        eprintln!("error: {}", err.display_message());
        process::exit(err.exit_code());
    }
}

fn run(cli: Cli, config: &AppConfig) -> CliResult<()> {
    match cli.command {
        Commands::Preview(args) => cmd_preview(args, config),
        Commands::Commit(args) => cmd_commit(args, config),
        Commands::Undo(args) => cmd_undo(args, config),
        Commands::History(args) => cmd_history(args, config),
        Commands::Config(args) => match args.action {
            ConfigAction::Show => cmd_config_show(config),
        },
    }
}

fn cmd_preview(args: PreviewArgs, config: &AppConfig) -> CliResult<()> {
    let items = compute_preview(&args.selection, config)?;
    match args.output {
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Table => print_table(&items),
    }
    Ok(())
}

fn cmd_commit(args: CommitArgs, config: &AppConfig) -> CliResult<()> {
    let items = compute_preview(&args.selection, config)?;
    let store = journal_store(config, args.journal_dir)?;

    match commit(&items, &RealFileSystem, &store) {
        Ok(outcome) => {
            info!(transaction = %outcome.transaction, applied = outcome.applied, "commit finished");
            print_json(&outcome)
        }
        Err(err) => Err(commit_failure(err)),
    }
}

fn commit_failure(err: CommitError) -> CliError {
    if let CommitError::Plan(plan_err) = &err {
        for line in blocked_report(plan_err) {
            eprintln!("{line}");
        }
        return CliError::validation(format!("commit refused: {plan_err}"));
    }

    if let Some(rollback) = err.rollback() {
        if let Err(print_err) = print_json(rollback) {
            warn!(error = %print_err.display_message(), "could not print rollback report");
        }
        if !rollback.is_complete() {
            return CliError::Residual(format!(
                "{err}; rollback left {} operation(s) unreverted",
                rollback.residual.len()
            ));
        }
    }
    let journal = err
        .journal_path()
        .map(|path| format!(" (journal: {})", path.display()))
        .unwrap_or_default();
    match err {
        CommitError::Io { .. } => {
            CliError::Io(anyhow!(err).context(format!("transaction rolled back{journal}")))
        }
        CommitError::Journal { .. } => CliError::Journal(anyhow!(err)),
        _ => CliError::failure(err),
    }
}

fn blocked_report(err: &PlanError) -> Vec<String> {
    match err {
        PlanError::BlockingConflicts { blocked, .. } => blocked
            .iter()
            .flat_map(|item| {
                item.conflicts.iter().map(move |conflict| {
                    format!(
                        "conflict: {} -> {}: {}",
                        item.path.display(),
                        item.target.display(),
                        describe_conflict(conflict)
                    )
                })
            })
            .collect(),
        PlanError::UnresolvableCycle { paths } => paths
            .iter()
            .map(|path| format!("cycle member: {}", path.display()))
            .collect(),
    }
}

fn cmd_undo(args: UndoArgs, config: &AppConfig) -> CliResult<()> {
    let store = journal_store(config, args.journal_dir)?;
    let path = match args.journal {
        Some(path) if !args.latest => path,
        _ => store
            .latest()
            .map_err(|err| CliError::Journal(err.into()))?
            .ok_or_else(|| {
                CliError::failure(anyhow!(
                    "no transactions recorded in {}",
                    store.dir().display()
                ))
            })?,
    };

    let report = undo(&path, &RealFileSystem).map_err(|err| CliError::Journal(err.into()))?;
    print_json(&report)?;
    for message in &report.journal_errors {
        warn!(journal = %path.display(), error = %message, "journal update failed during undo");
    }
    if !report.is_complete() {
        return Err(CliError::Residual(format!(
            "{} operation(s) could not be reverted",
            report.residual.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    journal: PathBuf,
    transaction: Option<String>,
    created_at: Option<String>,
    operations: usize,
    done: usize,
    reverted: usize,
    error: Option<String>,
}

fn cmd_history(args: HistoryArgs, config: &AppConfig) -> CliResult<()> {
    let store = journal_store(config, args.journal_dir)?;
    let paths = store.list().map_err(|err| CliError::Journal(err.into()))?;
    let entries: Vec<HistoryEntry> = paths.into_iter().map(history_entry).collect();

    match args.output {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Table => {
            for entry in &entries {
                match &entry.error {
                    Some(error) => println!("{}  unreadable: {error}", entry.journal.display()),
                    None => println!(
                        "{}  {}  ops={} done={} reverted={}",
                        entry.created_at.as_deref().unwrap_or("-"),
                        entry.transaction.as_deref().unwrap_or("-"),
                        entry.operations,
                        entry.done,
                        entry.reverted
                    ),
                }
            }
            eprintln!("{} transaction(s) in {}", entries.len(), store.dir().display());
        }
    }
    Ok(())
}

fn history_entry(path: PathBuf) -> HistoryEntry {
    match load_journal(&path) {
        Ok(journal) => HistoryEntry {
            transaction: Some(journal.id.to_string()),
            created_at: Some(journal.created_at.to_rfc3339()),
            operations: journal.operations.len(),
            done: journal.count(OperationStatus::Done),
            reverted: journal.count(OperationStatus::Reverted),
            error: None,
            journal: path,
        },
        Err(err) => HistoryEntry {
            transaction: None,
            created_at: None,
            operations: 0,
            done: 0,
            reverted: 0,
            error: Some(err.to_string()),
            journal: path,
        },
    }
}

fn cmd_config_show(config: &AppConfig) -> CliResult<()> {
    let paths = app_paths().map_err(CliError::failure)?;
    println!("config file: {}", paths.config_path.display());
    println!("journal dir: {}", config.journal_dir(&paths).display());
    let body = toml::to_string_pretty(config)
        .context("failed to render config")
        .map_err(CliError::failure)?;
    println!("{body}");
    Ok(())
}

fn compute_preview(selection: &SelectionArgs, config: &AppConfig) -> CliResult<Vec<PreviewItem>> {
    let pipeline = load_pipeline(
        &selection.rules,
        selection.include_extension || config.include_extension,
    )?;
    let files = collect_files(
        &selection.inputs,
        selection.recursive || config.recursive_default,
        selection.include_hidden || config.include_hidden_default,
    )
    .map_err(CliError::failure)?;

    let generator = match config.threads {
        Some(threads) => {
            PreviewGenerator::with_threads(&RealFileSystem, threads).map_err(CliError::failure)?
        }
        None => PreviewGenerator::new(&RealFileSystem),
    };
    generator
        .preview(&files, &pipeline)
        .map_err(CliError::failure)
}

fn load_pipeline(path: &Path, include_extension: bool) -> CliResult<Pipeline> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file: {}", path.display()))
        .map_err(CliError::failure)?;
    let definitions: Vec<RuleDefinition> = serde_json::from_str(&raw).map_err(|err| {
        CliError::validation(format!("invalid rules file {}: {err}", path.display()))
    })?;
    Pipeline::from_definitions(definitions)
        .map(|pipeline| pipeline.with_extension(include_extension))
        .map_err(|err| CliError::validation(err.to_string()))
}

fn journal_store(config: &AppConfig, override_dir: Option<PathBuf>) -> CliResult<JournalStore> {
    let dir = match override_dir {
        Some(dir) => dir,
        None => config.journal_dir(&app_paths().map_err(CliError::failure)?),
    };
    Ok(JournalStore::new(dir))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let body = serde_json::to_string_pretty(value)
        .context("failed to serialize output")
        .map_err(CliError::failure)?;
    println!("{body}");
    Ok(())
}

fn print_table(items: &[PreviewItem]) {
    println!("original -> new");
    for item in items {
        println!(
            "{} -> {}",
            item.original_path.display(),
            item.new_path.display()
        );
        for conflict in &item.conflicts {
            println!("    ! {}", describe_conflict(conflict));
        }
        for warning in &item.warnings {
            println!("    ~ {warning}");
        }
    }

    println!(
        "\nsummary: files={} changed={} blocked={} warnings={}",
        items.len(),
        items.iter().filter(|i| i.is_changed()).count(),
        items.iter().filter(|i| i.is_blocked()).count(),
        items.iter().map(|i| i.warnings.len()).sum::<usize>()
    );
}

fn describe_conflict(conflict: &Conflict) -> String {
    match conflict {
        Conflict::TargetExists { path } => format!("target exists: {}", path.display()),
        Conflict::Collision { path, with } => format!(
            "collision on {} with {}",
            path.display(),
            with.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Conflict::CaseCollision { path, with } => format!(
            "case collision: {} vs {}",
            path.display(),
            with.display()
        ),
        Conflict::ReservedName { name } => format!("reserved name: {name}"),
        Conflict::InvalidName { name } => format!("invalid name: {name:?}"),
        Conflict::SourceNotFound { path } => format!("source not found: {}", path.display()),
    }
}
