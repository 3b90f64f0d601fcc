//! CLI for stage-sync.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use stage_sync::prelude::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser)]
#[command(name = "stage-sync")]
#[command(author, version, about = "Stage, commit, push and pull a git working copy", long_about = None)]
struct Cli {
    /// Path inside the repository
    #[arg(short = 'C', long, default_value = ".", global = true)]
    repo: PathBuf,

    /// Config file (defaults to the per-user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show staged and unstaged files
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stage files (all unstaged files when none are given)
    Stage { paths: Vec<String> },

    /// Unstage files (all staged files when none are given)
    Unstage { paths: Vec<String> },

    /// Throw away changes to files
    Discard {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Commit the staged files
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Resolve conflicted files
    Resolve {
        /// Keep the local side
        #[arg(long, conflicts_with = "theirs", required_unless_present = "theirs")]
        mine: bool,

        /// Take the incoming side (the merged branch, or the replayed commit)
        #[arg(long)]
        theirs: bool,

        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Abort the merge in progress
    AbortMerge,

    /// Abort the rebase in progress
    AbortRebase,

    /// Continue the rebase in progress
    ContinueRebase,

    /// Push the current branch
    Push,

    /// Pull into the current branch
    Pull,

    /// Manage local branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
}

#[derive(Subcommand)]
enum BranchAction {
    /// List local branches
    List,
    /// Create a branch at HEAD
    Create { name: String },
    /// Delete a branch
    Delete { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SyncConfig::load_default().context("Failed to load config")?,
    };
    init_logging(cli.verbose, config.log_level.as_deref());

    let terminal = Arc::new(TerminalInteraction::default());
    let session = Session::open(&cli.repo, &config, terminal.clone())
        .with_context(|| format!("Failed to open repository at {}", cli.repo.display()))?;

    match cli.command {
        Commands::Status { json } => return cmd_status(&session, json),
        Commands::Stage { paths } => {
            let files = select(session.unstaged(), &paths)?;
            session.commands().do_command(&files, FileCommand::Stage)?;
        }
        Commands::Unstage { paths } => {
            let files = select(session.staged(), &paths)?;
            session.commands().do_command(&files, FileCommand::Unstage)?;
        }
        Commands::Discard { paths } => {
            let mut files = select(session.staged(), &paths).unwrap_or_default();
            files.extend(select(session.unstaged(), &paths).unwrap_or_default());
            if files.is_empty() {
                bail!("No changed files match {}", paths.join(", "));
            }
            session.commands().do_command(&files, FileCommand::Discard)?;
        }
        Commands::Commit { message } => session.commands().commit(&message)?,
        Commands::Resolve { mine, paths, .. } => {
            let files: Vec<FileStatus> = select(session.unstaged(), &paths)?
                .into_iter()
                .filter(|f| f.change_type == ChangeType::Conflict)
                .collect();
            if files.is_empty() {
                bail!("No conflicted files match {}", paths.join(", "));
            }
            if mine {
                session.commands().resolve_using_mine(&files)?;
            } else {
                session.commands().resolve_using_theirs(&files)?;
            }
        }
        Commands::AbortMerge => session.commands().abort_merge()?,
        Commands::AbortRebase => session.commands().abort_rebase()?,
        Commands::ContinueRebase => session.commands().continue_rebase()?,
        Commands::Push => cmd_sync(&session, SyncCommand::Push)?,
        Commands::Pull => cmd_sync(&session, SyncCommand::Pull)?,
        Commands::Branch { action } => return cmd_branch(session.repository(), action),
    }

    session.flush()?;
    if terminal.failed.load(Ordering::SeqCst) {
        bail!("Command failed");
    }
    Ok(())
}

fn init_logging(verbose: u8, configured: Option<&str>) {
    let level = match verbose {
        0 => configured
            .and_then(|l| tracing::Level::from_str(l).ok())
            .unwrap_or(tracing::Level::WARN),
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

/// Rows of `model` named by `paths`: exact matches first, otherwise every
/// row under the given folder. No paths selects every row.
fn select(model: &FileStatusModel, paths: &[String]) -> Result<Vec<FileStatus>> {
    if paths.is_empty() {
        return Ok(model.entries());
    }

    let mut files = Vec::new();
    for path in paths {
        let rows = match model.row_of(path) {
            Some(row) => vec![row],
            None => model.rows_containing(&format!("{}/", path.trim_end_matches('/'))),
        };
        if rows.is_empty() {
            bail!("'{}' has no {} changes", path, model.view());
        }
        files.extend(rows.into_iter().filter_map(|row| model.get(row)));
    }
    Ok(files)
}

fn cmd_status(session: &Session, json: bool) -> Result<()> {
    let staged = session.staged().entries();
    let unstaged = session.unstaged().entries();

    if json {
        let report = serde_json::json!({
            "staged": staged,
            "unstaged": unstaged,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(branch) = session.repository().current_branch()? {
        println!("On branch {}", branch);
    }
    for (title, files) in [("Staged", &staged), ("Unstaged", &unstaged)] {
        println!("{} ({}):", title, files.len());
        for file in files.iter() {
            println!("  {} {}", file.change_type, file.path);
        }
    }
    Ok(())
}

fn cmd_sync(session: &Session, command: SyncCommand) -> Result<()> {
    session.progress().subscribe(|event: &PushPullEvent| {
        if !event.message.is_empty() {
            match event.status {
                ActionStatus::Started => eprintln!("{}...", event.message),
                ActionStatus::Finished => println!("{}", event.message),
            }
        }
    });
    session.sync().execute(command)?;
    Ok(())
}

fn cmd_branch(repo: &GitRepo, action: BranchAction) -> Result<()> {
    match action {
        BranchAction::List => {
            let current = repo.current_branch()?;
            for name in repo.list_branches()? {
                let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        BranchAction::Create { name } => {
            repo.create_branch(&name)
                .with_context(|| format!("Failed to create branch {}", name))?;
            println!("Created branch {}", name);
        }
        BranchAction::Delete { name } => {
            repo.delete_branch(&name)
                .with_context(|| format!("Failed to delete branch {}", name))?;
            println!("Deleted branch {}", name);
        }
    }
    Ok(())
}

/// Prompts on stdin / stderr.
#[derive(Default)]
struct TerminalInteraction {
    failed: AtomicBool,
}

impl TerminalInteraction {
    fn ask(&self, prompt: &str) -> Option<String> {
        eprint!("{}", prompt);
        io::stderr().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Interaction for TerminalInteraction {
    fn confirm(&self, title: &str, message: &str, options: &[&str]) -> usize {
        eprintln!("{}", title);
        eprintln!("{}", message);
        for (i, option) in options.iter().enumerate() {
            eprintln!("  {}) {}", i + 1, option);
        }
        // anything unreadable picks the last option
        let last = options.len().saturating_sub(1);
        self.ask("> ")
            .and_then(|answer| answer.trim().parse::<usize>().ok())
            .filter(|n| (1..=options.len()).contains(n))
            .map_or(last, |n| n - 1)
    }

    fn prompt_credentials(&self, host: &str, message: &str) -> Option<UserCredentials> {
        eprintln!("{}", message);
        let username = self.ask(&format!("Username for {}: ", host))?;
        if username.is_empty() {
            return None;
        }
        let secret = self.ask(&format!("Password or token for {}@{}: ", username, host))?;
        Some(UserCredentials::new(username, secret))
    }

    fn show_warning(&self, message: &str) {
        eprintln!("warning: {}", message);
        self.failed.store(true, Ordering::SeqCst);
    }

    fn show_error(&self, message: &str) {
        eprintln!("error: {}", message);
        self.failed.store(true, Ordering::SeqCst);
    }

    fn show_pull_conflicts(&self, files: &[String]) {
        eprintln!("Pull stopped with conflicts in:");
        for file in files {
            eprintln!("  {}", file);
        }
        eprintln!("Resolve them with `stage-sync resolve --mine|--theirs <path>`.");
    }

    fn configure_remote(&self) -> Option<String> {
        eprintln!("No remote repository is configured.");
        self.ask("Remote URL (empty to cancel): ")
            .filter(|url| !url.trim().is_empty())
    }
}
