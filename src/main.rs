//! gitgroup - CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitgroup::config::{CompletionSettings, Config, TypePolicy, co_author_trailer};
use gitgroup::git::preflight::{check_git_installed, open_repository};
use gitgroup::llm::AnthropicClient;
use gitgroup::workflow::operator::TerminalOperator;
use gitgroup::workflow::restore::{RestoreHook, spawn_interrupt_handler};
use gitgroup::workflow::{GroupedCommit, WorkflowReport};

/// Split uncommitted changes into atomic conventional commits.
#[derive(Parser, Debug)]
#[command(name = "gitgroup")]
#[command(about = "Split uncommitted changes into atomic conventional commits using an AI completion service")]
#[command(version)]
struct Cli {
    /// Repository path
    #[arg(short = 'C', default_value = ".")]
    path: PathBuf,

    /// Run the whole flow without creating commits
    #[arg(long)]
    dry_run: bool,

    /// Show progress details
    #[arg(short, long)]
    verbose: bool,

    /// Show debug output, including git invocations
    #[arg(long)]
    debug: bool,

    /// Use template messages instead of asking the AI for each commit message
    #[arg(long)]
    no_ai_messages: bool,

    /// Prefix summaries with a type emoji
    #[arg(long)]
    emoji: bool,

    /// Add a Co-authored-by trailer ("Name <email>"); repeatable
    #[arg(long = "co-author", value_name = "TRAILER")]
    co_authors: Vec<String>,

    /// Fail when the AI proposes an unknown commit type instead of using chore
    #[arg(long)]
    strict_types: bool,

    /// Model identifier (overrides GITGROUP_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Token budget per completion request
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Do not ask to confirm the number of groups
    #[arg(short, long)]
    yes: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut trailers: Vec<String> = Vec::new();
        for value in &self.co_authors {
            let trailer = co_author_trailer(value);
            if !trailers.iter().any(|t| t.eq_ignore_ascii_case(&trailer)) {
                trailers.push(trailer);
            }
        }

        Config {
            repo_path: self.path,
            dry_run: self.dry_run,
            ai_messages: !self.no_ai_messages,
            emoji: self.emoji,
            trailers,
            type_policy: if self.strict_types {
                TypePolicy::Reject
            } else {
                TypePolicy::FallbackToChore
            },
            auto_confirm: self.yes,
            completion: CompletionSettings::from_env(self.model, self.max_tokens),
        }
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let default_level = if debug {
        "gitgroup=debug"
    } else if verbose {
        "gitgroup=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    match run(cli).await {
        Ok(report) => {
            report.print_summary();
            if report.aborted() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<WorkflowReport> {
    // Step 1: Check prerequisites
    check_git_installed().context("git is required")?;
    let config = cli.into_config();

    // Step 2: Open git repository
    let repo = open_repository(&config.repo_path)
        .context("Run gitgroup from within a git working tree")?;

    // Step 3: Grouping needs the completion service
    let client = AnthropicClient::new(&config.completion)
        .context("Grouped mode requires the completion service")?;
    tracing::info!(model = client.model(), "Completion service configured");

    if config.dry_run {
        println!("Dry run: no commits will be created.");
    }

    // Step 4: Run the workflow with restore on Ctrl-C
    let hook = RestoreHook::new();
    let interrupt = spawn_interrupt_handler(hook.clone());

    let mut operator = TerminalOperator;
    let result = GroupedCommit::new(&config, &repo, &client, &mut operator, hook)
        .run()
        .await;
    interrupt.abort();

    Ok(result?)
}
