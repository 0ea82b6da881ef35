//! Hack-n-Patch game CLI.
//!
//! One action flag per invocation. Rejected commands print `[ERROR] ...` and
//! exit 0; infrastructure failures print `[FATAL] ...` and exit 1.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, CommandFactory, Parser};

use hnp::core::error::RoundError;
use hnp::exit_codes;
use hnp::hack::{HackStarted, start_hack, submit_flag, test_service};
use hnp::io::clock::SystemClock;
use hnp::io::docker::DockerCli;
use hnp::io::git::Git;
use hnp::io::prompt::TerminalPrompter;
use hnp::logging;
use hnp::model::format_timestamp;
use hnp::patch::{PatchEnded, end_patch, start_patch};
use hnp::service::{StopOutcome, stop_service};
use hnp::setup::{SetupOutcome, setup_player};
use hnp::workspace::Workspace;

#[derive(Parser)]
#[command(
    name = "hnp",
    version,
    about = "Hack and Patch: a two-player attack/defend game",
    group(
        ArgGroup::new("action")
            .args(["setup", "start", "test", "submit", "patch", "end", "stop"])
            .multiple(false)
    )
)]
struct Cli {
    /// Create the player config and ledger entry only.
    #[arg(long)]
    setup: bool,
    /// Set up if needed, build and start the service, start the hack timer.
    #[arg(long)]
    start: bool,
    /// Build and start the service without touching the timer.
    #[arg(long)]
    test: bool,
    /// Submit a captured flag, crediting the hack time to the opponent.
    #[arg(long, value_name = "FLAG")]
    submit: Option<String>,
    /// Create a patch branch and start the patch timer.
    #[arg(long)]
    patch: bool,
    /// End the patch: merge and push (or reset if over budget), planting FLAG.
    #[arg(long, value_name = "FLAG")]
    end: Option<String>,
    /// Stop the running service.
    #[arg(long)]
    stop: bool,

    /// Username for --setup/--start instead of prompting.
    #[arg(long, value_name = "NAME")]
    username: Option<String>,
    /// Player to credit with --submit instead of the first other player.
    #[arg(long, value_name = "NAME", requires = "submit")]
    opponent: Option<String>,
    /// Settings file.
    #[arg(long, value_name = "PATH", default_value = "hnp.toml")]
    config: PathBuf,
}

enum Action {
    Setup,
    Start,
    Test,
    Submit(String),
    Patch,
    End(String),
    Stop,
}

impl Cli {
    fn action(&self) -> Option<Action> {
        if self.setup {
            Some(Action::Setup)
        } else if self.start {
            Some(Action::Start)
        } else if self.test {
            Some(Action::Test)
        } else if let Some(flag) = &self.submit {
            Some(Action::Submit(flag.clone()))
        } else if self.patch {
            Some(Action::Patch)
        } else if let Some(flag) = &self.end {
            Some(Action::End(flag.clone()))
        } else if self.stop {
            Some(Action::Stop)
        } else {
            None
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let Some(action) = cli.action() else {
        if let Err(err) = Cli::command().print_help() {
            eprintln!("[FATAL] {err}");
            std::process::exit(exit_codes::FATAL);
        }
        std::process::exit(exit_codes::OK);
    };
    let code = match run(&cli, action) {
        Ok(()) => exit_codes::OK,
        Err(err) => report_error(&err),
    };
    std::process::exit(code);
}

fn run(cli: &Cli, action: Action) -> Result<()> {
    let root = std::env::current_dir().context("resolve working directory")?;
    let workspace = Workspace::open(&root, &cli.config)?;
    let runtime = DockerCli::new(&root, workspace.settings.service.clone());
    let git = Git::new(&root);
    let prompter = TerminalPrompter;
    let clock = SystemClock;
    let username = cli.username.as_deref();

    match action {
        Action::Setup => {
            let outcome = setup_player(&workspace, &prompter, username, &clock)?;
            print_setup(&workspace, &outcome);
        }
        Action::Start => {
            let started = start_hack(&workspace, &runtime, &prompter, username, &clock)?;
            print_hack_started(&workspace, &started);
        }
        Action::Test => {
            let container_id = test_service(&workspace, &runtime)?;
            println!("[RUN] Service started with container ID: {container_id}");
        }
        Action::Submit(flag) => {
            let submission = submit_flag(&workspace, &flag, cli.opponent.as_deref(), &clock)?;
            println!("[INFO] Hack duration: {} seconds", submission.hack_secs);
            println!(
                "[SUCCESS] Flag accepted. {}'s dev time increased by {}s.",
                submission.opponent, submission.hack_secs
            );
            println!("[NEXT] {} may now run: hnp --patch", submission.opponent);
        }
        Action::Patch => {
            let started = start_patch(&workspace, &git, &clock)?;
            println!(
                "[PATCH] Branch {} created and dev timer started.",
                started.branch
            );
        }
        Action::End(flag) => {
            let ended = end_patch(&workspace, &git, &prompter, &flag, &clock)?;
            print_patch_ended(&workspace, &ended);
        }
        Action::Stop => match stop_service(&workspace, &runtime)? {
            StopOutcome::Stopped { container_id } => {
                println!("[STOP] Service with container ID {container_id} stopped.");
            }
            StopOutcome::NotRunning => println!("[INFO] No running service found."),
        },
    }
    Ok(())
}

fn report_error(err: &anyhow::Error) -> i32 {
    if let Some(rejected) = err.downcast_ref::<RoundError>() {
        println!("[ERROR] {rejected}");
        return exit_codes::OK;
    }
    eprintln!("[FATAL] {err:#}");
    exit_codes::FATAL
}

fn print_setup(workspace: &Workspace, outcome: &SetupOutcome) {
    let config_path = workspace.paths.player_config_path.display();
    match outcome {
        SetupOutcome::AlreadyConfigured { .. } => {
            println!("[INFO] {config_path} already exists.");
        }
        SetupOutcome::Created { username, joined } => {
            println!("[INIT] Welcome, {username}! {config_path} created.");
            if *joined {
                println!("[INIT] Global player state initialized.");
            }
        }
    }
}

fn print_hack_started(workspace: &Workspace, started: &HackStarted) {
    print_setup(workspace, &started.setup);
    println!(
        "[RUN] Service started with container ID: {}",
        started.container_id
    );
    println!(
        "[START] Hack time started at {}",
        format_timestamp(&started.started_at)
    );
}

fn print_patch_ended(workspace: &Workspace, ended: &PatchEnded) {
    let review = match ended {
        PatchEnded::Pushed { review, .. } | PatchEnded::Discarded { review, .. } => review,
    };
    println!("[END] Allowed dev time: {}s", review.allowed_secs);
    println!("[END] Actual dev time: {}s", review.patch_secs);
    match ended {
        PatchEnded::Pushed { new_flag, .. } => println!(
            "[PUSHED] Changes merged to {} with new flag: {new_flag}",
            workspace.settings.git.main_branch
        ),
        PatchEnded::Discarded { reset_to, .. } => {
            println!("[RESET] Branch reset to {reset_to}; patch discarded.");
        }
    }
}
