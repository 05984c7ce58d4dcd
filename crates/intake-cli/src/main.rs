mod commands;
mod telemetry;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use intake_store::{
    BackupConfig, BackupStore, ComplexityMode, Document, DocumentId, EngineConfig, FileBackup,
    HttpRemote, PersistedState, RemoteConfig, SectionKey, Session,
};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::commands::EditCommand;

#[derive(Parser)]
#[command(version, about = "Intake - questionnaire persistence driver", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Local session state file
    #[arg(long, env = "INTAKE_STATE_FILE", default_value = "./data/session.json")]
    state: PathBuf,

    /// Directory for daily-rolling JSON logs
    #[arg(long, env = "INTAKE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Server(ServerCommand),
    #[command(flatten)]
    Local(LocalCommand),
}

/// Commands that talk to the questionnaire server.
#[derive(Subcommand)]
enum ServerCommand {
    /// Save the questionnaire to the server now
    Save,
    /// Replace the local questionnaire with one stored on the server
    Load {
        /// Server id of the questionnaire
        id: i64,
    },
    /// Apply one edit and let the debounce gate save it
    Edit {
        /// Section key, e.g. business_info
        section: SectionKey,
        /// JSON value to merge into the section
        value: String,
        /// Replace the section instead of merging
        #[arg(long)]
        replace: bool,
    },
    /// Apply edit commands read from stdin, one JSON object per line
    Replay,
    /// Generate a landing page from the saved questionnaire
    Generate {
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "simple")]
        mode: ComplexityMode,
    },
}

/// Commands that only touch the state file and the local backup.
#[derive(Subcommand)]
enum LocalCommand {
    /// Show the last local backup
    Recover {
        /// Replace the questionnaire content with the backup
        #[arg(long)]
        apply: bool,
    },
    /// Print the local session state
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = telemetry::init(cli.log_dir.as_deref());

    let config = EngineConfig::from_env();
    let backup = FileBackup::new(BackupConfig::from_env().dir);
    let mut document = match PersistedState::read_from(&cli.state)? {
        Some(state) => Document::from_persisted(state),
        None => Document::new(),
    };

    let command = match cli.command {
        Commands::Local(command) => {
            if run_local(&mut document, &backup, &config.backup_key, command)? {
                write_state(&document.to_persisted(), &cli.state)?;
            }
            return Ok(());
        }
        Commands::Server(command) => command,
    };

    let remote = HttpRemote::new(&RemoteConfig::from_env()?)?;
    let session = Session::with_document(document, Arc::new(remote), Arc::new(backup), config);

    let outcome = run(&session, command).await;

    session.shutdown().await;
    write_state(&session.persisted().await, &cli.state)?;

    outcome
}

fn write_state(state: &PersistedState, path: &Path) -> Result<()> {
    state.write_to(path)?;
    info!(state = %path.display(), "session state written");
    Ok(())
}

/// Run a command that needs no server. Returns whether the document changed.
fn run_local(
    document: &mut Document,
    backup: &dyn BackupStore,
    backup_key: &str,
    command: LocalCommand,
) -> Result<bool> {
    match command {
        LocalCommand::Show => {
            print_json(&document.to_persisted())?;
            Ok(false)
        }
        LocalCommand::Recover { apply } => {
            let Some(envelope) = backup.get(backup_key)? else {
                println!("no local backup");
                return Ok(false);
            };
            print_json(&envelope)?;
            if apply {
                document.apply_backup(envelope);
                info!("backup applied, it will be saved on the next save");
            }
            Ok(apply)
        }
    }
}

async fn run(session: &Session, command: ServerCommand) -> Result<()> {
    match command {
        ServerCommand::Save => print_json(&session.save_now().await),
        ServerCommand::Load { id } => {
            session.load(DocumentId(id)).await?;
            print_json(&session.persisted().await)
        }
        ServerCommand::Edit {
            section,
            value,
            replace,
        } => {
            let value = serde_json::from_str(&value).into_diagnostic()?;
            let command = if replace {
                EditCommand::Set { section, value }
            } else {
                EditCommand::Merge { section, value }
            };
            session.edit(|doc| command.apply(doc)).await;
            Ok(())
        }
        ServerCommand::Replay => replay(session).await,
        ServerCommand::Generate { template, mode } => {
            let artifact = session.generate(&template, mode).await?;
            println!("{artifact}");
            Ok(())
        }
    }
}

async fn replay(session: &Session) -> Result<()> {
    let stdin = std::io::stdin();
    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line.into_diagnostic()?;
        let command = match EditCommand::parse_line(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                warn!(line = number + 1, error = %e, "skipping malformed command");
                continue;
            }
        };

        match command {
            EditCommand::Save => print_json(&session.save_now().await)?,
            command if command.is_edit() => session.edit(|doc| command.apply(doc)).await,
            command => session.update(|doc| command.apply(doc)).await,
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn init_miette() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    miette::set_panic_hook();
}
