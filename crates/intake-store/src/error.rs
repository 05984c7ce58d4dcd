use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::store::DocumentId;

/// Top-level error type for intake-store operations.
///
/// Save failures never show up here; `save_now` reports them through
/// [`SaveReport`](crate::SaveReport).
#[derive(Debug, Error, Diagnostic)]
pub enum IntakeError {
    #[error("failed to load questionnaire {id}")]
    #[diagnostic(
        code(intake::load_failed),
        help("the server could not return this questionnaire; check the id and connectivity")
    )]
    LoadFailed {
        id: DocumentId,
        #[source]
        source: RemoteError,
    },

    #[error("questionnaire has not been saved to the server yet")]
    #[diagnostic(
        code(intake::not_persisted),
        help("save the questionnaire at least once before generating a landing page")
    )]
    NotPersisted,

    #[error("landing page generation failed for questionnaire {id}")]
    #[diagnostic(code(intake::generation_failed))]
    GenerationFailed {
        id: DocumentId,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),
}

/// Failures of a single remote call.
#[derive(Debug, Error, Diagnostic)]
pub enum RemoteError {
    #[error("request failed: {source}")]
    #[diagnostic(code(remote::http))]
    Http {
        #[source]
        source: reqwest::Error,
    },

    #[error("server responded with status {status}: {body}")]
    #[diagnostic(code(remote::status))]
    Status { status: u16, body: String },

    #[error("failed to decode server response: {message}")]
    #[diagnostic(code(remote::decode))]
    Decode { message: String },

    #[error("invalid request URL: {message}")]
    #[diagnostic(code(remote::url))]
    InvalidUrl { message: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_decode() {
            Self::Decode {
                message: source.to_string(),
            }
        } else {
            Self::Http { source }
        }
    }
}

/// Local backup channel errors
#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    #[error("backup storage I/O failed at {}", path.display())]
    #[diagnostic(code(backup::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize backup snapshot")]
    #[diagnostic(code(backup::serde))]
    Serde(#[from] serde_json::Error),

    #[error("backup storage rejected the write: {message}")]
    #[diagnostic(code(backup::rejected))]
    Rejected { message: String },
}

/// Persisted session state file errors
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("failed to access state file {}", path.display())]
    #[diagnostic(code(state::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is not valid", path.display())]
    #[diagnostic(
        code(state::parse),
        help("delete the file to start a fresh questionnaire, or load one by id")
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required environment variable: {var}")]
    #[diagnostic(
        code(config::missing_env),
        help("Set the {var} environment variable or add it to your .env file")
    )]
    MissingEnv { var: &'static str },

    #[error("failed to parse URL: {url}")]
    #[diagnostic(code(config::url_parse))]
    UrlParse { url: String, message: String },
}

pub type Result<T> = std::result::Result<T, IntakeError>;
