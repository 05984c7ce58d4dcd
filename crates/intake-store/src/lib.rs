//! Resilient persistence for a multi-step business questionnaire.
//!
//! A [`Session`] owns one in-memory [`Document`] and keeps it on the server:
//! edits are debounced into saves, failed saves retry with backoff and then
//! fall back to a minimal payload, and every save attempt leaves a local
//! backup behind first.

pub mod artifact;
pub mod backup;
pub mod config;
pub mod debounce;
pub mod error;
pub mod mapping;
pub mod remote;
pub mod restore;
pub mod save;
pub mod session;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use backup::{BackupEnvelope, BackupStore, FileBackup, MemoryBackup};
pub use config::{BackupConfig, EngineConfig, RemoteConfig};
pub use error::{BackupError, ConfigError, IntakeError, RemoteError, Result, StateError};
pub use mapping::{DocumentPayload, MinimalPayload, RemoteDocument, SavePayload};
pub use remote::{HttpRemote, RemoteStore};
pub use save::{SaveEngine, SaveReport};
pub use session::Session;
pub use state::PersistedState;
pub use store::{ArtifactId, ComplexityMode, Document, DocumentId, SectionKey};
