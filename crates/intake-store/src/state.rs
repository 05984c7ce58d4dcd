//! The part of a session that survives a restart without a server round trip.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::mapping::DocumentPayload;
use crate::store::{ArtifactId, Document, DocumentId};

/// Sections, completion and selections, wizard step, and ids.
///
/// Save bookkeeping and the loading flag are not carried, so a restored
/// document always reads as unsaved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub content: DocumentPayload,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub identity: Option<DocumentId>,
    #[serde(default)]
    pub derived_id: Option<ArtifactId>,
}

impl PersistedState {
    /// Read a state file. A missing file is `None`.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Option<Self>, StateError> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StateError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let serialized = serde_json::to_vec_pretty(self).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serialized).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }
}

impl Document {
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            content: DocumentPayload::from(self),
            current_step: self.current_step(),
            identity: self.identity(),
            derived_id: self.derived_id(),
        }
    }

    pub fn from_persisted(state: PersistedState) -> Self {
        let mut doc = Document::new();
        doc.replace_content(state.content.into_content());
        doc.set_step(state.current_step);
        doc.set_identity_and_derived(state.identity, state.derived_id);
        doc
    }
}
