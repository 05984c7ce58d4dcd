//! Hydrating a document from the server, and manual recovery from the local
//! backup.

use tracing::{info, warn};

use crate::backup::BackupEnvelope;
use crate::error::{BackupError, IntakeError, Result};
use crate::mapping::RemoteDocument;
use crate::save::SaveEngine;
use crate::store::{Document, DocumentId};

impl Document {
    /// Replace the content with a recovered backup.
    ///
    /// Counts as an edit, so the next save uploads it. Identity and wizard
    /// step are kept.
    pub fn apply_backup(&mut self, envelope: BackupEnvelope) {
        self.replace_content(envelope.data.into_content());
    }
}

impl SaveEngine {
    /// Replace the document with the questionnaire stored under `id`.
    ///
    /// On success the document reads as already saved, so an immediate
    /// save is a no-op. On failure the document is left as it was.
    pub async fn load(&self, id: DocumentId) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        self.update(|doc| doc.set_loading(true)).await;

        let RemoteDocument {
            id: remote_id,
            landing_page_id,
            payload,
        } = match self.remote.fetch(id).await {
            Ok(remote) => remote,
            Err(source) => {
                warn!(%id, error = %source, "failed to load questionnaire");
                self.finish_loading().await;
                return Err(IntakeError::LoadFailed { id, source });
            }
        };

        if let Some(remote_id) = remote_id.filter(|remote_id| *remote_id != id) {
            warn!(%id, %remote_id, "server returned a different id, keeping the requested one");
        }

        let mut doc = self.doc.write().await;
        doc.hydrate(
            id,
            landing_page_id,
            payload.into_content(),
            self.config.load_offset,
        );
        doc.set_loading(false);
        info!(%id, "questionnaire loaded");
        Ok(())
    }

    /// Read the last local backup, if any. Nothing is applied.
    pub fn recover_backup(&self) -> std::result::Result<Option<BackupEnvelope>, BackupError> {
        self.backup.get(&self.config.backup_key)
    }

    /// Apply a recovered backup to the live document.
    /// See [`Document::apply_backup`].
    pub async fn apply_backup(&self, envelope: BackupEnvelope) {
        let timestamp = envelope.timestamp;
        self.update(|doc| doc.apply_backup(envelope)).await;
        info!(%timestamp, "applied local backup");
    }
}
