use tracing::{info, warn};

use crate::error::{IntakeError, Result};
use crate::save::SaveEngine;
use crate::store::{ArtifactId, ComplexityMode};

impl SaveEngine {
    /// Generate a landing page from the saved questionnaire.
    ///
    /// Requires a server identity. Pending edits are saved first; if that
    /// save fails, generation still runs against whatever the server holds.
    /// Holds `save_lock` throughout, so no save or load interleaves with the
    /// generation call.
    pub async fn generate(&self, template_id: &str, mode: ComplexityMode) -> Result<ArtifactId> {
        let Some(id) = self.read(|doc| doc.identity()).await else {
            return Err(IntakeError::NotPersisted);
        };

        let _guard = self.save_lock.lock().await;
        let report = self.save_locked().await;
        if !report.success {
            warn!(%id, outcome = report.message, "pre-generation save failed");
        }

        self.update(|doc| doc.set_loading(true)).await;
        match self.remote.generate_artifact(id, template_id, mode).await {
            Ok(record) => {
                self.update(|doc| {
                    doc.set_derived_id(record.id);
                    doc.set_loading(false);
                })
                .await;
                info!(%id, artifact = %record.id, template_id, %mode, "landing page generated");
                Ok(record.id)
            }
            Err(source) => {
                warn!(%id, error = %source, "landing page generation failed");
                self.finish_loading().await;
                Err(IntakeError::GenerationFailed { id, source })
            }
        }
    }
}
