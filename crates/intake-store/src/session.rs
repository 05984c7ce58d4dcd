use std::sync::Arc;

use crate::backup::{BackupEnvelope, BackupStore};
use crate::config::EngineConfig;
use crate::debounce::DebounceGate;
use crate::error::Result;
use crate::remote::RemoteStore;
use crate::save::{SaveEngine, SaveReport};
use crate::state::PersistedState;
use crate::store::{ArtifactId, ComplexityMode, Document, DocumentId};

/// One wizard session: a document, its collaborators, and its debounce gate.
///
/// Cheap to clone; every clone drives the same document. Construct inside a
/// tokio runtime, and call [`Session::shutdown`] before dropping the last
/// clone so a pending debounced save is flushed.
#[derive(Clone)]
pub struct Session {
    engine: Arc<SaveEngine>,
    gate: Arc<DebounceGate>,
}

impl Session {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        backup: Arc<dyn BackupStore>,
        config: EngineConfig,
    ) -> Self {
        Self::with_document(Document::new(), remote, backup, config)
    }

    pub fn with_document(
        document: Document,
        remote: Arc<dyn RemoteStore>,
        backup: Arc<dyn BackupStore>,
        config: EngineConfig,
    ) -> Self {
        let engine = Arc::new(SaveEngine::new(document, remote, backup, config));
        let gate = Arc::new(DebounceGate::spawn(engine.clone()));
        Self { engine, gate }
    }

    pub fn engine(&self) -> &Arc<SaveEngine> {
        &self.engine
    }

    /// Mutate the document without scheduling a save.
    pub async fn update<R>(&self, mutate: impl FnOnce(&mut Document) -> R) -> R {
        self.engine.update(mutate).await
    }

    /// Mutate the document and schedule a debounced save.
    pub async fn edit<R>(&self, mutate: impl FnOnce(&mut Document) -> R) -> R {
        let result = self.engine.update(mutate).await;
        self.gate.request_save();
        result
    }

    pub async fn read<R>(&self, view: impl FnOnce(&Document) -> R) -> R {
        self.engine.read(view).await
    }

    pub fn request_save(&self) {
        self.gate.request_save();
    }

    pub async fn save_now(&self) -> SaveReport {
        self.engine.save_now().await
    }

    pub async fn load(&self, id: DocumentId) -> Result<()> {
        self.engine.load(id).await
    }

    pub async fn generate(&self, template_id: &str, mode: ComplexityMode) -> Result<ArtifactId> {
        self.engine.generate(template_id, mode).await
    }

    pub fn recover_backup(&self) -> Result<Option<BackupEnvelope>> {
        Ok(self.engine.recover_backup()?)
    }

    pub async fn apply_backup(&self, envelope: BackupEnvelope) {
        self.engine.apply_backup(envelope).await;
    }

    pub async fn is_loading(&self) -> bool {
        self.engine.read(|doc| doc.is_loading()).await
    }

    pub async fn persisted(&self) -> PersistedState {
        self.engine.read(|doc| doc.to_persisted()).await
    }

    pub async fn shutdown(&self) {
        self.gate.shutdown().await;
    }
}
