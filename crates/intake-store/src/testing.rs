//! Scripted collaborators for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::backup::{BackupEnvelope, BackupStore};
use crate::error::{BackupError, RemoteError};
use crate::mapping::{ArtifactRecord, RemoteDocument, RemoteRecord, SavePayload};
use crate::store::{ArtifactId, ComplexityMode, DocumentId};

/// A 503 carrying `body`, the way an overloaded server answers.
pub(crate) fn unavailable(body: &str) -> RemoteError {
    RemoteError::Status {
        status: 503,
        body: body.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CallKind {
    Create,
    Update(DocumentId),
    Fetch(DocumentId),
    Generate(DocumentId),
}

#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub kind: CallKind,
    pub at: Instant,
    pub minimal: bool,
    pub body: Value,
}

impl Call {
    pub fn is_save(&self) -> bool {
        matches!(self.kind, CallKind::Create | CallKind::Update(_))
    }
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    fail_next: u32,
    fail_full: bool,
    fail_all: bool,
    fail_fetch: bool,
    fail_generate: bool,
    omit_id: bool,
    latency: Duration,
    next_id: i64,
    next_artifact: i64,
    documents: HashMap<DocumentId, RemoteDocument>,
}

/// In-memory [`RemoteStore`](crate::RemoteStore) with scriptable failures.
///
/// Created ids start at 42; artifact ids at 900.
pub(crate) struct ScriptedRemote {
    script: Mutex<Script>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                next_id: 42,
                next_artifact: 900,
                ..Default::default()
            }),
        }
    }

    /// Fail the next `n` create or update calls.
    pub fn fail_next(&self, n: u32) {
        self.script.lock().unwrap().fail_next = n;
    }

    /// Fail every create or update carrying the full payload.
    pub fn fail_full_payloads(&self, fail: bool) {
        self.script.lock().unwrap().fail_full = fail;
    }

    /// Fail every create or update.
    pub fn fail_all_saves(&self, fail: bool) {
        self.script.lock().unwrap().fail_all = fail;
    }

    /// Fail every fetch with a 503.
    pub fn fail_fetch(&self, fail: bool) {
        self.script.lock().unwrap().fail_fetch = fail;
    }

    pub fn fail_generate(&self, fail: bool) {
        self.script.lock().unwrap().fail_generate = fail;
    }

    /// Create responses leave out the id.
    pub fn omit_ids(&self, omit: bool) {
        self.script.lock().unwrap().omit_id = omit;
    }

    /// Every call sleeps this long before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().unwrap().latency = latency;
    }

    pub fn insert_document(&self, id: DocumentId, document: RemoteDocument) {
        self.script.lock().unwrap().documents.insert(id, document);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn save_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_save).collect()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    async fn delay(&self) {
        let latency = self.script.lock().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn record_save(
        &self,
        kind: CallKind,
        payload: SavePayload<'_>,
    ) -> Result<RemoteRecord, RemoteError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            kind: kind.clone(),
            at: Instant::now(),
            minimal: payload.is_minimal(),
            body: serde_json::to_value(payload).unwrap(),
        });

        if script.fail_next > 0 {
            script.fail_next -= 1;
            return Err(unavailable("scripted failure"));
        }
        if script.fail_all || (script.fail_full && !payload.is_minimal()) {
            return Err(unavailable("scripted outage"));
        }

        match kind {
            CallKind::Create if script.omit_id => Ok(RemoteRecord { id: None }),
            CallKind::Create => {
                let id = DocumentId(script.next_id);
                script.next_id += 1;
                Ok(RemoteRecord { id: Some(id) })
            }
            CallKind::Update(id) => Ok(RemoteRecord { id: Some(id) }),
            _ => unreachable!(),
        }
    }
}

#[async_trait]
impl crate::RemoteStore for ScriptedRemote {
    async fn create(&self, payload: SavePayload<'_>) -> Result<RemoteRecord, RemoteError> {
        self.delay().await;
        self.record_save(CallKind::Create, payload)
    }

    async fn update(
        &self,
        id: DocumentId,
        payload: SavePayload<'_>,
    ) -> Result<RemoteRecord, RemoteError> {
        self.delay().await;
        self.record_save(CallKind::Update(id), payload)
    }

    async fn fetch(&self, id: DocumentId) -> Result<RemoteDocument, RemoteError> {
        self.delay().await;
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            kind: CallKind::Fetch(id),
            at: Instant::now(),
            minimal: false,
            body: Value::Null,
        });
        if script.fail_fetch {
            return Err(unavailable("fetch unavailable"));
        }
        script
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: "not found".into(),
            })
    }

    async fn generate_artifact(
        &self,
        id: DocumentId,
        template_id: &str,
        mode: ComplexityMode,
    ) -> Result<ArtifactRecord, RemoteError> {
        self.delay().await;
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            kind: CallKind::Generate(id),
            at: Instant::now(),
            minimal: false,
            body: serde_json::json!({ "template_id": template_id, "mode": mode }),
        });
        if script.fail_generate {
            return Err(unavailable("generator down"));
        }
        let artifact = ArtifactId(script.next_artifact);
        script.next_artifact += 1;
        Ok(ArtifactRecord { id: artifact })
    }
}

/// Backup store whose writes always fail.
pub(crate) struct FailingBackup;

impl BackupStore for FailingBackup {
    fn put(&self, _key: &str, _envelope: &BackupEnvelope) -> Result<(), BackupError> {
        Err(BackupError::Rejected {
            message: "quota exceeded".into(),
        })
    }

    fn get(&self, _key: &str) -> Result<Option<BackupEnvelope>, BackupError> {
        Ok(None)
    }
}
