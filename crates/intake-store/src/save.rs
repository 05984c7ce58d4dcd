//! Save orchestration: staleness check, local backup, bounded retries with
//! backoff, and the minimal-payload fallback.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::backup::{BackupEnvelope, BackupStore};
use crate::config::EngineConfig;
use crate::error::RemoteError;
use crate::mapping::{DocumentPayload, MinimalPayload, RemoteRecord, SavePayload};
use crate::remote::RemoteStore;
use crate::store::{Document, DocumentId, Stamp};

/// Outcome of [`SaveEngine::save_now`].
///
/// Save failures are routine, so they are reported here instead of as
/// errors. `saved_locally` means the server never accepted the snapshot but
/// a local backup was attempted before any remote call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub saved_locally: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_minimal_save: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub critical_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_taken: Option<u32>,
    pub message: &'static str,
}

impl SaveReport {
    pub const NO_CHANGES: &'static str = "no changes";
    pub const SAVED: &'static str = "saved";
    pub const SAVED_MINIMAL: &'static str = "saved minimal payload";
    pub const BACKED_UP_LOCALLY: &'static str = "server save failed, backed up locally";
    pub const CRITICAL: &'static str = "save ended without an outcome";

    fn no_changes() -> Self {
        Self {
            success: true,
            saved_locally: false,
            is_minimal_save: false,
            critical_failure: false,
            attempts_taken: None,
            message: Self::NO_CHANGES,
        }
    }

    fn saved(attempts: u32) -> Self {
        Self {
            attempts_taken: Some(attempts),
            message: Self::SAVED,
            ..Self::no_changes()
        }
    }

    fn minimal(attempts: u32) -> Self {
        Self {
            is_minimal_save: true,
            message: Self::SAVED_MINIMAL,
            ..Self::saved(attempts)
        }
    }

    fn backed_up_locally(attempts: u32) -> Self {
        Self {
            success: false,
            saved_locally: true,
            attempts_taken: Some(attempts),
            message: Self::BACKED_UP_LOCALLY,
            ..Self::no_changes()
        }
    }

    fn critical() -> Self {
        Self {
            success: false,
            saved_locally: true,
            critical_failure: true,
            message: Self::CRITICAL,
            ..Self::no_changes()
        }
    }
}

/// Owner of one questionnaire document and everything that persists it.
///
/// The document sits behind an async lock that is never held across a
/// remote call. `save_lock` admits one save or load at a time, so direct
/// callers and the debounce gate queue behind each other.
pub struct SaveEngine {
    pub(crate) doc: RwLock<Document>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) backup: Arc<dyn BackupStore>,
    pub(crate) config: EngineConfig,
    pub(crate) save_lock: Mutex<()>,
}

impl SaveEngine {
    pub fn new(
        document: Document,
        remote: Arc<dyn RemoteStore>,
        backup: Arc<dyn BackupStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            doc: RwLock::new(document),
            remote,
            backup,
            config,
            save_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one mutation to the document atomically.
    pub async fn update<R>(&self, mutate: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = self.doc.write().await;
        mutate(&mut doc)
    }

    pub async fn read<R>(&self, view: impl FnOnce(&Document) -> R) -> R {
        let doc = self.doc.read().await;
        view(&doc)
    }

    /// Persist the document now, waiting for any save or load in flight.
    pub async fn save_now(&self) -> SaveReport {
        let _guard = self.save_lock.lock().await;
        self.save_locked().await
    }

    /// Save body; the caller holds `save_lock`.
    pub(crate) async fn save_locked(&self) -> SaveReport {
        let (snapshot, identity, payload) = {
            let mut doc = self.doc.write().await;
            if !doc.needs_save() {
                debug!("no changes since last save");
                return SaveReport::no_changes();
            }
            doc.set_loading(true);
            (doc.stamp(), doc.identity(), DocumentPayload::from(&*doc))
        };

        self.write_backup(BackupEnvelope::now(payload.clone())).await;

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            let error = match self.push(identity, SavePayload::Full(&payload)).await {
                Ok(record) => {
                    self.commit(snapshot, record).await;
                    debug!(attempt, "questionnaire saved");
                    return SaveReport::saved(attempt);
                }
                Err(e) => e,
            };

            if attempt < attempts {
                let delay = self.config.backoff(attempt);
                warn!(attempt, ?delay, error = %error, "save attempt failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(attempt, error = %error, "retries exhausted, sending minimal payload");
            let minimal = MinimalPayload::from(&payload);
            return match self.push(identity, SavePayload::Minimal(&minimal)).await {
                Ok(record) => {
                    self.commit(snapshot, record).await;
                    info!("minimal payload saved");
                    SaveReport::minimal(attempts)
                }
                Err(e) => {
                    error!(error = %e, "minimal save failed, keeping local backup");
                    self.finish_loading().await;
                    SaveReport::backed_up_locally(attempts)
                }
            };
        }

        error!("save loop finished without an outcome");
        self.finish_loading().await;
        SaveReport::critical()
    }

    /// Best-effort backup write on the blocking pool; failures are logged.
    async fn write_backup(&self, envelope: BackupEnvelope) {
        let backup = self.backup.clone();
        let key = self.config.backup_key.clone();
        match tokio::task::spawn_blocking(move || backup.put(&key, &envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, key = %self.config.backup_key, "local backup write failed")
            }
            Err(e) => warn!(error = %e, "local backup task failed"),
        }
    }

    async fn push(
        &self,
        identity: Option<DocumentId>,
        payload: SavePayload<'_>,
    ) -> Result<RemoteRecord, RemoteError> {
        match identity {
            Some(id) => self.remote.update(id, payload).await,
            None => self.remote.create(payload).await,
        }
    }

    async fn commit(&self, snapshot: Stamp, record: RemoteRecord) {
        let mut doc = self.doc.write().await;
        if let Some(id) = record.id {
            if doc.adopt_identity(id) {
                info!(%id, "questionnaire created");
            }
        }
        doc.mark_saved(snapshot);
        doc.set_loading(false);
    }

    pub(crate) async fn finish_loading(&self) {
        self.doc.write().await.set_loading(false);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backup::{DEFAULT_BACKUP_KEY, MemoryBackup};
    use crate::store::SectionKey;
    use crate::testing::{CallKind, FailingBackup, ScriptedRemote};

    const UNIT: Duration = Duration::from_secs(1);

    fn engine_with(
        remote: &Arc<ScriptedRemote>,
        backup: Arc<dyn BackupStore>,
        config: EngineConfig,
    ) -> Arc<SaveEngine> {
        Arc::new(SaveEngine::new(
            Document::new(),
            remote.clone(),
            backup,
            config,
        ))
    }

    fn engine(remote: &Arc<ScriptedRemote>) -> (Arc<SaveEngine>, Arc<MemoryBackup>) {
        let backup = Arc::new(MemoryBackup::new());
        let engine = engine_with(remote, backup.clone(), EngineConfig::default());
        (engine, backup)
    }

    async fn edit(engine: &SaveEngine) {
        engine
            .update(|doc| {
                doc.merge_section(
                    SectionKey::BusinessInfo,
                    json!({ "business_name": "Acme Roofing", "industry": "Construction" }),
                );
                doc.set_section(SectionKey::Faqs, json!([{ "q": "Insured?", "a": "Yes" }]));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_save_without_edits_is_a_no_op() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        edit(&engine).await;

        let first = engine.save_now().await;
        assert!(first.success);
        assert_eq!(first.message, SaveReport::SAVED);
        assert_eq!(first.attempts_taken, Some(1));

        let second = engine.save_now().await;
        assert_eq!(second, SaveReport::no_changes());
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_changes_skips_backup() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, backup) = engine(&remote);
        edit(&engine).await;
        engine.save_now().await;

        let before = backup.get(DEFAULT_BACKUP_KEY).unwrap().unwrap();
        tokio::time::advance(UNIT).await;
        engine.save_now().await;
        let after = backup.get(DEFAULT_BACKUP_KEY).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_schedule() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        edit(&engine).await;
        remote.fail_next(2);

        let report = engine.save_now().await;
        assert!(report.success);
        assert!(!report.is_minimal_save);
        assert_eq!(report.attempts_taken, Some(3));

        let calls = remote.save_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| !c.minimal));
        assert!(calls[1].at - calls[0].at >= UNIT);
        assert!(calls[2].at - calls[1].at >= 2 * UNIT);
        assert!(calls[2].at - calls[1].at > calls[1].at - calls[0].at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degrades_to_minimal_payload_after_retries() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        edit(&engine).await;
        remote.fail_full_payloads(true);

        let report = engine.save_now().await;
        assert!(report.success);
        assert!(report.is_minimal_save);
        assert!(!report.saved_locally);
        assert_eq!(report.attempts_taken, Some(3));

        let calls = remote.save_calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[..3].iter().all(|c| !c.minimal));
        assert!(calls[3].minimal);
        assert_eq!(
            calls[3].body["business_info"],
            json!({ "business_name": "Acme Roofing", "industry": "Construction" })
        );
        assert!(calls[3].body.get("faqs").is_none());

        engine
            .read(|doc| {
                assert_eq!(doc.identity(), Some(DocumentId(42)));
                assert!(!doc.needs_save());
                assert!(!doc.is_loading());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_keeps_local_backup() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, backup) = engine(&remote);
        edit(&engine).await;
        engine.save_now().await;
        let saved_at = engine.read(|doc| doc.last_saved()).await;

        engine
            .update(|doc| doc.merge_section(SectionKey::Contact, json!({ "phone": "555-0100" })))
            .await;
        remote.fail_all_saves(true);

        let report = engine.save_now().await;
        assert_eq!(
            report,
            SaveReport {
                success: false,
                saved_locally: true,
                is_minimal_save: false,
                critical_failure: false,
                attempts_taken: Some(3),
                message: SaveReport::BACKED_UP_LOCALLY,
            }
        );

        let envelope = backup.get(DEFAULT_BACKUP_KEY).unwrap().unwrap();
        let current = engine.read(|doc| DocumentPayload::from(doc)).await;
        assert_eq!(envelope.data, current);
        assert_eq!(envelope.data.contact, json!({ "phone": "555-0100" }));

        engine
            .read(|doc| {
                assert_eq!(doc.last_saved(), saved_at);
                assert!(doc.needs_save());
                assert!(!doc.is_loading());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_update() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);

        for n in 0..3 {
            engine.update(|doc| doc.set_step(n)).await;
            engine
                .update(|doc| doc.merge_section(SectionKey::Services, json!({ "round": n })))
                .await;
            assert!(engine.save_now().await.success);
        }

        let kinds: Vec<_> = remote.save_calls().into_iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CallKind::Create,
                CallKind::Update(DocumentId(42)),
                CallKind::Update(DocumentId(42)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_id_retries_create_next_time() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        remote.omit_ids(true);
        edit(&engine).await;

        assert!(engine.save_now().await.success);
        assert_eq!(engine.read(|doc| doc.identity()).await, None);

        remote.omit_ids(false);
        engine.update(|doc| doc.set_complete(true)).await;
        assert!(engine.save_now().await.success);
        assert_eq!(engine.read(|doc| doc.identity()).await, Some(DocumentId(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_fallback_never_produced() {
        for attempts in 0..=4 {
            for failures in 0..=6 {
                for outage in [false, true] {
                    let remote = Arc::new(ScriptedRemote::new());
                    let config = EngineConfig {
                        max_attempts: attempts,
                        ..EngineConfig::default()
                    };
                    let engine = engine_with(&remote, Arc::new(MemoryBackup::new()), config);
                    edit(&engine).await;
                    remote.fail_next(failures);
                    remote.fail_all_saves(outage);

                    let report = engine.save_now().await;
                    assert!(
                        !report.critical_failure,
                        "attempts={attempts} failures={failures} outage={outage}"
                    );
                    assert!(report.success || report.saved_locally);
                    assert!(!engine.read(|doc| doc.is_loading()).await);
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_save_is_picked_up_next_time() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        remote.set_latency(UNIT);
        edit(&engine).await;

        let in_flight = tokio::spawn({
            let engine = engine.clone();
            async move { engine.save_now().await }
        });
        tokio::time::sleep(UNIT / 2).await;
        assert!(engine.read(|doc| doc.is_loading()).await);
        engine.update(|doc| doc.set_complete(true)).await;

        assert!(in_flight.await.unwrap().success);
        assert!(engine.read(|doc| doc.needs_save()).await);

        let report = engine.save_now().await;
        assert_eq!(report.message, SaveReport::SAVED);
        let calls = remote.save_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body["is_complete"], json!(false));
        assert_eq!(calls[1].body["is_complete"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_saves_run_one_at_a_time() {
        let remote = Arc::new(ScriptedRemote::new());
        let (engine, _) = engine(&remote);
        remote.set_latency(UNIT);
        edit(&engine).await;

        let (a, b) = tokio::join!(engine.save_now(), engine.save_now());
        let mut messages = [a.message, b.message];
        messages.sort();
        assert_eq!(messages, [SaveReport::NO_CHANGES, SaveReport::SAVED]);
        assert_eq!(remote.save_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_failure_does_not_change_result() {
        let remote = Arc::new(ScriptedRemote::new());
        let engine = engine_with(&remote, Arc::new(FailingBackup), EngineConfig::default());
        edit(&engine).await;

        let report = engine.save_now().await;
        assert_eq!(report, SaveReport::saved(1));

        engine.update(|doc| doc.set_complete(true)).await;
        remote.fail_all_saves(true);
        let report = engine.save_now().await;
        assert!(report.saved_locally);
        assert!(!report.critical_failure);
    }

    /// Remembers which thread each write ran on.
    #[derive(Default)]
    struct ThreadRecordingBackup {
        writers: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl BackupStore for ThreadRecordingBackup {
        fn put(
            &self,
            _key: &str,
            _envelope: &BackupEnvelope,
        ) -> Result<(), crate::error::BackupError> {
            self.writers.lock().unwrap().push(std::thread::current().id());
            Ok(())
        }

        fn get(&self, _key: &str) -> Result<Option<BackupEnvelope>, crate::error::BackupError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_write_runs_off_the_runtime_thread() {
        let remote = Arc::new(ScriptedRemote::new());
        let backup = Arc::new(ThreadRecordingBackup::default());
        let engine = engine_with(&remote, backup.clone(), EngineConfig::default());
        edit(&engine).await;

        assert!(engine.save_now().await.success);

        let writers = backup.writers.lock().unwrap().clone();
        assert_eq!(writers.len(), 1);
        assert_ne!(writers[0], std::thread::current().id());
    }

    #[test]
    fn test_report_serialization_omits_unset_flags() {
        insta::assert_json_snapshot!(SaveReport::no_changes(), @r#"
        {
          "success": true,
          "message": "no changes"
        }
        "#);
        insta::assert_json_snapshot!(SaveReport::backed_up_locally(3), @r#"
        {
          "success": false,
          "saved_locally": true,
          "attempts_taken": 3,
          "message": "server save failed, backed up locally"
        }
        "#);
    }
}
