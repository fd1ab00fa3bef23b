//! File-backed implementation of WorkflowEventStore
//!
//! Each workflow lives in its own `<workflow_id>.json` document holding the
//! workflow metadata and its full event log. Documents are rewritten through
//! a temporary file and a rename so a crash never leaves a torn log behind.
//!
//! The activity task queue stays in memory. After a restart the executor
//! rebuilds it from the logs (see `WorkflowExecutor::recover_workflows`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::memory::{filter_infos, WorkflowRecord};
use super::queue::TaskQueue;
use super::store::*;
use crate::activity::ActivityError;
use crate::workflow::{WorkflowError, WorkflowEvent};

/// Durable store keeping one JSON document per workflow in a directory
pub struct FileWorkflowEventStore {
    root: PathBuf,
    workflows: RwLock<HashMap<Uuid, WorkflowRecord>>,
    // Serializes read-modify-write cycles so document writes never interleave
    write_lock: Mutex<()>,
    tasks: TaskQueue,
}

impl FileWorkflowEventStore {
    /// Open (or create) a store rooted at `root`, loading every workflow in it
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let mut workflows = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<WorkflowRecord>(&bytes) {
                Ok(record) => {
                    workflows.insert(record.info.id, record);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable workflow document"
                    );
                }
            }
        }

        info!(root = %root.display(), workflows = workflows.len(), "Opened file workflow store");

        Ok(Self {
            root,
            workflows: RwLock::new(workflows),
            write_lock: Mutex::new(()),
            tasks: TaskQueue::default(),
        })
    }

    /// Directory holding the workflow documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, workflow_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", workflow_id))
    }

    async fn persist(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let path = self.document_path(record.info.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(
            workflow_id = %record.info.id,
            events = record.events.len(),
            "Persisted workflow document"
        );
        Ok(())
    }

    /// Apply `change` to a copy of the record, persist it, then publish it
    async fn update_record<T>(
        &self,
        workflow_id: Uuid,
        change: impl FnOnce(&mut WorkflowRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .workflows
            .read()
            .get(&workflow_id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(workflow_id))?;

        let value = change(&mut record)?;
        self.persist(&record).await?;
        self.workflows.write().insert(workflow_id, record);
        Ok(value)
    }
}

#[async_trait]
impl WorkflowEventStore for FileWorkflowEventStore {
    async fn create_workflow(
        &self,
        workflow_id: Uuid,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        if self.workflows.read().contains_key(&workflow_id) {
            return Err(StoreError::WorkflowExists(workflow_id));
        }

        let record = WorkflowRecord::new(workflow_id, workflow_type, input);
        self.persist(&record).await?;
        self.workflows.write().insert(workflow_id, record);
        Ok(())
    }

    async fn get_workflow_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|w| w.info.status)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn get_workflow_info(&self, workflow_id: Uuid) -> Result<WorkflowInfo, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|w| w.info.clone())
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowInfo>, StoreError> {
        Ok(filter_infos(self.workflows.read().values(), status))
    }

    async fn append_events(
        &self,
        workflow_id: Uuid,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        self.update_record(workflow_id, |record| {
            record.append(expected_sequence, events)
        })
        .await
    }

    async fn load_events(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(WorkflowRecord::numbered_events)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        self.update_record(workflow_id, |record| {
            record.set_status(status, result, error);
            Ok(())
        })
        .await
    }

    async fn enqueue_task(&self, task: TaskDefinition) -> Result<Uuid, StoreError> {
        Ok(self.tasks.enqueue(task))
    }

    async fn claim_task(
        &self,
        worker_id: &str,
        activity_types: &[String],
        max_tasks: usize,
    ) -> Result<Vec<ClaimedTask>, StoreError> {
        Ok(self.tasks.claim(worker_id, activity_types, max_tasks))
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.tasks.complete(task_id)
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &ActivityError,
    ) -> Result<TaskFailureOutcome, StoreError> {
        self.tasks.fail(task_id, error)
    }

    async fn has_open_task(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.tasks.has_open_task(workflow_id, activity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_workflow_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let workflow_id = Uuid::now_v7();

        {
            let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
            store
                .create_workflow(workflow_id, "process_document", json!({"blob_name": "a.pdf"}))
                .await
                .unwrap();
            store
                .append_events(
                    workflow_id,
                    0,
                    vec![WorkflowEvent::WorkflowStarted {
                        input: json!({"blob_name": "a.pdf"}),
                    }],
                )
                .await
                .unwrap();
            store
                .update_workflow_status(workflow_id, WorkflowStatus::Running, None, None)
                .await
                .unwrap();
        }

        let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
        let info = store.get_workflow_info(workflow_id).await.unwrap();
        assert_eq!(info.status, WorkflowStatus::Running);
        assert_eq!(info.input, json!({"blob_name": "a.pdf"}));

        let events = store.load_events(workflow_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, WorkflowEvent::WorkflowStarted { .. }));
    }

    #[tokio::test]
    async fn test_conflict_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
        let workflow_id = Uuid::now_v7();
        store.create_workflow(workflow_id, "t", json!({})).await.unwrap();

        let result = store
            .append_events(
                workflow_id,
                3,
                vec![WorkflowEvent::WorkflowStarted { input: json!({}) }],
            )
            .await;
        assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));

        let reopened = FileWorkflowEventStore::open(dir.path()).await.unwrap();
        assert!(reopened.load_events(workflow_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
        assert!(store.list_workflows(None).await.unwrap().is_empty());
    }
}
