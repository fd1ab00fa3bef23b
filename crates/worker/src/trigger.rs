// Blob arrival trigger
//
// Lists the input container on an interval and reports every blob version it
// has not seen before, so replacing a blob triggers it again. A version only
// counts as seen once its workflow has been submitted, so a failed submission
// is retried on the next poll.

use docflow_core::{BlobStore, BlobStoreError, WorkItem};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A newly observed blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobArrival {
    /// `<container>/<name>`
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Store-assigned version of the content
    pub version: String,
}

impl BlobArrival {
    pub fn work_item(&self) -> WorkItem {
        WorkItem::from_blob_path(&self.path)
    }
}

pub struct BlobTrigger {
    blobs: Arc<dyn BlobStore>,
    container: String,
    poll_interval: Duration,
    /// `(name, version)` pairs with a submitted workflow
    seen: Mutex<HashSet<(String, String)>>,
}

impl BlobTrigger {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        container: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            blobs,
            container: container.into(),
            poll_interval,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Mark blob versions as already submitted
    pub fn seed<I>(&self, submitted: I)
    where
        I: IntoIterator<Item = (WorkItem, String)>,
    {
        let mut seen = self.seen.lock();
        seen.extend(
            submitted
                .into_iter()
                .map(|(item, version)| (item.into_inner(), version)),
        );
    }

    pub fn mark_seen(&self, arrival: &BlobArrival) {
        let item = arrival.work_item().into_inner();
        self.seen.lock().insert((item, arrival.version.clone()));
    }

    pub fn is_seen(&self, item: &WorkItem, version: &str) -> bool {
        self.seen
            .lock()
            .contains(&(item.as_str().to_string(), version.to_string()))
    }

    /// List the container and return blobs not seen yet, in name order
    pub async fn poll(&self) -> Result<Vec<BlobArrival>, BlobStoreError> {
        let listed = self.blobs.list(&self.container).await?;

        let seen = self.seen.lock();
        let arrivals: Vec<BlobArrival> = listed
            .into_iter()
            .filter(|blob| !seen.contains(&(blob.name.clone(), blob.version.clone())))
            .map(|blob| BlobArrival {
                path: format!("{}/{}", self.container, blob.name),
                size: blob.size,
                version: blob.version,
            })
            .collect();

        if !arrivals.is_empty() {
            debug!(container = %self.container, count = arrivals.len(), "New blobs found");
        }
        Ok(arrivals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::InMemoryBlobStore;

    async fn trigger_with(names: &[&str]) -> (BlobTrigger, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::new());
        for name in names {
            blobs.upload("input", name, b"pdf".to_vec()).await.unwrap();
        }
        let trigger = BlobTrigger::new(blobs.clone(), "input", Duration::from_millis(10));
        (trigger, blobs)
    }

    #[tokio::test]
    async fn test_reports_each_blob_until_seen() {
        let (trigger, _blobs) = trigger_with(&["a.pdf", "b.pdf"]).await;

        let arrivals = trigger.poll().await.unwrap();
        let paths: Vec<(&str, u64)> = arrivals
            .iter()
            .map(|arrival| (arrival.path.as_str(), arrival.size))
            .collect();
        assert_eq!(paths, vec![("input/a.pdf", 3), ("input/b.pdf", 3)]);

        // Not marked seen yet: redelivered
        assert_eq!(trigger.poll().await.unwrap().len(), 2);

        trigger.mark_seen(&arrivals[0]);
        let arrivals = trigger.poll().await.unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].work_item().as_str(), "b.pdf");
    }

    #[tokio::test]
    async fn test_replaced_blob_is_reported_again() {
        let (trigger, blobs) = trigger_with(&["report.pdf"]).await;

        let first = trigger.poll().await.unwrap().remove(0);
        trigger.mark_seen(&first);
        assert!(trigger.poll().await.unwrap().is_empty());

        blobs.upload("input", "report.pdf", b"new".to_vec()).await.unwrap();
        let arrivals = trigger.poll().await.unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].work_item().as_str(), "report.pdf");
        assert_ne!(arrivals[0].version, first.version);
        assert!(trigger.is_seen(&WorkItem::new("report.pdf"), &first.version));
        assert!(!trigger.is_seen(&WorkItem::new("report.pdf"), &arrivals[0].version));
    }

    #[tokio::test]
    async fn test_seeded_versions_are_skipped() {
        let (trigger, blobs) = trigger_with(&["a.pdf", "nested/c.pdf"]).await;
        let listed = blobs.list("input").await.unwrap();
        let nested = listed.iter().find(|blob| blob.name == "nested/c.pdf").unwrap();
        trigger.seed(vec![
            (WorkItem::new("nested/c.pdf"), nested.version.clone()),
            (WorkItem::new("a.pdf"), "stale".to_string()),
        ]);

        let arrivals = trigger.poll().await.unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].work_item().as_str(), "a.pdf");
        assert!(trigger.is_seen(&WorkItem::new("nested/c.pdf"), &nested.version));
    }

    #[test]
    fn test_arrival_work_item_keeps_nested_name() {
        let arrival = BlobArrival {
            path: "input/2024/report.pdf".into(),
            size: 1,
            version: "1".into(),
        };
        assert_eq!(arrival.work_item().as_str(), "2024/report.pdf");
    }
}
