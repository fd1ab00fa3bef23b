// Built-in blob stores
//
// LocalBlobStore maps each container to a directory under a root path.
// InMemoryBlobStore keeps everything in a map and is meant for tests.
// Both report a version per blob that changes on every upload.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

use crate::error::BlobStoreError;
use crate::traits::{BlobInfo, BlobStore};

const MEMORY_SCHEME: &str = "memory:";
const FILE_SCHEME: &str = "file://";

/// Staging directory for in-progress uploads, inside each container
const UPLOAD_DIR: &str = ".uploads";

/// Build a blob store from a storage connection string.
///
/// - `memory:` gives a fresh [`InMemoryBlobStore`]
/// - `file:///some/dir` or a plain path gives a [`LocalBlobStore`] rooted there
pub fn blob_store_from_connection_string(
    connection: &str,
) -> Result<Arc<dyn BlobStore>, BlobStoreError> {
    let connection = connection.trim();
    if connection.is_empty() {
        return Err(BlobStoreError::InvalidConnectionString(
            "connection string is empty".to_string(),
        ));
    }

    if connection == MEMORY_SCHEME {
        return Ok(Arc::new(InMemoryBlobStore::new()));
    }

    let path = connection.strip_prefix(FILE_SCHEME).unwrap_or(connection);
    if path.is_empty() {
        return Err(BlobStoreError::InvalidConnectionString(connection.to_string()));
    }
    Ok(Arc::new(LocalBlobStore::new(path)))
}

/// Reject names that could escape their container
fn validate_name(kind: &str, name: &str) -> Result<(), BlobStoreError> {
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(BlobStoreError::InvalidName(format!("{} '{}'", kind, name)));
    }
    Ok(())
}

fn validate_blob_name(name: &str) -> Result<(), BlobStoreError> {
    validate_name("blob", name)?;
    if name.split('/').next() == Some(UPLOAD_DIR) {
        return Err(BlobStoreError::InvalidName(format!("blob '{}' is reserved", name)));
    }
    Ok(())
}

/// Modification time in nanoseconds plus size
fn file_version(metadata: &std::fs::Metadata) -> Result<String, BlobStoreError> {
    let modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    Ok(format!("{:x}-{:x}", modified, metadata.len()))
}

// ============================================================================
// LocalBlobStore
// ============================================================================

/// Blob store backed by a directory tree: `<root>/<container>/<name>`
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, BlobStoreError> {
        validate_name("container", container)?;
        validate_blob_name(name)?;
        Ok(self.root.join(container).join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(&self, container: &str) -> Result<Vec<BlobInfo>, BlobStoreError> {
        validate_name("container", container)?;
        let base = self.root.join(container);

        let mut blobs = Vec::new();
        let mut pending = vec![(base, String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if prefix.is_empty() && file_name == UPLOAD_DIR {
                        continue;
                    }
                    pending.push((entry.path(), format!("{}{}/", prefix, file_name)));
                } else if file_type.is_file() {
                    let metadata = entry.metadata().await?;
                    blobs.push(BlobInfo {
                        name: format!("{}{}", prefix, file_name),
                        size: metadata.len(),
                        version: file_version(&metadata)?,
                    });
                }
            }
        }

        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }

    async fn download(&self, container: &str, name: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.blob_path(container, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BlobStoreError::not_found(container, name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), BlobStoreError> {
        let path = self.blob_path(container, name)?;
        let parent = path
            .parent()
            .ok_or_else(|| BlobStoreError::InvalidName(name.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let staging = self.root.join(container).join(UPLOAD_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let tmp = staging.join(format!("{}.tmp", Uuid::now_v7()));

        let size = data.len();
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(container, name, size, "Uploaded blob");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

// ============================================================================
// InMemoryBlobStore
// ============================================================================

#[derive(Debug)]
struct StoredBlob {
    data: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Containers {
    blobs: BTreeMap<String, BTreeMap<String, StoredBlob>>,
    generation: u64,
}

/// Blob store keeping every container in memory
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    containers: RwLock<Containers>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently in a container
    pub fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .blobs
            .get(container)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(&self, container: &str) -> Result<Vec<BlobInfo>, BlobStoreError> {
        validate_name("container", container)?;
        let containers = self.containers.read();
        Ok(containers
            .blobs
            .get(container)
            .map(|blobs| {
                blobs
                    .iter()
                    .map(|(name, blob)| BlobInfo {
                        name: name.clone(),
                        size: blob.data.len() as u64,
                        version: blob.generation.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(&self, container: &str, name: &str) -> Result<Vec<u8>, BlobStoreError> {
        validate_name("container", container)?;
        validate_blob_name(name)?;
        self.containers
            .read()
            .blobs
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .map(|blob| blob.data.clone())
            .ok_or_else(|| BlobStoreError::not_found(container, name))
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), BlobStoreError> {
        validate_name("container", container)?;
        validate_blob_name(name)?;
        let mut containers = self.containers.write();
        containers.generation += 1;
        let generation = containers.generation;
        containers
            .blobs
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), StoredBlob { data, generation });
        Ok(())
    }

    fn describe(&self) -> String {
        MEMORY_SCHEME.to_string()
    }
}
