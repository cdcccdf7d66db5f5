//! Object store abstraction.
//!
//! Uploaded inputs and generated audio/images live in an S3-compatible
//! bucket. Components depend on the [`ObjectStore`] trait; production wires
//! in [`s3::S3ObjectStore`].

use std::time::Duration;

use async_trait::async_trait;

pub mod s3;

pub use s3::S3ObjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, overwriting any existing one at the key.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    /// Read a whole object into memory.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Presigned GET URL for direct client downloads.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn bucket(&self) -> &str;
}

/// Object key for a generated per-segment asset.
pub fn segment_asset_key(job_id: uuid::Uuid, idx: i32, basename: &str) -> String {
    format!("jobs/{job_id}/segments/{idx}/{basename}")
}

/// Object key for an uploaded input file.
pub fn upload_key(file_id: uuid::Uuid, filename: &str) -> String {
    format!("uploads/{file_id}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_keys_are_stable() {
        let job = uuid::Uuid::nil();
        assert_eq!(
            segment_asset_key(job, 3, "audio.wav"),
            "jobs/00000000-0000-0000-0000-000000000000/segments/3/audio.wav"
        );
    }
}
