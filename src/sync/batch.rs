//! Batching and checksums for uploads.
//!
//! Sessions are split into fixed-size batches, each carrying a SHA-256 of
//! its serialized sessions so the server can detect replays of the same
//! batch.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::types::{ApiSession, UploadBatch};
use crate::error::Result;

/// Sessions per upload request.
pub const BATCH_SIZE: usize = 100;

/// SHA-256 of a value's JSON serialization, as lowercase hex.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Number of batches needed for `total` sessions.
#[must_use]
pub const fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size)
}

/// Split sessions into numbered batches of at most `batch_size`.
///
/// Every batch carries the same `total_batches` and `total_sessions`.
pub fn build_batches(sessions: Vec<ApiSession>, batch_size: usize) -> Result<Vec<UploadBatch>> {
    let batch_size = batch_size.max(1);
    let total_sessions = sessions.len();
    let total_batches = batch_count(total_sessions, batch_size);

    let mut batches = Vec::with_capacity(total_batches);
    let mut remaining = sessions.into_iter().peekable();
    while remaining.peek().is_some() {
        let chunk: Vec<ApiSession> = remaining.by_ref().take(batch_size).collect();
        batches.push(UploadBatch {
            checksum: content_hash(&chunk)?,
            sessions: chunk,
            batch_number: batches.len() + 1,
            total_batches,
            total_sessions,
        });
    }
    Ok(batches)
}
