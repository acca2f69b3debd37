//! Batch delete
//!
//! Keys go out in chunks of [`MAX_DELETE_BATCH`], the protocol maximum for a
//! multi-object delete. Per-key failures come back as data in request order;
//! only a failed request aborts the batch.

use crate::client::{StorageClient, MAX_DELETE_BATCH};
use crate::error::StorageResult;
use crate::types::{DeleteBatchResult, DeleteFailure, DeleteOutcome};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, warn};

pub(super) async fn remove_batch(
    client: &dyn StorageClient,
    bucket: &str,
    keys: &[String],
) -> StorageResult<DeleteBatchResult> {
    let mut failures: HashMap<String, DeleteFailure> = HashMap::new();

    for (index, chunk) in keys.chunks(MAX_DELETE_BATCH).enumerate() {
        debug!(
            "Deleting chunk {} ({} keys) from {}",
            index + 1,
            chunk.len(),
            bucket
        );
        let requested: HashSet<&str> = chunk.iter().map(String::as_str).collect();

        for failure in client.remove_objects(bucket, chunk).await? {
            if requested.contains(failure.key.as_str()) {
                error!(
                    bucket = bucket,
                    key = %failure.key,
                    code = %failure.code,
                    "Failed to delete object: {}",
                    failure.message
                );
                failures.insert(failure.key.clone(), failure);
            } else {
                warn!(
                    "Ignoring delete error for unrequested key {} in {}: {}",
                    failure.key, bucket, failure.code
                );
            }
        }
    }

    let outcomes = keys
        .iter()
        .map(|key| match failures.get(key).cloned() {
            Some(failure) => DeleteOutcome::Failed(failure),
            None => DeleteOutcome::Deleted(key.clone()),
        })
        .collect();

    Ok(DeleteBatchResult { outcomes })
}
