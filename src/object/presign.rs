//! Presigned URL validation

use crate::error::{StorageError, StorageResult};
use crate::types::{PresignMethod, PresignedUrlSpec, DEFAULT_PRESIGN_EXPIRY, MAX_PRESIGN_EXPIRY};
use std::time::Duration;

/// Check the request and resolve its expiry. SigV4 expiry is counted in
/// whole seconds, so anything under one second is rejected with zero.
pub(super) fn validate(spec: &PresignedUrlSpec) -> StorageResult<Duration> {
    let PresignMethod::Get = spec.method;
    if spec.object.range.is_some() {
        return Err(StorageError::InvalidArgument(
            "presigned URLs cannot carry a byte range".to_string(),
        ));
    }
    resolve_expiry(spec.expiry)
}

fn resolve_expiry(expiry: Option<Duration>) -> StorageResult<Duration> {
    match expiry {
        None => Ok(DEFAULT_PRESIGN_EXPIRY),
        Some(e) if e.as_secs() == 0 => Err(StorageError::InvalidArgument(
            "presigned URL expiry must be at least one second".to_string(),
        )),
        Some(e) if e > MAX_PRESIGN_EXPIRY => Err(StorageError::InvalidArgument(format!(
            "presigned URL expiry {}s exceeds the maximum of {}s",
            e.as_secs(),
            MAX_PRESIGN_EXPIRY.as_secs()
        ))),
        Some(e) => Ok(e),
    }
}
