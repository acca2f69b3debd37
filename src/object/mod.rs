/*!
 * Object facade: reads, writes, removal, composition and presigning
 */

mod batch;
mod compose;
mod presign;
mod upload;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{StorageClient, StorageHandle};
use crate::config::validate_bucket_name;
use crate::error::{ErrorKind, StorageError, StorageResult};
use crate::provider::ConnectionProvider;
use crate::types::{
    BucketInfo, BucketRef, ComposeSource, DeleteBatchResult, ObjectDescriptor, ObjectMetadata,
    ObjectSize, ObjectStream, ObjectSummary, PresignedUrlSpec, PutOptions, UploadSpec,
    WriteReceipt,
};

/// Minimum size of every multipart part except the last (5 MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum size of a single part or single PUT (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts in a multipart upload
pub const MAX_PARTS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ObjectFacade {
    provider: Arc<ConnectionProvider>,
}

impl ObjectFacade {
    pub(crate) fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }

    async fn client(&self) -> StorageResult<StorageHandle> {
        self.provider.handle().await
    }

    /// Create `name` unless it exists. Losing a creation race is success.
    pub async fn create_bucket_if_absent(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name)?;
        let client = self.client().await?;
        let scope = BucketRef::new(name);

        if client.bucket_exists(&scope).await? {
            debug!("Bucket {} already exists", name);
            return Ok(());
        }

        match client.make_bucket(&scope, false).await {
            Ok(()) => {
                info!("Created bucket {}", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Bucket {} created concurrently", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.client().await?.list_buckets().await
    }

    /// Bucket info for `name`, or `None` if it does not exist
    pub async fn get_bucket(&self, name: &str) -> StorageResult<Option<BucketInfo>> {
        validate_bucket_name(name)?;
        let buckets = self.list_buckets().await?;
        Ok(buckets.into_iter().find(|b| b.name == name))
    }

    pub async fn remove_bucket(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name)?;
        self.client()
            .await?
            .remove_bucket(&BucketRef::new(name))
            .await?;
        info!("Removed bucket {}", name);
        Ok(())
    }

    /// Every entry under `prefix`, following continuation tokens to the end.
    /// A non-recursive listing reports common prefixes as directories.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
    ) -> StorageResult<Vec<ObjectSummary>> {
        let client = self.client().await?;
        let mut entries = Vec::new();
        let mut token = None;

        loop {
            let page = client
                .list_objects(bucket, prefix, recursive, token.take())
                .await?;
            entries.extend(page.entries);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!("Listed {} entries in {}", entries.len(), bucket);
        Ok(entries)
    }

    /// Object content, optionally a version and/or byte range
    pub async fn get(&self, object: &ObjectDescriptor) -> StorageResult<ObjectStream> {
        if let Some(range) = &object.range {
            range.last_byte()?;
        }
        self.client().await?.get_object(object).await
    }

    pub async fn stat(&self, object: &ObjectDescriptor) -> StorageResult<ObjectMetadata> {
        self.client().await?.stat_object(object).await
    }

    /// Write an object. Known sizes up to 5 GiB go up in one bounded request;
    /// unknown sizes are streamed as a multipart upload of `part_size` parts
    /// (5 MiB to 5 GiB).
    pub async fn put(&self, object: &ObjectDescriptor, spec: UploadSpec) -> StorageResult<WriteReceipt> {
        upload::check_target(object)?;
        match spec.size {
            ObjectSize::Known(len) => upload::validate_known_size(len)?,
            ObjectSize::Unknown => {
                upload::validate_part_size(spec.part_size)?;
            }
        }
        let client = self.client().await?;
        upload::put(client.as_ref(), object, spec).await
    }

    pub async fn put_known_size(
        &self,
        object: &ObjectDescriptor,
        source: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        size: u64,
        content_type: &str,
    ) -> StorageResult<WriteReceipt> {
        let spec = UploadSpec::new(source, ObjectSize::Known(size)).content_type(content_type);
        self.put(object, spec).await
    }

    pub async fn put_unknown_size(
        &self,
        object: &ObjectDescriptor,
        source: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        part_size: u64,
        content_type: &str,
    ) -> StorageResult<WriteReceipt> {
        let spec = UploadSpec::new(source, ObjectSize::Unknown)
            .part_size(part_size)
            .content_type(content_type);
        self.put(object, spec).await
    }

    /// Create a directory marker: a zero-length object whose name ends in `/`
    pub async fn mkdir(&self, bucket: &str, name: &str) -> StorageResult<WriteReceipt> {
        if !name.ends_with('/') {
            return Err(StorageError::ObjectNameFormat(format!(
                "directory name '{}' must end with '/'",
                name
            )));
        }
        let object = ObjectDescriptor::new(bucket, name);
        self.client()
            .await?
            .put_object(&object, Box::new(tokio::io::empty()), 0, &PutOptions::default())
            .await
    }

    /// Remove an object. Removing a missing key succeeds.
    pub async fn remove(&self, object: &ObjectDescriptor) -> StorageResult<()> {
        self.client().await?.remove_object(object).await
    }

    pub async fn remove_versioned(&self, bucket: &str, key: &str, version_id: &str) -> StorageResult<()> {
        self.remove(&ObjectDescriptor::new(bucket, key).version(version_id))
            .await
    }

    /// Remove many keys. Per-key failures are returned, not raised.
    pub async fn remove_batch(&self, bucket: &str, keys: &[String]) -> StorageResult<DeleteBatchResult> {
        if keys.is_empty() {
            return Ok(DeleteBatchResult::default());
        }
        let client = self.client().await?;
        batch::remove_batch(client.as_ref(), bucket, keys).await
    }

    /// Server-side concatenation of `sources` into `target`
    pub async fn compose(
        &self,
        target: &ObjectDescriptor,
        sources: &[ComposeSource],
    ) -> StorageResult<WriteReceipt> {
        compose::check_request(target, sources)?;
        let client = self.client().await?;
        compose::compose(client.as_ref(), target, sources).await
    }

    pub async fn presigned_url(&self, spec: &PresignedUrlSpec) -> StorageResult<String> {
        let expiry = presign::validate(spec)?;
        self.client()
            .await?
            .presign_get(&spec.object, expiry)
            .await
    }
}

/// Abort a multipart upload after a failure. Abort errors are logged only.
pub(crate) async fn abort_quietly(client: &dyn StorageClient, object: &ObjectDescriptor, upload_id: &str) {
    match client.abort_multipart_upload(object, upload_id).await {
        Ok(()) => debug!("Aborted multipart upload {} for {}", upload_id, object),
        Err(e) => warn!(
            "Failed to abort multipart upload {} for {}: {}",
            upload_id, object, e
        ),
    }
}
