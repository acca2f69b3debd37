//! Storage client seam
//!
//! [`StorageClient`] enumerates exactly the wire operations the facades
//! consume. [`S3StorageClient`] implements it over `aws-sdk-s3`; tests use an
//! in-memory implementation.

use crate::bucket_config::{
    BucketPolicy, BucketTags, LifecycleConfiguration, NotificationConfiguration, SseConfiguration,
};
use crate::error::StorageResult;
use crate::types::{
    BucketInfo, BucketRef, ByteSource, ComposeSource, DeleteFailure, ListPage,
    NotificationFilter, NotificationRecord, ObjectDescriptor, ObjectMetadata, ObjectStream,
    PutOptions, UploadedPart, WriteReceipt,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

mod listen;
mod s3;

#[cfg(test)]
pub(crate) mod memory;

pub use s3::S3StorageClient;

/// Shared handle to a storage client
pub type StorageHandle = Arc<dyn StorageClient>;

/// Stream of bucket notification records
pub type NotificationStream = BoxStream<'static, StorageResult<NotificationRecord>>;

/// Maximum number of keys per multi-object delete request
pub const MAX_DELETE_BATCH: usize = 1000;

/// Operations consumed from the object-storage service
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &BucketRef) -> StorageResult<bool>;

    async fn make_bucket(&self, bucket: &BucketRef, object_lock: bool) -> StorageResult<()>;

    async fn remove_bucket(&self, bucket: &BucketRef) -> StorageResult<()>;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>>;

    /// One page of a listing. Non-recursive listings use `/` as delimiter and
    /// report common prefixes as directory entries.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<String>,
    ) -> StorageResult<ListPage>;

    async fn get_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectStream>;

    async fn stat_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectMetadata>;

    /// Single bounded upload of exactly `size` bytes read from `body`
    async fn put_object(
        &self,
        object: &ObjectDescriptor,
        body: ByteSource,
        size: u64,
        options: &PutOptions,
    ) -> StorageResult<WriteReceipt>;

    /// Start a multipart upload, returning its upload id
    async fn create_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        options: &PutOptions,
    ) -> StorageResult<String>;

    async fn upload_part(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart>;

    /// Copy `source` (optionally the inclusive byte range `range`) into a part
    async fn upload_part_copy(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        part_number: i32,
        source: &ComposeSource,
        range: Option<(u64, u64)>,
    ) -> StorageResult<UploadedPart>;

    async fn complete_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<WriteReceipt>;

    async fn abort_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
    ) -> StorageResult<()>;

    async fn copy_object(
        &self,
        target: &ObjectDescriptor,
        source: &ComposeSource,
    ) -> StorageResult<WriteReceipt>;

    async fn remove_object(&self, object: &ObjectDescriptor) -> StorageResult<()>;

    /// Multi-object delete of at most [`MAX_DELETE_BATCH`] keys. Returns the
    /// per-key failures reported by the server.
    async fn remove_objects(&self, bucket: &str, keys: &[String])
        -> StorageResult<Vec<DeleteFailure>>;

    async fn presign_get(&self, object: &ObjectDescriptor, expiry: Duration)
        -> StorageResult<String>;

    async fn listen_bucket_notification(
        &self,
        bucket: &BucketRef,
        filter: &NotificationFilter,
    ) -> StorageResult<NotificationStream>;

    async fn get_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<SseConfiguration>;

    async fn set_bucket_encryption(
        &self,
        bucket: &BucketRef,
        config: &SseConfiguration,
    ) -> StorageResult<()>;

    async fn delete_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<()>;

    async fn get_bucket_lifecycle(&self, bucket: &BucketRef)
        -> StorageResult<LifecycleConfiguration>;

    async fn set_bucket_lifecycle(
        &self,
        bucket: &BucketRef,
        config: &LifecycleConfiguration,
    ) -> StorageResult<()>;

    async fn delete_bucket_lifecycle(&self, bucket: &BucketRef) -> StorageResult<()>;

    async fn get_bucket_notification(
        &self,
        bucket: &BucketRef,
    ) -> StorageResult<NotificationConfiguration>;

    async fn set_bucket_notification(
        &self,
        bucket: &BucketRef,
        config: &NotificationConfiguration,
    ) -> StorageResult<()>;

    async fn delete_bucket_notification(&self, bucket: &BucketRef) -> StorageResult<()>;

    async fn get_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<BucketPolicy>;

    async fn set_bucket_policy(&self, bucket: &BucketRef, policy: &str) -> StorageResult<()>;

    async fn delete_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<()>;

    async fn get_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<BucketTags>;

    async fn set_bucket_tags(&self, bucket: &BucketRef, tags: &BucketTags) -> StorageResult<()>;

    async fn delete_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<()>;
}
