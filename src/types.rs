//! Value types shared by the facades and the storage client

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Boxed byte source used for uploads and downloads
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;

/// Default content type for uploads that do not specify one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default presigned URL lifetime (7 days)
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Maximum presigned URL lifetime accepted by SigV4 (7 days)
pub const MAX_PRESIGN_EXPIRY: Duration = DEFAULT_PRESIGN_EXPIRY;

/// Server-side encryption applied to an object or a bucket default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerSideEncryption {
    /// SSE-S3 (AES-256, server-managed keys)
    Aes256,

    /// SSE-KMS
    Kms {
        /// KMS key id (server default if not set)
        key_id: Option<String>,
        /// Encryption context as sent on the wire (base64-encoded JSON)
        context: Option<String>,
    },
}

impl ServerSideEncryption {
    /// Convert to AWS SDK server-side encryption
    pub fn to_aws(&self) -> aws_sdk_s3::types::ServerSideEncryption {
        match self {
            ServerSideEncryption::Aes256 => aws_sdk_s3::types::ServerSideEncryption::Aes256,
            ServerSideEncryption::Kms { .. } => aws_sdk_s3::types::ServerSideEncryption::AwsKms,
        }
    }

    /// KMS key id, if any
    pub fn kms_key_id(&self) -> Option<&str> {
        match self {
            ServerSideEncryption::Kms { key_id, .. } => key_id.as_deref(),
            ServerSideEncryption::Aes256 => None,
        }
    }
}

/// Bucket scope for bucket-level operations.
///
/// Region, SSE, extra headers and extra query parameters travel with every
/// request issued through a [`crate::BucketFacade`] bound to this scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketRef {
    pub name: String,
    pub region: Option<String>,
    pub sse: Option<ServerSideEncryption>,
    pub extra_headers: HashMap<String, String>,
    pub extra_query_params: HashMap<String, String>,
}

impl BucketRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn sse(mut self, sse: ServerSideEncryption) -> Self {
        self.sse = Some(sse);
        self
    }

    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    pub fn extra_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query_params.insert(name.into(), value.into());
        self
    }

    pub fn extra_query_params(mut self, params: HashMap<String, String>) -> Self {
        self.extra_query_params.extend(params);
        self
    }
}

impl From<&str> for BucketRef {
    fn from(name: &str) -> Self {
        BucketRef::new(name)
    }
}

impl From<String> for BucketRef {
    fn from(name: String) -> Self {
        BucketRef::new(name)
    }
}

/// Byte range within an object: `length == None` reads to the end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    /// Inclusive last byte, if the range is bounded
    pub fn last_byte(&self) -> StorageResult<Option<u64>> {
        match self.length {
            None => Ok(None),
            Some(0) => Err(StorageError::InvalidArgument(format!(
                "range at offset {} has zero length",
                self.offset
            ))),
            Some(len) => self
                .offset
                .checked_add(len - 1)
                .map(Some)
                .ok_or_else(|| StorageError::InvalidArgument("range overflows u64".to_string())),
        }
    }

    /// HTTP `Range` header value
    pub fn header_value(&self) -> StorageResult<String> {
        Ok(match self.last_byte()? {
            Some(last) => format!("bytes={}-{}", self.offset, last),
            None => format!("bytes={}-", self.offset),
        })
    }
}

/// Names an object, optionally a specific version and byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub range: Option<ByteRange>,
}

impl ObjectDescriptor {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
            range: None,
        }
    }

    pub fn version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    /// A key ending with `/` denotes a directory placeholder
    pub fn is_directory(&self) -> bool {
        self.key.ends_with('/')
    }
}

impl fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)?;
        if let Some(version) = &self.version_id {
            write!(f, "?versionId={}", version)?;
        }
        Ok(())
    }
}

/// Declared size of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSize {
    Known(u64),
    Unknown,
}

/// Request options carried by single PUTs and multipart creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub user_metadata: HashMap<String, String>,
    pub sse: Option<ServerSideEncryption>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headers: HashMap::new(),
            user_metadata: HashMap::new(),
            sse: None,
        }
    }
}

/// Everything needed to write one object
pub struct UploadSpec {
    pub source: ByteSource,
    pub size: ObjectSize,
    pub part_size: Option<u64>,
    pub options: PutOptions,
}

impl UploadSpec {
    pub fn new(source: impl AsyncRead + Unpin + Send + 'static, size: ObjectSize) -> Self {
        Self {
            source: Box::new(source),
            size,
            part_size: None,
            options: PutOptions::default(),
        }
    }

    /// Upload an in-memory buffer of known size
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::new(std::io::Cursor::new(data), ObjectSize::Known(len))
    }

    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.options.content_type = content_type.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name.into(), value.into());
        self
    }

    pub fn user_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.user_metadata.insert(name.into(), value.into());
        self
    }

    pub fn sse(mut self, sse: ServerSideEncryption) -> Self {
        self.options.sse = Some(sse);
        self
    }
}

impl fmt::Debug for UploadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSpec")
            .field("size", &self.size)
            .field("part_size", &self.part_size)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// Object metadata as reported by a stat call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub user_metadata: HashMap<String, String>,
    pub version_id: Option<String>,
    pub sse: Option<ServerSideEncryption>,
}

/// Streaming object body
pub struct ObjectStream {
    pub reader: ByteSource,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
}

impl ObjectStream {
    /// Read the whole body into memory
    pub async fn into_bytes(mut self) -> StorageResult<Bytes> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("etag", &self.etag)
            .finish_non_exhaustive()
    }
}

/// Per-object failure reported by a batch delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Outcome for one key of a batch delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(String),
    Failed(DeleteFailure),
}

impl DeleteOutcome {
    pub fn key(&self) -> &str {
        match self {
            DeleteOutcome::Deleted(key) => key,
            DeleteOutcome::Failed(failure) => &failure.key,
        }
    }
}

/// Batch delete outcomes, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteBatchResult {
    pub outcomes: Vec<DeleteOutcome>,
}

impl DeleteBatchResult {
    pub fn failures(&self) -> impl Iterator<Item = &DeleteFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            DeleteOutcome::Failed(f) => Some(f),
            DeleteOutcome::Deleted(_) => None,
        })
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures().map(|f| f.key.as_str()).collect()
    }

    pub fn deleted_keys(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                DeleteOutcome::Deleted(key) => Some(key.as_str()),
                DeleteOutcome::Failed(_) => None,
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }
}

/// HTTP method of a presigned URL. Only GET is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresignMethod {
    #[default]
    Get,
}

/// Request for a presigned URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrlSpec {
    pub object: ObjectDescriptor,
    pub method: PresignMethod,
    pub expiry: Option<Duration>,
}

impl PresignedUrlSpec {
    pub fn get(object: ObjectDescriptor) -> Self {
        Self {
            object,
            method: PresignMethod::Get,
            expiry: None,
        }
    }

    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// One source of a server-side compose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSource {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub range: Option<ByteRange>,
}

impl ComposeSource {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
            range: None,
        }
    }

    pub fn version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    pub(crate) fn descriptor(&self) -> ObjectDescriptor {
        ObjectDescriptor {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            version_id: self.version_id.clone(),
            range: None,
        }
    }

    /// `x-amz-copy-source` value (key percent-encoded)
    pub fn copy_source(&self) -> String {
        let key = encode_key(&self.key);
        match &self.version_id {
            Some(version) => format!("{}/{}?versionId={}", self.bucket, key, version),
            None => format!("{}/{}", self.bucket, key),
        }
    }
}

/// Percent-encode each `/`-separated segment of an object key
fn encode_key(key: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return key.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().extend(key.split('/'));
    }
    url.path().trim_start_matches('/').to_string()
}

impl From<ObjectDescriptor> for ComposeSource {
    fn from(object: ObjectDescriptor) -> Self {
        Self {
            bucket: object.bucket,
            key: object.key,
            version_id: object.version_id,
            range: object.range,
        }
    }
}

/// Receipt for one uploaded or copied part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Bucket as reported by list-buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Listing entry: an object, or a common prefix when `is_dir` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// Filter for a bucket notification subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub prefix: String,
    pub suffix: String,
    pub events: Vec<String>,
}

/// One bucket event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub event_name: String,
    pub event_time: Option<String>,
    pub bucket: String,
    pub key: String,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange::new(0, 10).header_value().unwrap(), "bytes=0-9");
        assert_eq!(ByteRange::new(100, 1).header_value().unwrap(), "bytes=100-100");
        assert_eq!(ByteRange::from_offset(42).header_value().unwrap(), "bytes=42-");
    }

    #[test]
    fn test_zero_length_range_rejected() {
        let err = ByteRange::new(5, 0).header_value().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_directory_descriptor() {
        assert!(ObjectDescriptor::new("b", "photos/").is_directory());
        assert!(!ObjectDescriptor::new("b", "photos").is_directory());
    }

    #[test]
    fn test_descriptor_display() {
        let d = ObjectDescriptor::new("bucket", "a/b.txt").version("v1");
        assert_eq!(d.to_string(), "bucket/a/b.txt?versionId=v1");
    }

    #[test]
    fn test_copy_source() {
        assert_eq!(ComposeSource::new("b", "k").copy_source(), "b/k");
        assert_eq!(
            ComposeSource::new("b", "k").version("3").copy_source(),
            "b/k?versionId=3"
        );
        assert_eq!(
            ComposeSource::new("b", "dir/my file?.txt").copy_source(),
            "b/dir/my%20file%3F.txt"
        );
    }

    #[test]
    fn test_upload_spec_defaults() {
        let spec = UploadSpec::from_bytes(&b"hello"[..]);
        assert_eq!(spec.size, ObjectSize::Known(5));
        assert_eq!(spec.part_size, None);
        assert_eq!(spec.options.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_delete_batch_result_accessors() {
        let result = DeleteBatchResult {
            outcomes: vec![
                DeleteOutcome::Deleted("a".to_string()),
                DeleteOutcome::Failed(DeleteFailure {
                    key: "b".to_string(),
                    code: "AccessDenied".to_string(),
                    message: "denied".to_string(),
                }),
                DeleteOutcome::Deleted("c".to_string()),
            ],
        };

        assert_eq!(result.deleted_keys(), vec!["a", "c"]);
        assert_eq!(result.failed_keys(), vec!["b"]);
        assert!(!result.all_succeeded());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_sse_to_aws() {
        assert_eq!(
            ServerSideEncryption::Aes256.to_aws(),
            aws_sdk_s3::types::ServerSideEncryption::Aes256
        );
        let kms = ServerSideEncryption::Kms {
            key_id: Some("key-1".to_string()),
            context: None,
        };
        assert_eq!(kms.to_aws(), aws_sdk_s3::types::ServerSideEncryption::AwsKms);
        assert_eq!(kms.kms_key_id(), Some("key-1"));
    }

    #[tokio::test]
    async fn test_object_stream_into_bytes() {
        let stream = ObjectStream {
            reader: Box::new(std::io::Cursor::new(Bytes::from_static(b"payload"))),
            content_type: Some("text/plain".to_string()),
            content_length: Some(7),
            etag: None,
        };
        assert_eq!(stream.into_bytes().await.unwrap(), Bytes::from_static(b"payload"));
    }
}
