//! In-memory storage client for unit tests
//!
//! Records every call so tests can assert call counts (and the absence of
//! calls), and supports one-shot failure injection per operation.

use super::{NotificationStream, StorageClient, StorageHandle};
use crate::bucket_config::{
    BucketPolicy, BucketTags, LifecycleConfiguration, NotificationConfiguration, SseConfiguration,
};
use crate::error::{StorageError, StorageResult};
use crate::types::{
    BucketInfo, BucketRef, ByteSource, ComposeSource, DeleteFailure, ListPage, NotificationFilter,
    NotificationRecord, ObjectDescriptor, ObjectMetadata, ObjectStream, ObjectSummary, PutOptions,
    ServerSideEncryption, UploadedPart, WriteReceipt,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub target: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
struct MemObject {
    data: Bytes,
    content_type: String,
    user_metadata: HashMap<String, String>,
    etag: String,
    version_id: String,
    sse: Option<ServerSideEncryption>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemBucket {
    created: Option<DateTime<Utc>>,
    object_lock: bool,
    objects: BTreeMap<String, MemObject>,
    encryption: Option<SseConfiguration>,
    lifecycle: Option<LifecycleConfiguration>,
    notification: NotificationConfiguration,
    policy: Option<String>,
    tags: Option<BucketTags>,
}

#[derive(Debug)]
struct MemUpload {
    bucket: String,
    key: String,
    options: PutOptions,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, MemBucket>,
    uploads: HashMap<String, MemUpload>,
    counter: u64,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<StorageError>>,
    delete_failures: HashMap<String, DeleteFailure>,
    stray_delete_failures: Vec<DeleteFailure>,
    notifications: Vec<NotificationRecord>,
    page_size: Option<usize>,
}

/// In-memory [`StorageClient`]
#[derive(Clone, Default)]
pub(crate) struct MemoryClient {
    state: Arc<Mutex<State>>,
    open_listeners: Arc<AtomicUsize>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with the given buckets already present
    pub fn with_buckets(names: &[&str]) -> Self {
        let client = Self::new();
        {
            let mut state = client.state.lock().unwrap();
            for name in names {
                state.buckets.insert(
                    name.to_string(),
                    MemBucket {
                        created: Some(Utc::now()),
                        ..Default::default()
                    },
                );
            }
        }
        client
    }

    pub fn handle(&self) -> StorageHandle {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls_to(op).len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Fail the next call to `op` with `err`
    pub fn fail_next(&self, op: &'static str, err: StorageError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Report `key` as failed in every multi-object delete that includes it
    pub fn fail_delete(&self, key: &str, code: &str, message: &str) {
        self.state.lock().unwrap().delete_failures.insert(
            key.to_string(),
            DeleteFailure {
                key: key.to_string(),
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Report a failure for a key the request never named
    pub fn stray_delete_failure(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .stray_delete_failures
            .push(DeleteFailure {
                key: key.to_string(),
                code: "InternalError".to_string(),
                message: "stray".to_string(),
            });
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = Some(size);
    }

    pub fn push_notification(&self, record: NotificationRecord) {
        self.state.lock().unwrap().notifications.push(record);
    }

    /// Number of notification streams not yet dropped
    pub fn open_listeners(&self) -> usize {
        self.open_listeners.load(Ordering::SeqCst)
    }

    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
    }

    pub fn put_raw(&self, bucket: &str, key: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let (etag, version_id) = state.next_ids();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(
                key.to_string(),
                MemObject {
                    data: Bytes::copy_from_slice(data),
                    content_type: crate::types::DEFAULT_CONTENT_TYPE.to_string(),
                    user_metadata: HashMap::new(),
                    etag,
                    version_id,
                    sse: None,
                    last_modified: Utc::now(),
                },
            );
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    pub fn bucket_has_object_lock(&self, bucket: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .is_some_and(|b| b.object_lock)
    }

    /// Record a call and return any injected failure
    fn record(&self, op: &'static str, target: impl Into<String>, size: Option<u64>) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            op,
            target: target.into(),
            size,
        });
        match state.failures.get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn with_bucket<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemBucket) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut state = self.state.lock().unwrap();
        let bucket = state
            .buckets
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(format!("NoSuchBucket: {}", name)))?;
        f(bucket)
    }

    fn store(
        &self,
        object: &ObjectDescriptor,
        data: Bytes,
        options: &PutOptions,
    ) -> StorageResult<WriteReceipt> {
        let mut state = self.state.lock().unwrap();
        let (etag, version_id) = state.next_ids();
        let bucket = state
            .buckets
            .get_mut(&object.bucket)
            .ok_or_else(|| StorageError::NotFound(format!("NoSuchBucket: {}", object.bucket)))?;
        bucket.objects.insert(
            object.key.clone(),
            MemObject {
                data,
                content_type: options.content_type.clone(),
                user_metadata: options.user_metadata.clone(),
                etag: etag.clone(),
                version_id: version_id.clone(),
                sse: options.sse.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(WriteReceipt {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            etag: Some(etag),
            version_id: Some(version_id),
        })
    }

    fn lookup(&self, object: &ObjectDescriptor) -> StorageResult<MemObject> {
        self.with_bucket(&object.bucket, |bucket| {
            let found = bucket
                .objects
                .get(&object.key)
                .ok_or_else(|| StorageError::NotFound(format!("NoSuchKey: {}", object)))?;
            match &object.version_id {
                Some(v) if *v != found.version_id => {
                    Err(StorageError::NotFound(format!("NoSuchVersion: {}", object)))
                }
                _ => Ok(found.clone()),
            }
        })
    }
}

impl State {
    fn next_ids(&mut self) -> (String, String) {
        self.counter += 1;
        (format!("\"etag-{}\"", self.counter), format!("v{}", self.counter))
    }
}

fn slice(data: &Bytes, first: u64, last: Option<u64>) -> StorageResult<Bytes> {
    let len = data.len() as u64;
    if first >= len {
        return Err(StorageError::InvalidArgument(format!(
            "InvalidRange: offset {} beyond size {}",
            first, len
        )));
    }
    let end = last.map_or(len, |l| (l + 1).min(len));
    Ok(data.slice(first as usize..end as usize))
}

struct ListenerGuard(Arc<AtomicUsize>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn bucket_exists(&self, bucket: &BucketRef) -> StorageResult<bool> {
        self.record("bucket_exists", &bucket.name, None)?;
        Ok(self.state.lock().unwrap().buckets.contains_key(&bucket.name))
    }

    async fn make_bucket(&self, bucket: &BucketRef, object_lock: bool) -> StorageResult<()> {
        self.record("make_bucket", &bucket.name, None)?;
        let mut state = self.state.lock().unwrap();
        if state.buckets.contains_key(&bucket.name) {
            return Err(StorageError::AlreadyExists(bucket.name.clone()));
        }
        state.buckets.insert(
            bucket.name.clone(),
            MemBucket {
                created: Some(Utc::now()),
                object_lock,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("remove_bucket", &bucket.name, None)?;
        let mut state = self.state.lock().unwrap();
        match state.buckets.get(&bucket.name) {
            None => Err(StorageError::NotFound(format!("NoSuchBucket: {}", bucket.name))),
            Some(b) if !b.objects.is_empty() => Err(StorageError::NotEmpty(bucket.name.clone())),
            Some(_) => {
                state.buckets.remove(&bucket.name);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.record("list_buckets", "", None)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .iter()
            .map(|(name, b)| BucketInfo {
                name: name.clone(),
                creation_date: b.created,
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        self.record("list_objects", bucket, None)?;
        let page_size = self.state.lock().unwrap().page_size.unwrap_or(1000);
        let prefix = prefix.unwrap_or("");

        let all = self.with_bucket(bucket, |b| {
            let mut entries = Vec::new();
            let mut dirs = BTreeSet::new();
            for (key, obj) in b.objects.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                let rest = &key[prefix.len()..];
                match rest.find('/') {
                    Some(pos) if !recursive => {
                        dirs.insert(format!("{}{}", prefix, &rest[..=pos]));
                    }
                    _ => entries.push(ObjectSummary {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        etag: Some(obj.etag.clone()),
                        last_modified: Some(obj.last_modified),
                        is_dir: false,
                    }),
                }
            }
            entries.extend(dirs.into_iter().map(|key| ObjectSummary {
                key,
                size: 0,
                etag: None,
                last_modified: None,
                is_dir: true,
            }));
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        })?;

        let remaining: Vec<ObjectSummary> = all
            .into_iter()
            .filter(|e| continuation.as_ref().map_or(true, |t| e.key > *t))
            .collect();
        let more = remaining.len() > page_size;
        let entries: Vec<ObjectSummary> = remaining.into_iter().take(page_size).collect();
        let next_token = if more {
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }

    async fn get_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectStream> {
        self.record("get_object", object.to_string(), None)?;
        let found = self.lookup(object)?;
        let data = match &object.range {
            Some(range) => slice(&found.data, range.offset, range.last_byte()?)?,
            None => found.data.clone(),
        };
        Ok(ObjectStream {
            content_type: Some(found.content_type),
            content_length: Some(data.len() as u64),
            etag: Some(found.etag),
            reader: Box::new(std::io::Cursor::new(data)),
        })
    }

    async fn stat_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectMetadata> {
        self.record("stat_object", object.to_string(), None)?;
        let found = self.lookup(object)?;
        Ok(ObjectMetadata {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            size: found.data.len() as u64,
            content_type: Some(found.content_type),
            etag: Some(found.etag),
            last_modified: Some(found.last_modified),
            user_metadata: found.user_metadata,
            version_id: Some(found.version_id),
            sse: found.sse,
        })
    }

    async fn put_object(
        &self,
        object: &ObjectDescriptor,
        body: ByteSource,
        size: u64,
        options: &PutOptions,
    ) -> StorageResult<WriteReceipt> {
        self.record("put_object", object.to_string(), Some(size))?;
        let mut buf = Vec::new();
        body.take(size).read_to_end(&mut buf).await?;
        if buf.len() as u64 != size {
            return Err(StorageError::Io(format!(
                "stream ended after {} of {} bytes",
                buf.len(),
                size
            )));
        }
        self.store(object, Bytes::from(buf), options)
    }

    async fn create_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        options: &PutOptions,
    ) -> StorageResult<String> {
        self.record("create_multipart_upload", object.to_string(), None)?;
        let mut state = self.state.lock().unwrap();
        if !state.buckets.contains_key(&object.bucket) {
            return Err(StorageError::NotFound(format!("NoSuchBucket: {}", object.bucket)));
        }
        let (_, id) = state.next_ids();
        let upload_id = format!("upload-{}", id);
        state.uploads.insert(
            upload_id.clone(),
            MemUpload {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                options: options.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        self.record("upload_part", object.to_string(), Some(body.len() as u64))?;
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("NoSuchUpload: {}", upload_id)))?;
        upload.parts.insert(part_number, body);
        Ok(UploadedPart {
            part_number,
            etag: format!("\"part-{}\"", part_number),
        })
    }

    async fn upload_part_copy(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        part_number: i32,
        source: &ComposeSource,
        range: Option<(u64, u64)>,
    ) -> StorageResult<UploadedPart> {
        let size = range.map(|(first, last)| last - first + 1);
        self.record("upload_part_copy", object.to_string(), size)?;
        let found = self.lookup(&source.descriptor())?;
        let data = match range {
            Some((first, last)) => slice(&found.data, first, Some(last))?,
            None => found.data.clone(),
        };
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("NoSuchUpload: {}", upload_id)))?;
        upload.parts.insert(part_number, data);
        Ok(UploadedPart {
            part_number,
            etag: format!("\"part-{}\"", part_number),
        })
    }

    async fn complete_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<WriteReceipt> {
        self.record(
            "complete_multipart_upload",
            object.to_string(),
            Some(parts.len() as u64),
        )?;
        let upload = self
            .state
            .lock()
            .unwrap()
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("NoSuchUpload: {}", upload_id)))?;

        let mut data = BytesMut::new();
        for part in parts {
            let body = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::InvalidArgument(format!("InvalidPart: {}", part.part_number))
            })?;
            data.extend_from_slice(body);
        }

        let target = ObjectDescriptor::new(upload.bucket, upload.key);
        self.store(&target, data.freeze(), &upload.options)
    }

    async fn abort_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.record("abort_multipart_upload", object.to_string(), None)?;
        self.state.lock().unwrap().uploads.remove(upload_id);
        Ok(())
    }

    async fn copy_object(
        &self,
        target: &ObjectDescriptor,
        source: &ComposeSource,
    ) -> StorageResult<WriteReceipt> {
        self.record("copy_object", target.to_string(), None)?;
        let found = self.lookup(&source.descriptor())?;
        let options = PutOptions {
            content_type: found.content_type,
            user_metadata: found.user_metadata,
            sse: found.sse,
            ..Default::default()
        };
        self.store(target, found.data, &options)
    }

    async fn remove_object(&self, object: &ObjectDescriptor) -> StorageResult<()> {
        self.record("remove_object", object.to_string(), None)?;
        self.with_bucket(&object.bucket, |bucket| {
            let matches = match (&object.version_id, bucket.objects.get(&object.key)) {
                (Some(v), Some(found)) => found.version_id == *v,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if matches {
                bucket.objects.remove(&object.key);
            }
            Ok(())
        })
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<Vec<DeleteFailure>> {
        self.record("remove_objects", bucket, Some(keys.len() as u64))?;
        let (failing, stray) = {
            let state = self.state.lock().unwrap();
            (state.delete_failures.clone(), state.stray_delete_failures.clone())
        };

        let mut failures = Vec::new();
        self.with_bucket(bucket, |b| {
            for key in keys {
                match failing.get(key) {
                    Some(failure) => failures.push(failure.clone()),
                    None => {
                        b.objects.remove(key);
                    }
                }
            }
            Ok(())
        })?;
        failures.extend(stray);
        Ok(failures)
    }

    async fn presign_get(
        &self,
        object: &ObjectDescriptor,
        expiry: Duration,
    ) -> StorageResult<String> {
        self.record("presign_get", object.to_string(), Some(expiry.as_secs()))?;
        let mut url = format!(
            "http://memory.local/{}/{}?X-Amz-Expires={}",
            object.bucket,
            object.key,
            expiry.as_secs()
        );
        if let Some(version) = &object.version_id {
            url.push_str(&format!("&versionId={}", version));
        }
        Ok(url)
    }

    async fn listen_bucket_notification(
        &self,
        bucket: &BucketRef,
        filter: &NotificationFilter,
    ) -> StorageResult<NotificationStream> {
        self.record(
            "listen_bucket_notification",
            format!("{}?prefix={}&suffix={}", bucket.name, filter.prefix, filter.suffix),
            None,
        )?;
        let queue: VecDeque<NotificationRecord> = self
            .state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|r| {
                r.bucket == bucket.name
                    && r.key.starts_with(&filter.prefix)
                    && r.key.ends_with(&filter.suffix)
            })
            .cloned()
            .collect();

        self.open_listeners.fetch_add(1, Ordering::SeqCst);
        let guard = ListenerGuard(self.open_listeners.clone());

        // After the queued records the stream stays open, like a long-poll.
        Ok(stream::unfold((queue, guard), |(mut queue, guard)| async move {
            match queue.pop_front() {
                Some(record) => Some((Ok(record), (queue, guard))),
                None => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        })
        .boxed())
    }

    async fn get_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<SseConfiguration> {
        self.record("get_bucket_encryption", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.encryption.clone().ok_or_else(|| {
                StorageError::NotFound(format!(
                    "ServerSideEncryptionConfigurationNotFoundError: {}",
                    bucket.name
                ))
            })
        })
    }

    async fn set_bucket_encryption(
        &self,
        bucket: &BucketRef,
        config: &SseConfiguration,
    ) -> StorageResult<()> {
        self.record("set_bucket_encryption", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.encryption = Some(config.clone());
            Ok(())
        })
    }

    async fn delete_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("delete_bucket_encryption", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.encryption = None;
            Ok(())
        })
    }

    async fn get_bucket_lifecycle(
        &self,
        bucket: &BucketRef,
    ) -> StorageResult<LifecycleConfiguration> {
        self.record("get_bucket_lifecycle", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.lifecycle.clone().ok_or_else(|| {
                StorageError::NotFound(format!("NoSuchLifecycleConfiguration: {}", bucket.name))
            })
        })
    }

    async fn set_bucket_lifecycle(
        &self,
        bucket: &BucketRef,
        config: &LifecycleConfiguration,
    ) -> StorageResult<()> {
        self.record("set_bucket_lifecycle", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.lifecycle = Some(config.clone());
            Ok(())
        })
    }

    async fn delete_bucket_lifecycle(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("delete_bucket_lifecycle", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.lifecycle = None;
            Ok(())
        })
    }

    async fn get_bucket_notification(
        &self,
        bucket: &BucketRef,
    ) -> StorageResult<NotificationConfiguration> {
        self.record("get_bucket_notification", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| Ok(b.notification.clone()))
    }

    async fn set_bucket_notification(
        &self,
        bucket: &BucketRef,
        config: &NotificationConfiguration,
    ) -> StorageResult<()> {
        self.record("set_bucket_notification", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.notification = config.clone();
            Ok(())
        })
    }

    async fn delete_bucket_notification(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("delete_bucket_notification", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.notification = NotificationConfiguration::default();
            Ok(())
        })
    }

    async fn get_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<BucketPolicy> {
        self.record("get_bucket_policy", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.policy.clone().ok_or_else(|| {
                StorageError::NotFound(format!("NoSuchBucketPolicy: {}", bucket.name))
            })
        })
    }

    async fn set_bucket_policy(&self, bucket: &BucketRef, policy: &str) -> StorageResult<()> {
        self.record("set_bucket_policy", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.policy = Some(policy.to_string());
            Ok(())
        })
    }

    async fn delete_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("delete_bucket_policy", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.policy = None;
            Ok(())
        })
    }

    async fn get_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<BucketTags> {
        self.record("get_bucket_tags", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.tags
                .clone()
                .ok_or_else(|| StorageError::NotFound(format!("NoSuchTagSet: {}", bucket.name)))
        })
    }

    async fn set_bucket_tags(&self, bucket: &BucketRef, tags: &BucketTags) -> StorageResult<()> {
        self.record("set_bucket_tags", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.tags = Some(tags.clone());
            Ok(())
        })
    }

    async fn delete_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<()> {
        self.record("delete_bucket_tags", &bucket.name, None)?;
        self.with_bucket(&bucket.name, |b| {
            b.tags = None;
            Ok(())
        })
    }
}
