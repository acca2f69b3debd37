//! `StorageClient` over `aws-sdk-s3`

use super::{listen, NotificationStream, StorageClient};
use crate::bucket_config::{
    BucketPolicy, BucketTags, LifecycleConfiguration, LifecycleRule, NotificationConfiguration,
    QueueConfiguration, SseConfiguration,
};
use crate::config::{ConnectionConfig, DEFAULT_REGION};
use crate::error::{StorageError, StorageResult};
use crate::types::{
    BucketInfo, BucketRef, ByteSource, ComposeSource, DeleteFailure, ListPage, NotificationFilter,
    ObjectDescriptor, ObjectMetadata, ObjectStream, ObjectSummary, PutOptions,
    ServerSideEncryption, UploadedPart, WriteReceipt,
};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::client::customize::CustomizableOperation;
use aws_sdk_s3::config::http::HttpRequest;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::BuildError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types as aws;
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use url::Url;

/// Initial reservation for a single PUT body; the buffer grows as bytes arrive
const PUT_BUFFER_CAPACITY: u64 = 8 * 1024 * 1024;

/// Storage client for AWS S3 and S3-compatible services (MinIO)
#[derive(Clone)]
pub struct S3StorageClient {
    client: AwsS3Client,
    http: reqwest::Client,
    config: ConnectionConfig,
}

impl S3StorageClient {
    /// Build a client from validated connection settings
    pub async fn new(config: ConnectionConfig) -> StorageResult<Self> {
        let client = Self::build_aws_client(&config).await;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StorageError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            config,
        })
    }

    async fn build_aws_client(config: &ConnectionConfig) -> AwsS3Client {
        let region_provider =
            RegionProviderChain::first_try(Region::new(config.signing_region().to_string()));

        let credentials = Credentials::new(
            config.access_key(),
            config.secret_key().expose_secret(),
            None,
            None,
            "stowage-static",
        );

        // Write timeout bounds each request attempt; the SDK has no separate
        // knob for the upload direction.
        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .operation_attempt_timeout(config.write_timeout().max(config.read_timeout()))
            .build();

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials)
            .timeout_config(timeout_config)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(config.endpoint_str())
            .force_path_style(config.path_style())
            .build();

        AwsS3Client::from_conf(s3_config)
    }

    /// Get a reference to the connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a reference to the underlying AWS S3 client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    /// Apply a bucket scope's region override, extra headers and extra query
    /// parameters to a request
    fn scoped<T, E, B>(
        op: CustomizableOperation<T, E, B>,
        bucket: &BucketRef,
    ) -> CustomizableOperation<T, E, B> {
        let mut op = op;
        if let Some(region) = &bucket.region {
            op = op.config_override(
                aws_sdk_s3::config::Builder::default().region(Region::new(region.clone())),
            );
        }
        if !bucket.extra_headers.is_empty() || !bucket.extra_query_params.is_empty() {
            let headers = bucket.extra_headers.clone();
            let params = bucket.extra_query_params.clone();
            op = op.mutate_request(move |req: &mut HttpRequest| {
                add_headers(req, &headers);
                add_query_params(req, &params);
            });
        }
        op
    }

    fn with_headers<T, E, B>(
        op: CustomizableOperation<T, E, B>,
        headers: &HashMap<String, String>,
    ) -> CustomizableOperation<T, E, B> {
        if headers.is_empty() {
            return op;
        }
        let headers = headers.clone();
        op.mutate_request(move |req: &mut HttpRequest| add_headers(req, &headers))
    }

    fn bucket_region<'a>(&'a self, bucket: &'a BucketRef) -> &'a str {
        bucket
            .region
            .as_deref()
            .unwrap_or_else(|| self.config.signing_region())
    }
}

fn add_headers(req: &mut HttpRequest, headers: &HashMap<String, String>) {
    for (name, value) in headers {
        if let Err(e) = req.headers_mut().try_insert(name.clone(), value.clone()) {
            warn!("Skipping invalid header {}: {}", name, e);
        }
    }
}

fn add_query_params(req: &mut HttpRequest, params: &HashMap<String, String>) {
    if params.is_empty() {
        return;
    }
    let mut url = match Url::parse(req.uri()) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot add query parameters to {}: {}", req.uri(), e);
            return;
        }
    };
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
    }
    if let Err(e) = req.set_uri(url.to_string()) {
        warn!("Cannot rewrite request URI: {}", e);
    }
}

fn build_error(e: BuildError) -> StorageError {
    StorageError::InvalidArgument(format!("Invalid request: {}", e))
}

fn to_chrono(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn range_header(object: &ObjectDescriptor) -> StorageResult<Option<String>> {
    object.range.as_ref().map(|r| r.header_value()).transpose()
}

fn sse_from_aws(
    sse: Option<&aws::ServerSideEncryption>,
    kms_key_id: Option<&str>,
) -> Option<ServerSideEncryption> {
    match sse? {
        aws::ServerSideEncryption::Aes256 => Some(ServerSideEncryption::Aes256),
        aws::ServerSideEncryption::AwsKms | aws::ServerSideEncryption::AwsKmsDsse => {
            Some(ServerSideEncryption::Kms {
                key_id: kms_key_id.map(str::to_string),
                context: None,
            })
        }
        _ => None,
    }
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn bucket_exists(&self, bucket: &BucketRef) -> StorageResult<bool> {
        let op = self.client.head_bucket().bucket(&bucket.name).customize();
        match Self::scoped(op, bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = StorageError::from(e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn make_bucket(&self, bucket: &BucketRef, object_lock: bool) -> StorageResult<()> {
        let region = self.bucket_region(bucket);
        let mut req = self.client.create_bucket().bucket(&bucket.name);
        if region != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                aws::CreateBucketConfiguration::builder()
                    .location_constraint(aws::BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        if object_lock {
            req = req.object_lock_enabled_for_bucket(true);
        }
        Self::scoped(req.customize(), bucket).send().await?;
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &BucketRef) -> StorageResult<()> {
        let op = self.client.delete_bucket().bucket(&bucket.name).customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let output = self.client.list_buckets().send().await?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketInfo {
                    name: b.name()?.to_string(),
                    creation_date: b.creation_date().and_then(to_chrono),
                })
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
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_delimiter((!recursive).then(|| "/".to_string()))
            .set_continuation_token(continuation)
            .send()
            .await?;

        let mut entries: Vec<ObjectSummary> = output
            .contents()
            .iter()
            .filter_map(|o| {
                Some(ObjectSummary {
                    key: o.key()?.to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                    etag: o.e_tag().map(str::to_string),
                    last_modified: o.last_modified().and_then(to_chrono),
                    is_dir: false,
                })
            })
            .collect();

        entries.extend(output.common_prefixes().iter().filter_map(|p| {
            Some(ObjectSummary {
                key: p.prefix()?.to_string(),
                size: 0,
                etag: None,
                last_modified: None,
                is_dir: true,
            })
        }));

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }

    async fn get_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectStream> {
        let output = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .set_range(range_header(object)?)
            .send()
            .await
            .map_err(|e| StorageError::from(e).for_versioned_read(object))?;

        Ok(ObjectStream {
            content_type: output.content_type().map(str::to_string),
            content_length: output.content_length().map(|l| l.max(0) as u64),
            etag: output.e_tag().map(str::to_string),
            reader: Box::new(output.body.into_async_read()),
        })
    }

    async fn stat_object(&self, object: &ObjectDescriptor) -> StorageResult<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .send()
            .await
            .map_err(|e| {
                StorageError::from(e)
                    .for_versioned_read(object)
                    .context(format!("stat {}", object))
            })?;

        Ok(ObjectMetadata {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(str::to_string),
            etag: response.e_tag().map(str::to_string),
            last_modified: response.last_modified().and_then(to_chrono),
            user_metadata: response.metadata().cloned().unwrap_or_default(),
            version_id: response.version_id().map(str::to_string),
            sse: sse_from_aws(response.server_side_encryption(), response.ssekms_key_id()),
        })
    }

    async fn put_object(
        &self,
        object: &ObjectDescriptor,
        body: ByteSource,
        size: u64,
        options: &PutOptions,
    ) -> StorageResult<WriteReceipt> {
        let mut buf = Vec::with_capacity(size.min(PUT_BUFFER_CAPACITY) as usize);
        body.take(size).read_to_end(&mut buf).await?;
        if buf.len() as u64 != size {
            return Err(StorageError::Io(format!(
                "stream ended after {} of {} bytes",
                buf.len(),
                size
            )));
        }

        let mut req = self
            .client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_type(&options.content_type)
            .content_length(size as i64)
            .body(ByteStream::from(buf));

        if !options.user_metadata.is_empty() {
            req = req.set_metadata(Some(options.user_metadata.clone()));
        }
        if let Some(sse) = &options.sse {
            req = req
                .server_side_encryption(sse.to_aws())
                .set_ssekms_key_id(sse.kms_key_id().map(str::to_string));
            if let ServerSideEncryption::Kms {
                context: Some(ctx), ..
            } = sse
            {
                req = req.ssekms_encryption_context(ctx);
            }
        }

        debug!("PUT {} ({} bytes)", object, size);
        let output = Self::with_headers(req.customize(), &options.headers)
            .send()
            .await?;

        Ok(WriteReceipt {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn create_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        options: &PutOptions,
    ) -> StorageResult<String> {
        let mut req = self
            .client
            .create_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_type(&options.content_type);

        if !options.user_metadata.is_empty() {
            req = req.set_metadata(Some(options.user_metadata.clone()));
        }
        if let Some(sse) = &options.sse {
            req = req
                .server_side_encryption(sse.to_aws())
                .set_ssekms_key_id(sse.kms_key_id().map(str::to_string));
            if let ServerSideEncryption::Kms {
                context: Some(ctx), ..
            } = sse
            {
                req = req.ssekms_encryption_context(ctx);
            }
        }

        let output = Self::with_headers(req.customize(), &options.headers)
            .send()
            .await?;

        output.upload_id().map(str::to_string).ok_or_else(|| {
            StorageError::Unknown {
                code: "MissingUploadId".to_string(),
                message: format!("no upload id returned for {}", object),
            }
        })
    }

    async fn upload_part(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        let len = body.len();
        let output = self
            .client
            .upload_part()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(len as i64)
            .body(ByteStream::from(body))
            .send()
            .await?;

        debug!("Uploaded part {} of {} ({} bytes)", part_number, object, len);
        Ok(UploadedPart {
            part_number,
            etag: output.e_tag().unwrap_or_default().to_string(),
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
        let output = self
            .client
            .upload_part_copy()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .copy_source(source.copy_source())
            .set_copy_source_range(range.map(|(first, last)| format!("bytes={}-{}", first, last)))
            .send()
            .await?;

        Ok(UploadedPart {
            part_number,
            etag: output
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<WriteReceipt> {
        let completed: Vec<aws::CompletedPart> = parts
            .iter()
            .map(|p| {
                aws::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .multipart_upload(
                aws::CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await?;

        Ok(WriteReceipt {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(
        &self,
        object: &ObjectDescriptor,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn copy_object(
        &self,
        target: &ObjectDescriptor,
        source: &ComposeSource,
    ) -> StorageResult<WriteReceipt> {
        let output = self
            .client
            .copy_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .copy_source(source.copy_source())
            .send()
            .await?;

        Ok(WriteReceipt {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            etag: output
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn remove_object(&self, object: &ObjectDescriptor) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .send()
            .await?;
        Ok(())
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<Vec<DeleteFailure>> {
        let identifiers = keys
            .iter()
            .map(|k| aws::ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;

        let delete = aws::Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(build_error)?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await?;

        Ok(output
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                code: e.code().unwrap_or("Unknown").to_string(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn presign_get(
        &self,
        object: &ObjectDescriptor,
        expiry: Duration,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|e| StorageError::InvalidArgument(format!("presign expiry: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .presigned(presigning)
            .await?;

        Ok(request.uri().to_string())
    }

    async fn listen_bucket_notification(
        &self,
        bucket: &BucketRef,
        filter: &NotificationFilter,
    ) -> StorageResult<NotificationStream> {
        listen::open(&self.http, &self.config, bucket, filter).await
    }

    async fn get_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<SseConfiguration> {
        let op = self
            .client
            .get_bucket_encryption()
            .bucket(&bucket.name)
            .customize();
        let output = Self::scoped(op, bucket).send().await?;

        output
            .server_side_encryption_configuration()
            .and_then(|c| c.rules().first())
            .and_then(|r| r.apply_server_side_encryption_by_default())
            .and_then(|d| sse_from_aws(Some(d.sse_algorithm()), d.kms_master_key_id()))
            .map(|rule| SseConfiguration { rule })
            .ok_or_else(|| {
                StorageError::NotFound(format!("no default encryption on {}", bucket.name))
            })
    }

    async fn set_bucket_encryption(
        &self,
        bucket: &BucketRef,
        config: &SseConfiguration,
    ) -> StorageResult<()> {
        let by_default = aws::ServerSideEncryptionByDefault::builder()
            .sse_algorithm(config.rule.to_aws())
            .set_kms_master_key_id(config.rule.kms_key_id().map(str::to_string))
            .build()
            .map_err(build_error)?;
        let sse_config = aws::ServerSideEncryptionConfiguration::builder()
            .rules(
                aws::ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(by_default)
                    .build(),
            )
            .build()
            .map_err(build_error)?;

        let op = self
            .client
            .put_bucket_encryption()
            .bucket(&bucket.name)
            .server_side_encryption_configuration(sse_config)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket_encryption(&self, bucket: &BucketRef) -> StorageResult<()> {
        let op = self
            .client
            .delete_bucket_encryption()
            .bucket(&bucket.name)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn get_bucket_lifecycle(
        &self,
        bucket: &BucketRef,
    ) -> StorageResult<LifecycleConfiguration> {
        let op = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(&bucket.name)
            .customize();
        let output = Self::scoped(op, bucket).send().await?;

        let rules = output
            .rules()
            .iter()
            .map(|r| LifecycleRule {
                id: r.id().unwrap_or_default().to_string(),
                prefix: r
                    .filter()
                    .and_then(|f| f.prefix())
                    .map(str::to_string),
                enabled: r.status() == &aws::ExpirationStatus::Enabled,
                expiration_days: r.expiration().and_then(|e| e.days()),
                noncurrent_expiration_days: r
                    .noncurrent_version_expiration()
                    .and_then(|e| e.noncurrent_days()),
            })
            .collect();

        Ok(LifecycleConfiguration { rules })
    }

    async fn set_bucket_lifecycle(
        &self,
        bucket: &BucketRef,
        config: &LifecycleConfiguration,
    ) -> StorageResult<()> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let status = if rule.enabled {
                    aws::ExpirationStatus::Enabled
                } else {
                    aws::ExpirationStatus::Disabled
                };
                let mut builder = aws::LifecycleRule::builder()
                    .id(&rule.id)
                    .filter(
                        aws::LifecycleRuleFilter::builder()
                            .prefix(rule.prefix.clone().unwrap_or_default())
                            .build(),
                    )
                    .status(status);
                if let Some(days) = rule.expiration_days {
                    builder =
                        builder.expiration(aws::LifecycleExpiration::builder().days(days).build());
                }
                if let Some(days) = rule.noncurrent_expiration_days {
                    builder = builder.noncurrent_version_expiration(
                        aws::NoncurrentVersionExpiration::builder()
                            .noncurrent_days(days)
                            .build(),
                    );
                }
                builder.build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;

        let lifecycle = aws::BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(build_error)?;

        let op = self
            .client
            .put_bucket_lifecycle_configuration()
            .bucket(&bucket.name)
            .lifecycle_configuration(lifecycle)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket_lifecycle(&self, bucket: &BucketRef) -> StorageResult<()> {
        let op = self
            .client
            .delete_bucket_lifecycle()
            .bucket(&bucket.name)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn get_bucket_notification(
        &self,
        bucket: &BucketRef,
    ) -> StorageResult<NotificationConfiguration> {
        let op = self
            .client
            .get_bucket_notification_configuration()
            .bucket(&bucket.name)
            .customize();
        let output = Self::scoped(op, bucket).send().await?;

        let queues = output
            .queue_configurations()
            .iter()
            .map(|q| {
                let rules = q
                    .filter()
                    .and_then(|f| f.key())
                    .map(|k| k.filter_rules())
                    .unwrap_or_default();
                let rule_value = |name: aws::FilterRuleName| {
                    rules
                        .iter()
                        .find(|r| r.name() == Some(&name))
                        .and_then(|r| r.value())
                        .map(str::to_string)
                };
                QueueConfiguration {
                    id: q.id().map(str::to_string),
                    queue_arn: q.queue_arn().to_string(),
                    events: q.events().iter().map(|e| e.as_str().to_string()).collect(),
                    prefix: rule_value(aws::FilterRuleName::Prefix),
                    suffix: rule_value(aws::FilterRuleName::Suffix),
                }
            })
            .collect();

        Ok(NotificationConfiguration { queues })
    }

    async fn set_bucket_notification(
        &self,
        bucket: &BucketRef,
        config: &NotificationConfiguration,
    ) -> StorageResult<()> {
        let queues = config
            .queues
            .iter()
            .map(|q| {
                let mut filter_rules = Vec::new();
                if let Some(prefix) = &q.prefix {
                    filter_rules.push(
                        aws::FilterRule::builder()
                            .name(aws::FilterRuleName::Prefix)
                            .value(prefix)
                            .build(),
                    );
                }
                if let Some(suffix) = &q.suffix {
                    filter_rules.push(
                        aws::FilterRule::builder()
                            .name(aws::FilterRuleName::Suffix)
                            .value(suffix)
                            .build(),
                    );
                }

                let mut builder = aws::QueueConfiguration::builder()
                    .set_id(q.id.clone())
                    .queue_arn(&q.queue_arn)
                    .set_events(Some(
                        q.events.iter().map(|e| aws::Event::from(e.as_str())).collect(),
                    ));
                if !filter_rules.is_empty() {
                    builder = builder.filter(
                        aws::NotificationConfigurationFilter::builder()
                            .key(
                                aws::S3KeyFilter::builder()
                                    .set_filter_rules(Some(filter_rules))
                                    .build(),
                            )
                            .build(),
                    );
                }
                builder.build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;

        let notification = aws::NotificationConfiguration::builder()
            .set_queue_configurations(Some(queues))
            .build();

        let op = self
            .client
            .put_bucket_notification_configuration()
            .bucket(&bucket.name)
            .notification_configuration(notification)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket_notification(&self, bucket: &BucketRef) -> StorageResult<()> {
        // S3 has no delete call for notification configuration; an empty
        // configuration removes every target.
        self.set_bucket_notification(bucket, &NotificationConfiguration::default())
            .await
    }

    async fn get_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<BucketPolicy> {
        let op = self
            .client
            .get_bucket_policy()
            .bucket(&bucket.name)
            .customize();
        let output = Self::scoped(op, bucket).send().await?;

        output
            .policy()
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StorageError::NotFound(format!("no policy on {}", bucket.name)))
    }

    async fn set_bucket_policy(&self, bucket: &BucketRef, policy: &str) -> StorageResult<()> {
        let op = self
            .client
            .put_bucket_policy()
            .bucket(&bucket.name)
            .policy(policy)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &BucketRef) -> StorageResult<()> {
        let op = self
            .client
            .delete_bucket_policy()
            .bucket(&bucket.name)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn get_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<BucketTags> {
        let op = self
            .client
            .get_bucket_tagging()
            .bucket(&bucket.name)
            .customize();
        let output = Self::scoped(op, bucket).send().await?;

        Ok(output
            .tag_set()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect())
    }

    async fn set_bucket_tags(&self, bucket: &BucketRef, tags: &BucketTags) -> StorageResult<()> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| aws::Tag::builder().key(k).value(v).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;
        let tagging = aws::Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(build_error)?;

        let op = self
            .client
            .put_bucket_tagging()
            .bucket(&bucket.name)
            .tagging(tagging)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket_tags(&self, bucket: &BucketRef) -> StorageResult<()> {
        let op = self
            .client
            .delete_bucket_tagging()
            .bucket(&bucket.name)
            .customize();
        Self::scoped(op, bucket).send().await?;
        Ok(())
    }
}
