//! Bucket facade
//!
//! Operations on a single configured bucket. The bucket name is validated
//! locally before every call; region, SSE, extra headers and extra query
//! parameters of the [`BucketRef`] travel with each request.

use crate::bucket_config::{
    BucketPolicy, BucketTags, LifecycleConfiguration, NotificationConfiguration,
    QueueConfiguration, SseConfiguration,
};
use crate::client::StorageHandle;
use crate::config::validate_bucket_name;
use crate::error::{StorageError, StorageResult};
use crate::notification::NotificationSubscription;
use crate::provider::ConnectionProvider;
use crate::types::{BucketInfo, BucketRef, NotificationFilter, ServerSideEncryption};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BucketFacade {
    provider: Arc<ConnectionProvider>,
    scope: BucketRef,
}

impl BucketFacade {
    pub(crate) fn new(provider: Arc<ConnectionProvider>, scope: BucketRef) -> Self {
        Self { provider, scope }
    }

    pub fn scope(&self) -> &BucketRef {
        &self.scope
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.scope = self.scope.region(region);
        self
    }

    pub fn sse(mut self, sse: ServerSideEncryption) -> Self {
        self.scope = self.scope.sse(sse);
        self
    }

    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope = self.scope.extra_header(name, value);
        self
    }

    pub fn extra_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope = self.scope.extra_query_param(name, value);
        self
    }

    /// Validate the bucket name, then resolve the client
    async fn client(&self) -> StorageResult<StorageHandle> {
        validate_bucket_name(&self.scope.name)?;
        self.provider.handle().await
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        let client = self.client().await?;
        client.bucket_exists(&self.scope).await
    }

    pub async fn create(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.make_bucket(&self.scope, false).await?;
        info!("Created bucket {}", self.scope.name);
        Ok(())
    }

    /// Create the bucket with object locking (and therefore versioning) enabled
    pub async fn create_with_object_lock(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.make_bucket(&self.scope, true).await?;
        info!("Created bucket {} with object lock", self.scope.name);
        Ok(())
    }

    /// Remove the bucket. A non-empty bucket fails with `NotEmpty`.
    pub async fn remove(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.remove_bucket(&self.scope).await?;
        info!("Removed bucket {}", self.scope.name);
        Ok(())
    }

    /// All buckets visible to the credentials, not only this one
    pub async fn list(&self) -> StorageResult<Vec<BucketInfo>> {
        let client = self.client().await?;
        client.list_buckets().await
    }

    pub async fn get_encryption(&self) -> StorageResult<SseConfiguration> {
        let client = self.client().await?;
        client.get_bucket_encryption(&self.scope).await
    }

    pub async fn set_encryption(&self, config: &SseConfiguration) -> StorageResult<()> {
        let client = self.client().await?;
        client.set_bucket_encryption(&self.scope, config).await
    }

    pub async fn delete_encryption(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.delete_bucket_encryption(&self.scope).await
    }

    /// Install the scope's SSE descriptor as the bucket default
    pub async fn apply_default_encryption(&self) -> StorageResult<()> {
        let rule = self.scope.sse.clone().ok_or_else(|| {
            StorageError::InvalidArgument(format!(
                "bucket {} has no server-side encryption configured",
                self.scope.name
            ))
        })?;
        self.set_encryption(&SseConfiguration { rule }).await
    }

    pub async fn get_lifecycle(&self) -> StorageResult<LifecycleConfiguration> {
        let client = self.client().await?;
        client.get_bucket_lifecycle(&self.scope).await
    }

    pub async fn set_lifecycle(&self, config: &LifecycleConfiguration) -> StorageResult<()> {
        let client = self.client().await?;
        client.set_bucket_lifecycle(&self.scope, config).await
    }

    pub async fn delete_lifecycle(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.delete_bucket_lifecycle(&self.scope).await
    }

    pub async fn get_notification(&self) -> StorageResult<NotificationConfiguration> {
        let client = self.client().await?;
        client.get_bucket_notification(&self.scope).await
    }

    pub async fn set_notification(&self, config: &NotificationConfiguration) -> StorageResult<()> {
        let client = self.client().await?;
        client.set_bucket_notification(&self.scope, config).await
    }

    pub async fn delete_notification(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.delete_bucket_notification(&self.scope).await
    }

    /// Replace the notification configuration with a single queue target
    pub async fn set_queue_notification(
        &self,
        queue_arn: &str,
        events: &[&str],
        prefix: Option<&str>,
        suffix: Option<&str>,
    ) -> StorageResult<()> {
        if queue_arn.is_empty() {
            return Err(StorageError::InvalidArgument(
                "queue ARN must not be empty".to_string(),
            ));
        }
        if events.is_empty() {
            return Err(StorageError::InvalidArgument(
                "at least one event type is required".to_string(),
            ));
        }

        let config = NotificationConfiguration {
            queues: vec![QueueConfiguration {
                id: None,
                queue_arn: queue_arn.to_string(),
                events: events.iter().map(|e| e.to_string()).collect(),
                prefix: prefix.map(str::to_string),
                suffix: suffix.map(str::to_string),
            }],
        };
        self.set_notification(&config).await
    }

    pub async fn get_policy(&self) -> StorageResult<BucketPolicy> {
        let client = self.client().await?;
        client.get_bucket_policy(&self.scope).await
    }

    pub async fn set_policy(&self, policy: &str) -> StorageResult<()> {
        let client = self.client().await?;
        client.set_bucket_policy(&self.scope, policy).await
    }

    pub async fn delete_policy(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.delete_bucket_policy(&self.scope).await
    }

    pub async fn get_tags(&self) -> StorageResult<BucketTags> {
        let client = self.client().await?;
        client.get_bucket_tags(&self.scope).await
    }

    pub async fn set_tags(&self, tags: &BucketTags) -> StorageResult<()> {
        let client = self.client().await?;
        client.set_bucket_tags(&self.scope, tags).await
    }

    pub async fn delete_tags(&self) -> StorageResult<()> {
        let client = self.client().await?;
        client.delete_bucket_tags(&self.scope).await
    }

    /// Open a notification long-poll. Missing prefix and suffix match
    /// everything; an empty event list listens for the server defaults.
    ///
    /// The subscription holds the connection until it is closed or dropped.
    pub async fn listen_notifications(
        &self,
        prefix: Option<&str>,
        suffix: Option<&str>,
        events: &[&str],
    ) -> StorageResult<NotificationSubscription> {
        let client = self.client().await?;
        let filter = NotificationFilter {
            prefix: prefix.unwrap_or_default().to_string(),
            suffix: suffix.unwrap_or_default().to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
        };
        debug!(
            "Listening on {} (prefix '{}', suffix '{}')",
            self.scope.name, filter.prefix, filter.suffix
        );
        let stream = client
            .listen_bucket_notification(&self.scope, &filter)
            .await?;
        Ok(NotificationSubscription::spawn(stream))
    }
}
