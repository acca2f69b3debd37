//! Bucket sub-resource representations: default encryption, lifecycle,
//! notification, policy and tags.

use crate::types::ServerSideEncryption;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bucket policy document (JSON)
pub type BucketPolicy = String;

/// Bucket tag set
pub type BucketTags = HashMap<String, String>;

/// Default server-side encryption for new objects in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseConfiguration {
    pub rule: ServerSideEncryption,
}

impl SseConfiguration {
    pub fn aes256() -> Self {
        Self {
            rule: ServerSideEncryption::Aes256,
        }
    }

    pub fn kms(key_id: Option<String>) -> Self {
        Self {
            rule: ServerSideEncryption::Kms {
                key_id,
                context: None,
            },
        }
    }
}

/// One lifecycle rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub enabled: bool,
    /// Days after creation before current versions expire
    #[serde(default)]
    pub expiration_days: Option<i32>,
    /// Days after becoming noncurrent before old versions expire
    #[serde(default)]
    pub noncurrent_expiration_days: Option<i32>,
}

impl LifecycleRule {
    /// Enabled rule expiring objects under `prefix` after `days`
    pub fn expire_after(id: impl Into<String>, prefix: Option<String>, days: i32) -> Self {
        Self {
            id: id.into(),
            prefix,
            enabled: true,
            expiration_days: Some(days),
            noncurrent_expiration_days: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfiguration {
    pub rules: Vec<LifecycleRule>,
}

/// Queue (ARN) target for bucket events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    #[serde(default)]
    pub id: Option<String>,
    pub queue_arn: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfiguration {
    pub queues: Vec<QueueConfiguration>,
}

impl NotificationConfiguration {
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
