/*!
 * Stowage - facade over S3-compatible object storage
 *
 * - Connection provider with lazily built, shared client
 * - Bucket operations, sub-resources and notification long-polls
 * - Object reads, streamed multipart writes, batch delete and compose
 * - Presigned GET URLs
 * - TOML and environment configuration
 */

pub mod bucket;
pub mod bucket_config;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod object;
pub mod provider;
pub mod types;

// Re-export commonly used types
pub use bucket::BucketFacade;
pub use client::{S3StorageClient, StorageClient, StorageHandle};
pub use config::{ConnectionConfig, ConnectionConfigBuilder, StorageProperties};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use notification::NotificationSubscription;
pub use object::ObjectFacade;
pub use provider::ConnectionProvider;
pub use types::{
    BucketRef, ByteRange, ComposeSource, DeleteBatchResult, ObjectDescriptor, ObjectSize,
    PresignedUrlSpec, ServerSideEncryption, UploadSpec,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
