//! Connection provider: owns the connection settings and the lazily built
//! storage handle shared by every facade.

use crate::bucket::BucketFacade;
use crate::client::{S3StorageClient, StorageHandle};
use crate::config::{validate_bucket_name, ConnectionConfig, StorageProperties};
use crate::error::{ErrorKind, StorageError, StorageResult};
use crate::object::ObjectFacade;
use crate::types::BucketRef;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct ConnectionProvider {
    config: ConnectionConfig,
    handle: OnceCell<StorageHandle>,
}

impl ConnectionProvider {
    /// Provider over the S3 client; the client is built on first use
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            handle: OnceCell::new(),
        })
    }

    /// Provider over a pre-built client
    pub fn with_client(config: ConnectionConfig, handle: StorageHandle) -> Arc<Self> {
        Arc::new(Self {
            config,
            handle: OnceCell::new_with(Some(handle)),
        })
    }

    /// Provider from externally supplied properties. Fails with
    /// `Configuration` when endpoint or credentials are missing.
    pub fn from_properties(props: &StorageProperties) -> StorageResult<Arc<Self>> {
        Ok(Self::new(props.connection_config()?))
    }

    /// Build a provider and run the startup bucket checks
    pub async fn initialize(props: &StorageProperties) -> StorageResult<Arc<Self>> {
        let provider = Self::from_properties(props)?;
        provider.run_startup_checks(props).await?;
        Ok(provider)
    }

    /// Verify (and optionally create) the default bucket
    pub async fn run_startup_checks(&self, props: &StorageProperties) -> StorageResult<()> {
        if !props.check_bucket_on_startup && !props.create_bucket_on_startup {
            return Ok(());
        }

        let name = props
            .default_bucket_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                StorageError::Configuration(
                    "default_bucket_name is required when bucket startup checks are enabled"
                        .to_string(),
                )
            })?;
        validate_bucket_name(name)
            .map_err(|e| StorageError::Configuration(format!("default bucket: {}", e)))?;

        let handle = self.handle().await?;
        let scope = BucketRef::new(name);
        if handle.bucket_exists(&scope).await? {
            debug!("Default bucket {} exists", name);
            return Ok(());
        }

        if !props.create_bucket_on_startup {
            return Err(StorageError::Configuration(format!(
                "default bucket '{}' does not exist",
                name
            )));
        }

        match handle.make_bucket(&scope, false).await {
            Ok(()) => {
                info!("Created default bucket {}", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.context(format!("creating default bucket {}", name))),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Shared storage handle. Concurrent first calls build one client.
    pub async fn handle(&self) -> StorageResult<StorageHandle> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                debug!("Connecting to {}", self.config.endpoint_str());
                let client = S3StorageClient::new(self.config.clone()).await?;
                Ok::<StorageHandle, StorageError>(Arc::new(client))
            })
            .await?;
        Ok(handle.clone())
    }

    /// Bucket facade bound to `scope`
    pub fn bucket(self: &Arc<Self>, scope: impl Into<BucketRef>) -> BucketFacade {
        BucketFacade::new(self.clone(), scope.into())
    }

    /// Object facade
    pub fn objects(self: &Arc<Self>) -> ObjectFacade {
        ObjectFacade::new(self.clone())
    }
}

impl fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("config", &self.config)
            .field("connected", &self.handle.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryClient;

    fn config() -> ConnectionConfig {
        ConnectionConfig::builder("localhost:9000", "ak", "sk")
            .secure(false)
            .build()
            .unwrap()
    }

    fn props(check: bool, create: bool, bucket: Option<&str>) -> StorageProperties {
        StorageProperties {
            endpoint: Some("localhost:9000".to_string()),
            access_key: Some("ak".to_string()),
            secret_key: Some(secrecy::SecretString::new("sk".into())),
            check_bucket_on_startup: check,
            create_bucket_on_startup: create,
            default_bucket_name: bucket.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_properties_requires_credentials() {
        let err = ConnectionProvider::from_properties(&StorageProperties::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_handle_is_built_once() {
        let provider = ConnectionProvider::new(config());
        let (a, b) = tokio::join!(provider.handle(), provider.handle());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn test_with_client_uses_injected_handle() {
        let memory = MemoryClient::with_buckets(&["data"]);
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        let handle = provider.handle().await.unwrap();
        assert!(handle.bucket_exists(&BucketRef::new("data")).await.unwrap());
        assert_eq!(memory.call_count("bucket_exists"), 1);
    }

    #[tokio::test]
    async fn test_startup_checks_disabled_make_no_calls() {
        let memory = MemoryClient::new();
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        provider
            .run_startup_checks(&props(false, false, None))
            .await
            .unwrap();
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_startup_check_requires_bucket_name() {
        let memory = MemoryClient::new();
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        let err = provider
            .run_startup_checks(&props(true, false, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_startup_check_missing_bucket_fails() {
        let memory = MemoryClient::new();
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        let err = provider
            .run_startup_checks(&props(true, false, Some("uploads")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(memory.call_count("make_bucket"), 0);
    }

    #[tokio::test]
    async fn test_startup_creates_missing_bucket() {
        let memory = MemoryClient::new();
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        provider
            .run_startup_checks(&props(false, true, Some("uploads")))
            .await
            .unwrap();
        assert_eq!(memory.call_count("make_bucket"), 1);

        // Second run finds it
        provider
            .run_startup_checks(&props(false, true, Some("uploads")))
            .await
            .unwrap();
        assert_eq!(memory.call_count("make_bucket"), 1);
    }

    #[tokio::test]
    async fn test_startup_create_tolerates_race() {
        let memory = MemoryClient::new();
        memory.fail_next(
            "make_bucket",
            StorageError::AlreadyExists("uploads".to_string()),
        );
        let provider = ConnectionProvider::with_client(config(), memory.handle());

        provider
            .run_startup_checks(&props(false, true, Some("uploads")))
            .await
            .unwrap();
    }
}
