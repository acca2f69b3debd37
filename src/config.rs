/*!
 * Connection configuration and the externally-supplied property surface
 */

use crate::error::{StorageError, StorageResult};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Region used for request signing when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Default write timeout in seconds
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 60;

/// Immutable connection settings, validated at construction
#[derive(Clone)]
pub struct ConnectionConfig {
    endpoint: Url,
    access_key: String,
    secret_key: SecretString,
    region: Option<String>,
    secure: bool,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    path_style: bool,
}

impl ConnectionConfig {
    /// Start a builder for the given endpoint and credentials
    pub fn builder(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(endpoint, access_key, secret_key)
    }

    /// Normalised endpoint URL (scheme always present)
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint as passed to the SDK, without a trailing slash
    pub fn endpoint_str(&self) -> &str {
        self.endpoint.as_str().trim_end_matches('/')
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    /// Configured region, if any
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Region used for signing
    pub fn signing_region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn path_style(&self) -> bool {
        self.path_style
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .field("secure", &self.secure)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Builder for [`ConnectionConfig`]
pub struct ConnectionConfigBuilder {
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: Option<String>,
    secure: Option<bool>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    path_style: bool,
}

impl ConnectionConfigBuilder {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: None,
            secure: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            path_style: true,
        }
    }

    /// Set the region used for signing and bucket creation
    pub fn region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.region = if region.is_empty() { None } else { Some(region) };
        self
    }

    /// Scheme used when the endpoint has none. Ignored for endpoints with an
    /// explicit scheme.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Path-style addressing (on by default, required by MinIO)
    pub fn path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> StorageResult<ConnectionConfig> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(StorageError::Configuration(
                "endpoint is required".to_string(),
            ));
        }
        if self.access_key.trim().is_empty() {
            return Err(StorageError::Configuration(
                "access key is required".to_string(),
            ));
        }
        if self.secret_key.is_empty() {
            return Err(StorageError::Configuration(
                "secret key is required".to_string(),
            ));
        }

        let endpoint = parse_endpoint(endpoint, self.secure.unwrap_or(true))?;
        let secure = endpoint.scheme() == "https";

        Ok(ConnectionConfig {
            endpoint,
            access_key: self.access_key,
            secret_key: SecretString::new(self.secret_key.into_boxed_str()),
            region: self.region,
            secure,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            path_style: self.path_style,
        })
    }
}

/// Parse an endpoint, adding a scheme from `secure` when none is given
fn parse_endpoint(endpoint: &str, secure: bool) -> StorageResult<Url> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}", scheme, endpoint)
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        StorageError::Configuration(format!("malformed endpoint '{}': {}", endpoint, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(StorageError::Configuration(format!(
            "endpoint scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(StorageError::Configuration(format!(
            "endpoint '{}' has no host",
            endpoint
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(StorageError::Configuration(format!(
            "endpoint '{}' must not carry a query or fragment",
            endpoint
        )));
    }

    Ok(url)
}

/// Externally supplied storage properties (TOML file and/or environment)
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageProperties {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub secret_key: Option<SecretString>,

    #[serde(default)]
    pub region: Option<String>,

    /// Use https when the endpoint carries no scheme
    #[serde(default)]
    pub secure: bool,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Write timeout in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,

    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Verify the default bucket exists at startup
    #[serde(default)]
    pub check_bucket_on_startup: bool,

    /// Create the default bucket at startup when missing
    #[serde(default)]
    pub create_bucket_on_startup: bool,

    #[serde(default)]
    pub default_bucket_name: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| SecretString::new(v.into_boxed_str())))
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

impl Default for StorageProperties {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
            secure: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            write_timeout: DEFAULT_WRITE_TIMEOUT_SECS,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            check_bucket_on_startup: false,
            create_bucket_on_startup: false,
            default_bucket_name: None,
        }
    }
}

impl fmt::Debug for StorageProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProperties")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("region", &self.region)
            .field("secure", &self.secure)
            .field("connect_timeout", &self.connect_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("check_bucket_on_startup", &self.check_bucket_on_startup)
            .field("create_bucket_on_startup", &self.create_bucket_on_startup)
            .field("default_bucket_name", &self.default_bucket_name)
            .finish()
    }
}

impl StorageProperties {
    /// Load properties from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse properties from TOML text
    pub fn from_toml_str(contents: &str) -> StorageResult<Self> {
        toml::from_str(contents)
            .map_err(|e| StorageError::Configuration(format!("invalid properties: {}", e)))
    }

    /// Overlay `STOWAGE_*` environment variables onto these properties
    pub fn with_env_overrides(self) -> StorageResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STOWAGE_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = lookup("STOWAGE_ACCESS_KEY") {
            self.access_key = Some(v);
        }
        if let Some(v) = lookup("STOWAGE_SECRET_KEY") {
            self.secret_key = Some(SecretString::new(v.into_boxed_str()));
        }
        if let Some(v) = lookup("STOWAGE_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = lookup("STOWAGE_SECURE") {
            self.secure = parse_bool(&v).ok_or_else(|| {
                StorageError::Configuration(format!("STOWAGE_SECURE: not a boolean: {}", v))
            })?;
        }
        if let Some(v) = lookup("STOWAGE_DEFAULT_BUCKET") {
            self.default_bucket_name = Some(v);
        }
        Ok(self)
    }

    /// Build a validated connection configuration
    pub fn connection_config(&self) -> StorageResult<ConnectionConfig> {
        let mut builder = ConnectionConfigBuilder::new(
            self.endpoint.clone().unwrap_or_default(),
            self.access_key.clone().unwrap_or_default(),
            self.secret_key
                .as_ref()
                .map(|s| s.expose_secret().to_string())
                .unwrap_or_default(),
        )
        .secure(self.secure)
        .connect_timeout(Duration::from_secs(self.connect_timeout))
        .read_timeout(Duration::from_secs(self.read_timeout))
        .write_timeout(Duration::from_secs(self.write_timeout));

        if let Some(region) = &self.region {
            builder = builder.region(region.clone());
        }
        builder.build()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate a bucket name (3-63 chars, lowercase letters, digits, `-` and
/// `.`, no `..`, not an IPv4 address, no `xn--` prefix or `-s3alias` suffix)
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    if is_valid_bucket_name(name) {
        Ok(())
    } else {
        Err(StorageError::InvalidArgument(format!(
            "Invalid bucket name: '{}'. Bucket names must be 3-63 characters, \
             lowercase letters, numbers, hyphens, and periods only",
            name
        )))
    }
}

fn is_valid_bucket_name(name: &str) -> bool {
    if !(3..=63).contains(&name.len()) {
        return false;
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }

    if !bytes
        .iter()
        .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return false;
    }

    if name.contains("..") {
        return false;
    }

    // IPv4 form
    if name.split('.').count() == 4 && name.split('.').all(|s| s.parse::<u8>().is_ok()) {
        return false;
    }

    !name.starts_with("xn--") && !name.ends_with("-s3alias")
}
