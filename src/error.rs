//! Error types for storage operations

use crate::types::ObjectDescriptor;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the connection provider and the facades
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Missing or invalid connection settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Caller-supplied object name violates a structural rule
    #[error("Object name format error: {0}")]
    ObjectNameFormat(String),

    /// Bucket, object or version does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bucket (or other resource) already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Credentials rejected or insufficient permissions
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Request rejected as malformed, or caller input outside protocol bounds
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bucket still contains objects
    #[error("Bucket not empty: {0}")]
    NotEmpty(String),

    /// Network, timeout or throttling failure
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Unclassified service error
    #[error("Storage service error ({code}): {message}")]
    Unknown { code: String, message: String },

    /// Failure reading a caller-supplied stream
    #[error("I/O error: {0}")]
    Io(String),

    /// Error with added context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StorageError>,
    },
}

/// Classification of a [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ObjectNameFormat,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidArgument,
    NotEmpty,
    Transient,
    Unknown,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::ObjectNameFormat => "object-name-format",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotEmpty => "not-empty",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

impl StorageError {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        StorageError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Kind of this error, looking through any context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Configuration(_) => ErrorKind::Configuration,
            StorageError::ObjectNameFormat(_) => ErrorKind::ObjectNameFormat,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StorageError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StorageError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StorageError::NotEmpty(_) => ErrorKind::NotEmpty,
            StorageError::Transient(_) => ErrorKind::Transient,
            StorageError::Unknown { .. } => ErrorKind::Unknown,
            StorageError::Io(_) => ErrorKind::Io,
            StorageError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Check if the resource was reported missing
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// AWS answers an unknown `versionId` with `400 InvalidArgument` where
    /// MinIO sends `NoSuchVersion`. Reads of a versioned object report both
    /// as not found.
    pub(crate) fn for_versioned_read(self, object: &ObjectDescriptor) -> Self {
        if object.version_id.is_none() {
            return self;
        }
        match self {
            StorageError::InvalidArgument(message)
                if object.range.is_none() || message.to_ascii_lowercase().contains("version") =>
            {
                StorageError::NotFound(message)
            }
            other => other,
        }
    }

    /// Check if the error is transient. Informational only: nothing in this
    /// crate retries.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Io)
    }

    /// Build an error from a service error code, falling back to the HTTP
    /// status when the response carried no code (HEAD requests).
    pub fn from_service(code: Option<&str>, message: Option<&str>, status: Option<u16>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| code.unwrap_or("no error message"))
            .to_string();

        if let Some(code) = code.filter(|c| !c.is_empty()) {
            if let Some(err) = classify_code(code, &message) {
                return err;
            }
            if status.is_none() {
                return StorageError::Unknown {
                    code: code.to_string(),
                    message,
                };
            }
        }

        match status {
            Some(404) => StorageError::NotFound(message),
            Some(401) | Some(403) => StorageError::PermissionDenied(message),
            Some(409) => StorageError::AlreadyExists(message),
            Some(400) | Some(411) | Some(416) => StorageError::InvalidArgument(message),
            Some(408) | Some(429) | Some(500) | Some(502) | Some(503) | Some(504) => {
                StorageError::Transient(message)
            }
            other => StorageError::Unknown {
                code: code
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .or_else(|| other.map(|s| s.to_string()))
                    .unwrap_or_else(|| "Unknown".to_string()),
                message,
            },
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Map an S3 error code to a storage error, if the code is recognised
pub(crate) fn classify_code(code: &str, message: &str) -> Option<StorageError> {
    let message = message.to_string();
    let err = match code {
        "NoSuchKey" | "NoSuchBucket" | "NoSuchVersion" | "NoSuchUpload" | "NotFound"
        | "NoSuchBucketPolicy" | "NoSuchTagSet" | "NoSuchLifecycleConfiguration"
        | "ServerSideEncryptionConfigurationNotFoundError" => StorageError::NotFound(message),
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => StorageError::AlreadyExists(message),
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AllAccessDisabled"
        | "AccountProblem" | "ExpiredToken" => StorageError::PermissionDenied(message),
        "InvalidArgument" | "InvalidRequest" | "InvalidBucketName" | "MalformedXML"
        | "MalformedPolicy" | "EntityTooSmall" | "EntityTooLarge" | "InvalidPart"
        | "InvalidPartOrder" | "InvalidRange" | "KeyTooLongError" | "InvalidObjectName"
        | "XMinioInvalidObjectName" => StorageError::InvalidArgument(message),
        "BucketNotEmpty" => StorageError::NotEmpty(message),
        _ if is_transient_code(code) => StorageError::Transient(message),
        _ => return None,
    };
    Some(err)
}

/// Check if an S3 error code reports a transient condition
pub(crate) fn is_transient_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout"
            | "ServiceUnavailable"
            | "InternalError"
            | "SlowDown"
            | "RequestTimeTooSkewed"
            | "XMinioServerNotInitialized"
    )
}

/// Convert AWS SDK errors to StorageError
impl<E> From<aws_sdk_s3::error::SdkError<E, HttpResponse>> for StorageError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E, HttpResponse>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::ConstructionFailure(e) => {
                StorageError::InvalidArgument(format!("Request construction failed: {:?}", e))
            }
            SdkError::TimeoutError(e) => StorageError::Transient(format!("Timed out: {:?}", e)),
            SdkError::DispatchFailure(e) => {
                StorageError::Transient(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::ResponseError(e) => {
                StorageError::Transient(format!("Response error: {:?}", e))
            }
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                let err = e.err();
                StorageError::from_service(err.code(), err.message(), Some(status))
            }
            other => StorageError::Unknown {
                code: "Sdk".to_string(),
                message: format!("{:?}", other),
            },
        }
    }
}
