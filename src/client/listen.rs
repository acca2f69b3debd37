//! Bucket notification long-poll (MinIO `ListenBucketNotification`)
//!
//! The SDK does not model this extension, so the request is signed with
//! `aws-sigv4` and streamed with `reqwest`. The server answers with
//! newline-delimited JSON documents of the form `{"Records":[...]}`,
//! interleaved with blank keep-alive lines.

use super::NotificationStream;
use crate::config::ConnectionConfig;
use crate::error::{StorageError, StorageResult};
use crate::types::{BucketRef, NotificationFilter, NotificationRecord};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use bytes::BytesMut;
use futures::stream::{self, StreamExt, TryStreamExt};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::SystemTime;
use tracing::debug;
use url::Url;

/// Events subscribed to when the caller names none
pub const DEFAULT_EVENTS: [&str; 3] = [
    "s3:ObjectCreated:*",
    "s3:ObjectRemoved:*",
    "s3:ObjectAccessed:*",
];

/// Longest event line accepted before the stream is failed
const MAX_EVENT_LINE: usize = 4 * 1024 * 1024;

/// Open the long-poll and return a lazily decoded record stream
pub(crate) async fn open(
    http: &reqwest::Client,
    config: &ConnectionConfig,
    bucket: &BucketRef,
    filter: &NotificationFilter,
) -> StorageResult<NotificationStream> {
    let url = listen_url(config, bucket, filter)?;
    let region = bucket
        .region
        .as_deref()
        .unwrap_or_else(|| config.signing_region());

    let signed_headers = sign_request(config, region, &url, bucket)?;

    let mut request = http.get(url.clone());
    for (name, value) in &bucket.extra_headers {
        request = request.header(name.as_str(), value.as_str());
    }
    for (name, value) in signed_headers {
        request = request.header(name, value);
    }

    debug!("Listening for notifications on {}", bucket.name);
    let response = request
        .send()
        .await
        .map_err(|e| StorageError::Transient(format!("notification request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let error = parse_error_body(&body);
        return Err(StorageError::from_service(
            error.code.as_deref(),
            error.message.as_deref(),
            Some(status.as_u16()),
        ));
    }

    let bytes = response
        .bytes_stream()
        .map_err(|e| StorageError::Transient(format!("notification stream: {}", e)))
        .boxed();

    Ok(decode_records(bytes).boxed())
}

/// `{endpoint}/{bucket}?prefix=..&suffix=..&events=..`
fn listen_url(
    config: &ConnectionConfig,
    bucket: &BucketRef,
    filter: &NotificationFilter,
) -> StorageResult<Url> {
    let mut url = config.endpoint().clone();
    url.path_segments_mut()
        .map_err(|_| StorageError::Configuration("endpoint cannot be a base URL".to_string()))?
        .pop_if_empty()
        .push(&bucket.name);

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("prefix", &filter.prefix);
        query.append_pair("suffix", &filter.suffix);
        if filter.events.is_empty() {
            for event in DEFAULT_EVENTS {
                query.append_pair("events", event);
            }
        } else {
            for event in &filter.events {
                query.append_pair("events", event);
            }
        }
        for (name, value) in &bucket.extra_query_params {
            query.append_pair(name, value);
        }
    }

    Ok(url)
}

fn sign_request(
    config: &ConnectionConfig,
    region: &str,
    url: &Url,
    bucket: &BucketRef,
) -> StorageResult<Vec<(String, String)>> {
    let signing_failed = |e: &dyn std::fmt::Display| {
        StorageError::Configuration(format!("cannot sign notification request: {}", e))
    };

    let credentials = Credentials::new(
        config.access_key(),
        config.secret_key().expose_secret(),
        None,
        None,
        "stowage-listen",
    );
    let identity = Identity::new(credentials, None);

    let mut settings = SigningSettings::default();
    settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
    settings.percent_encoding_mode = PercentEncodingMode::Single;
    settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name("s3")
        .time(SystemTime::now())
        .settings(settings)
        .build()
        .map_err(|e| signing_failed(&e))?
        .into();

    let signable = SignableRequest::new(
        "GET",
        url.as_str(),
        bucket
            .extra_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
        SignableBody::UnsignedPayload,
    )
    .map_err(|e| signing_failed(&e))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| signing_failed(&e))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

#[derive(Deserialize)]
struct EventDocument {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    event_name: String,
    #[serde(default)]
    event_time: Option<String>,
    s3: EventEntity,
}

#[derive(Deserialize)]
struct EventEntity {
    bucket: EventBucket,
    object: EventObject,
}

#[derive(Deserialize)]
struct EventBucket {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventObject {
    key: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    e_tag: Option<String>,
    #[serde(default)]
    version_id: Option<String>,
}

impl From<EventRecord> for NotificationRecord {
    fn from(record: EventRecord) -> Self {
        NotificationRecord {
            event_name: record.event_name,
            event_time: record.event_time,
            bucket: record.s3.bucket.name,
            key: decode_key(&record.s3.object.key),
            size: record.s3.object.size,
            etag: record.s3.object.e_tag,
            version_id: record.s3.object.version_id,
        }
    }
}

/// Event keys are query-escaped
fn decode_key(key: &str) -> String {
    url::form_urlencoded::parse(key.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_else(|| key.to_string())
}

/// Parse one line; blank lines are keep-alives
fn parse_line(line: &[u8]) -> StorageResult<Vec<NotificationRecord>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    let doc: EventDocument = serde_json::from_slice(line).map_err(|e| StorageError::Unknown {
        code: "MalformedEvent".to_string(),
        message: e.to_string(),
    })?;
    Ok(doc.records.into_iter().map(NotificationRecord::from).collect())
}

struct DecodeState<S> {
    inner: S,
    buf: BytesMut,
    pending: VecDeque<NotificationRecord>,
    done: bool,
}

/// Turn a byte stream into notification records, one JSON document per line
pub(crate) fn decode_records<S>(
    bytes: S,
) -> impl futures::Stream<Item = StorageResult<NotificationRecord>> + Send + 'static
where
    S: futures::Stream<Item = StorageResult<bytes::Bytes>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        inner: bytes,
        buf: BytesMut::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.pending.pop_front() {
                return Some((Ok(record), state));
            }

            if let Some(pos) = state.buf.iter().position(|&b| b == b'\n') {
                let line = state.buf.split_to(pos + 1);
                match parse_line(&line) {
                    Ok(records) => state.pending.extend(records),
                    Err(e) => return Some((Err(e), state)),
                }
                continue;
            }

            if state.done {
                if state.buf.is_empty() {
                    return None;
                }
                let rest = state.buf.split();
                match parse_line(&rest) {
                    Ok(records) => state.pending.extend(records),
                    Err(e) => return Some((Err(e), state)),
                }
                continue;
            }

            if state.buf.len() > MAX_EVENT_LINE {
                state.done = true;
                state.buf.clear();
                return Some((
                    Err(StorageError::Unknown {
                        code: "EventTooLarge".to_string(),
                        message: format!("event line exceeds {} bytes", MAX_EVENT_LINE),
                    }),
                    state,
                ));
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => state.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.done = true;
                    state.buf.clear();
                    return Some((Err(e), state));
                }
                None => state.done = true,
            }
        }
    })
}

/// S3 XML error body
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Bodies that are empty or not XML yield no code or message
fn parse_error_body(body: &str) -> ErrorResponse {
    quick_xml::de::from_str(body).unwrap_or_default()
}
