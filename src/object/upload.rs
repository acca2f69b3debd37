//! Object upload: single bounded PUT or sequential multipart

use super::{abort_quietly, MAX_PARTS, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::types::{ByteSource, ObjectDescriptor, ObjectSize, PutOptions, UploadSpec, UploadedPart, WriteReceipt};
use bytes::Bytes;
use std::io::Cursor;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Initial buffer reservation when reading a part
const READ_CAPACITY: u64 = 8 * 1024 * 1024;

/// A write target names a whole object, never a version or range
pub(super) fn check_target(object: &ObjectDescriptor) -> StorageResult<()> {
    if object.range.is_some() {
        return Err(StorageError::InvalidArgument(format!(
            "cannot write to a byte range of {}",
            object.key
        )));
    }
    if object.version_id.is_some() {
        return Err(StorageError::InvalidArgument(format!(
            "cannot write to a specific version of {}",
            object.key
        )));
    }
    Ok(())
}

/// A known size goes up in one request, so it is bounded like a single part
pub(super) fn validate_known_size(size: u64) -> StorageResult<()> {
    if size > MAX_PART_SIZE {
        return Err(StorageError::InvalidArgument(format!(
            "object size {} exceeds the single request maximum of {}; upload it with an unknown size and a part size",
            size, MAX_PART_SIZE
        )));
    }
    Ok(())
}

pub(super) fn validate_part_size(part_size: Option<u64>) -> StorageResult<u64> {
    match part_size {
        None => Err(StorageError::InvalidArgument(
            "part size is required when the object size is unknown".to_string(),
        )),
        Some(size) if size < MIN_PART_SIZE => Err(StorageError::InvalidArgument(format!(
            "part size {} is below the minimum of {}",
            size, MIN_PART_SIZE
        ))),
        Some(size) if size > MAX_PART_SIZE => Err(StorageError::InvalidArgument(format!(
            "part size {} exceeds the maximum of {}",
            size, MAX_PART_SIZE
        ))),
        Some(size) => Ok(size),
    }
}

pub(super) async fn put(
    client: &dyn StorageClient,
    object: &ObjectDescriptor,
    spec: UploadSpec,
) -> StorageResult<WriteReceipt> {
    let UploadSpec {
        source,
        size,
        part_size,
        options,
    } = spec;

    match size {
        ObjectSize::Known(len) => {
            validate_known_size(len)?;
            debug!("Uploading {} ({} bytes)", object, len);
            client.put_object(object, source, len, &options).await
        }
        ObjectSize::Unknown => {
            let part_size = validate_part_size(part_size)?;
            put_streamed(client, object, source, part_size, MAX_PARTS, &options).await
        }
    }
}

/// Read up to `part_size` bytes. A short result means the stream ended.
async fn read_part(source: &mut ByteSource, part_size: u64) -> StorageResult<Bytes> {
    let mut buf = Vec::with_capacity(part_size.min(READ_CAPACITY) as usize);
    source.take(part_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn put_streamed(
    client: &dyn StorageClient,
    object: &ObjectDescriptor,
    mut source: ByteSource,
    part_size: u64,
    max_parts: usize,
    options: &PutOptions,
) -> StorageResult<WriteReceipt> {
    let first = read_part(&mut source, part_size).await?;
    if (first.len() as u64) < part_size {
        let len = first.len() as u64;
        debug!("Uploading {} in a single request ({} bytes)", object, len);
        return client
            .put_object(object, Box::new(Cursor::new(first)), len, options)
            .await;
    }

    let upload_id = client.create_multipart_upload(object, options).await?;
    debug!("Started multipart upload {} for {}", upload_id, object);

    match upload_parts(client, object, &upload_id, source, first, part_size, max_parts).await {
        Ok(parts) => {
            match client
                .complete_multipart_upload(object, &upload_id, &parts)
                .await
            {
                Ok(receipt) => {
                    debug!("Completed {} with {} parts", object, parts.len());
                    Ok(receipt)
                }
                Err(e) => {
                    abort_quietly(client, object, &upload_id).await;
                    Err(e)
                }
            }
        }
        Err(e) => {
            abort_quietly(client, object, &upload_id).await;
            Err(e)
        }
    }
}

async fn upload_parts(
    client: &dyn StorageClient,
    object: &ObjectDescriptor,
    upload_id: &str,
    mut source: ByteSource,
    first: Bytes,
    part_size: u64,
    max_parts: usize,
) -> StorageResult<Vec<UploadedPart>> {
    let mut parts = Vec::new();
    let mut body = first;

    loop {
        if parts.len() >= max_parts {
            return Err(StorageError::InvalidArgument(format!(
                "stream exceeds {} parts of {} bytes",
                max_parts, part_size
            )));
        }
        let part_number = parts.len() as i32 + 1;
        let short = (body.len() as u64) < part_size;
        parts.push(
            client
                .upload_part(object, upload_id, part_number, body)
                .await?,
        );
        if short {
            break;
        }

        body = read_part(&mut source, part_size).await?;
        if body.is_empty() {
            break;
        }
    }

    Ok(parts)
}
