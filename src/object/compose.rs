//! Server-side compose
//!
//! A single whole source of at most [`MAX_PART_SIZE`] is a plain copy.
//! Anything else becomes a multipart upload built from part copies, with
//! sources larger than [`MAX_PART_SIZE`] split into several parts.

use super::{abort_quietly, MAX_PARTS, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::types::{ComposeSource, ObjectDescriptor, PutOptions, UploadedPart, WriteReceipt};
use tracing::debug;

/// A source with its byte span resolved against the stored size
struct ResolvedSource<'a> {
    source: &'a ComposeSource,
    first: u64,
    len: u64,
}

/// One part copy: inclusive byte range of a source
struct PartCopy<'a> {
    source: &'a ComposeSource,
    first: u64,
    last: u64,
}

pub(super) fn check_request(target: &ObjectDescriptor, sources: &[ComposeSource]) -> StorageResult<()> {
    super::upload::check_target(target)?;
    if sources.is_empty() || sources.len() > MAX_PARTS {
        return Err(StorageError::InvalidArgument(format!(
            "compose needs 1 to {} sources, got {}",
            MAX_PARTS,
            sources.len()
        )));
    }
    Ok(())
}

pub(super) async fn compose(
    client: &dyn StorageClient,
    target: &ObjectDescriptor,
    sources: &[ComposeSource],
) -> StorageResult<WriteReceipt> {
    let mut resolved = Vec::with_capacity(sources.len());
    for source in sources {
        resolved.push(resolve(client, source).await?);
    }

    if let [only] = resolved.as_slice() {
        if only.source.range.is_none() && only.len <= MAX_PART_SIZE {
            debug!("Copying {} to {}", only.source.copy_source(), target);
            return client.copy_object(target, only.source).await;
        }
    }

    let plan = plan_parts(&resolved)?;

    let upload_id = client
        .create_multipart_upload(target, &PutOptions::default())
        .await?;
    debug!(
        "Composing {} from {} sources in {} parts",
        target,
        sources.len(),
        plan.len()
    );

    match copy_parts(client, target, &upload_id, &plan).await {
        Ok(parts) => match client
            .complete_multipart_upload(target, &upload_id, &parts)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                abort_quietly(client, target, &upload_id).await;
                Err(e)
            }
        },
        Err(e) => {
            abort_quietly(client, target, &upload_id).await;
            Err(e)
        }
    }
}

/// Stat `source` and check its range lies within the object
async fn resolve<'a>(
    client: &dyn StorageClient,
    source: &'a ComposeSource,
) -> StorageResult<ResolvedSource<'a>> {
    let descriptor = source.descriptor();
    let meta = client.stat_object(&descriptor).await.map_err(|e| {
        if e.is_not_found() {
            StorageError::InvalidArgument(format!("compose source {} does not exist", descriptor))
        } else {
            e
        }
    })?;
    let size = meta.size;

    let Some(range) = &source.range else {
        return Ok(ResolvedSource {
            source,
            first: 0,
            len: size,
        });
    };

    if range.offset >= size {
        return Err(StorageError::InvalidArgument(format!(
            "range offset {} is beyond the end of {} ({} bytes)",
            range.offset, descriptor, size
        )));
    }
    let last = match range.last_byte()? {
        Some(last) if last >= size => {
            return Err(StorageError::InvalidArgument(format!(
                "range {}..={} is beyond the end of {} ({} bytes)",
                range.offset, last, descriptor, size
            )))
        }
        Some(last) => last,
        None => size - 1,
    };

    Ok(ResolvedSource {
        source,
        first: range.offset,
        len: last - range.offset + 1,
    })
}

fn plan_parts<'a>(resolved: &[ResolvedSource<'a>]) -> StorageResult<Vec<PartCopy<'a>>> {
    let count = resolved.len();
    let mut plan = Vec::new();

    for (index, item) in resolved.iter().enumerate() {
        if item.len == 0 {
            return Err(StorageError::InvalidArgument(format!(
                "compose source {} is empty",
                item.source.descriptor()
            )));
        }
        if count > 1 && index + 1 < count && item.len < MIN_PART_SIZE {
            return Err(StorageError::InvalidArgument(format!(
                "compose source {} is {} bytes; every source but the last must be at least {}",
                item.source.descriptor(),
                item.len,
                MIN_PART_SIZE
            )));
        }

        let pieces = item.len.div_ceil(MAX_PART_SIZE);
        let base = item.len / pieces;
        let extra = item.len % pieces;
        let mut first = item.first;
        for piece in 0..pieces {
            let piece_len = base + u64::from(piece < extra);
            plan.push(PartCopy {
                source: item.source,
                first,
                last: first + piece_len - 1,
            });
            first += piece_len;
        }

        if plan.len() > MAX_PARTS {
            return Err(StorageError::InvalidArgument(format!(
                "compose would need more than {} parts",
                MAX_PARTS
            )));
        }
    }

    Ok(plan)
}

async fn copy_parts(
    client: &dyn StorageClient,
    target: &ObjectDescriptor,
    upload_id: &str,
    plan: &[PartCopy<'_>],
) -> StorageResult<Vec<UploadedPart>> {
    let mut parts = Vec::with_capacity(plan.len());
    for (index, part) in plan.iter().enumerate() {
        let uploaded = client
            .upload_part_copy(
                target,
                upload_id,
                index as i32 + 1,
                part.source,
                Some((part.first, part.last)),
            )
            .await?;
        parts.push(uploaded);
    }
    Ok(parts)
}
