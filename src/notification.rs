//! Bucket notification subscription
//!
//! A subscription owns a pump task that forwards records from the
//! long-poll into a bounded channel. Closing the subscription (explicitly or
//! by dropping it) aborts the pump, which drops the HTTP response and
//! releases the connection.

use crate::client::NotificationStream;
use crate::error::StorageResult;
use crate::types::NotificationRecord;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

pub struct NotificationSubscription {
    receiver: mpsc::Receiver<StorageResult<NotificationRecord>>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl NotificationSubscription {
    /// Start pumping `stream`. Must be called within a tokio runtime.
    pub(crate) fn spawn(mut stream: NotificationStream) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let pump = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if sender.send(item).await.is_err() || failed {
                    break;
                }
            }
            debug!("Notification pump stopped");
        });

        Self {
            receiver,
            pump: Some(pump),
            closed: false,
        }
    }

    /// Next record, or `None` once the stream ends or the subscription is
    /// closed. A transport error is yielded once and ends the stream.
    pub async fn next(&mut self) -> Option<StorageResult<NotificationRecord>> {
        if self.closed {
            return None;
        }
        self.receiver.recv().await
    }

    /// Release the underlying connection. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.receiver.close();
        debug!("Notification subscription closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for NotificationSubscription {
    type Item = StorageResult<NotificationRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}
