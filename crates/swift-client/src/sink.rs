//! Destinations for streamed downloads

use crate::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::io;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Receives a streamed response: headers first, then body chunks, then `end`.
///
/// `write` is awaited before the next chunk is read from the backend, so a
/// slow sink slows the download instead of growing a buffer.
#[async_trait]
pub trait ResponseSink: Send {
    /// Mirror a response header
    fn header(&mut self, name: &str, value: &str);

    /// Forward one body chunk
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// The body is complete
    async fn end(&mut self) -> Result<()>;

    /// The transfer failed after it may have started
    async fn abort(&mut self, _error: &ClientError) {}
}

/// A sink that hands headers and body chunks to another task, typically an
/// HTTP response being written to a browser.
#[derive(Debug)]
pub struct ChannelSink {
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<HeaderMap>>,
    body_tx: Option<mpsc::Sender<io::Result<Bytes>>>,
}

/// Receiving half of a [`ChannelSink`]
#[derive(Debug)]
pub struct ChannelReceiver {
    /// Resolves with the mirrored headers before the first chunk, or fails
    /// if the transfer was aborted before any header was committed
    pub head: oneshot::Receiver<HeaderMap>,
    body_rx: mpsc::Receiver<io::Result<Bytes>>,
}

/// Create a sink whose body channel holds at most `depth` chunks
pub fn channel_sink(depth: usize) -> (ChannelSink, ChannelReceiver) {
    let (head_tx, head) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(depth.max(1));
    (
        ChannelSink {
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
        },
        ChannelReceiver { head, body_rx },
    )
}

impl ChannelSink {
    fn commit_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            let _ = tx.send(std::mem::take(&mut self.headers));
        }
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.commit_head();
        let tx = self
            .body_tx
            .as_ref()
            .ok_or_else(|| ClientError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed")))?;
        tx.send(Ok(chunk))
            .await
            .map_err(|_| ClientError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped")))
    }

    async fn end(&mut self) -> Result<()> {
        self.commit_head();
        self.body_tx.take();
        Ok(())
    }

    async fn abort(&mut self, error: &ClientError) {
        // Before the head is committed the receiver sees a closed head channel
        self.head_tx.take();
        if let Some(tx) = self.body_tx.take() {
            let _ = tx
                .send(Err(io::Error::new(io::ErrorKind::Other, error.to_string())))
                .await;
        }
    }
}

impl ChannelReceiver {
    /// Split into the header future and the body stream
    pub fn into_parts(
        self,
    ) -> (
        oneshot::Receiver<HeaderMap>,
        impl Stream<Item = io::Result<Bytes>> + Send + 'static,
    ) {
        (self.head, ReceiverStream::new(self.body_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_channel_sink_delivers_head_then_body() {
        let (mut sink, receiver) = channel_sink(4);
        let (head, body) = receiver.into_parts();

        sink.header("content-type", "text/plain");
        sink.header("content-length", "5");
        sink.write(Bytes::from_static(b"hel")).await.unwrap();
        sink.write(Bytes::from_static(b"lo")).await.unwrap();
        sink.end().await.unwrap();

        let headers = head.await.unwrap();
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");

        let chunks: Vec<_> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_abort_before_head_closes_head_channel() {
        let (mut sink, receiver) = channel_sink(1);
        let (head, _body) = receiver.into_parts();

        sink.abort(&ClientError::http(404, "missing")).await;
        assert!(head.await.is_err());
    }

    #[tokio::test]
    async fn test_abort_after_head_fails_body() {
        let (mut sink, receiver) = channel_sink(4);
        let (head, body) = receiver.into_parts();

        sink.write(Bytes::from_static(b"partial")).await.unwrap();
        sink.abort(&ClientError::Decode("late".to_string())).await;

        assert!(head.await.is_ok());
        let items: Vec<_> = body.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
