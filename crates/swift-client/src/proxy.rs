//! Streaming upload proxy
//!
//! Connects an inbound byte stream (a browser upload, a file, any
//! `Stream` of chunks) to the body of an outbound PUT without holding the
//! payload in memory. Chunks pass through a bounded channel, so a slow
//! backend pauses reading from the inbound side.

use crate::{
    auth::AuthSession,
    dispatcher::{Dispatcher, RequestBody, RequestSpec},
    multipart::{boundary_from_content_type, FormDataDecoder, FormEvent},
    types::UploadOutcome,
    ClientError, Result,
};
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{self, HeaderValue};
use std::{io, path::PathBuf, pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Boxed inbound byte stream
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Upload progress information, counted in raw inbound bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes received from the inbound stream so far
    pub bytes_received: u64,
    /// Declared length of the inbound stream, if known
    pub bytes_total: Option<u64>,
}

impl UploadProgress {
    /// Get percentage complete, when the total is known
    pub fn percentage(&self) -> Option<f64> {
        match self.bytes_total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_received as f64 / total as f64) * 100.0),
            None => None,
        }
    }
}

/// An inbound request body to forward to storage
pub struct InboundUpload {
    body: ByteStream,
    content_type: Option<String>,
    content_length: Option<u64>,
}

impl std::fmt::Debug for InboundUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundUpload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl InboundUpload {
    /// Wrap any stream of byte chunks
    pub fn new<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let body = stream
            .map_ok(|b| -> Bytes { b.into() })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Self {
            body: Box::pin(body),
            content_type: None,
            content_length: None,
        }
    }

    /// Set the inbound `Content-Type`; a `multipart/form-data` type with a
    /// boundary makes the upload go through the form decoder
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the declared inbound `Content-Length`
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Declared inbound `Content-Type`
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared inbound `Content-Length`
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Multipart boundary, if the content type declares form data
    pub fn boundary(&self) -> Result<Option<String>> {
        match &self.content_type {
            Some(ct) => boundary_from_content_type(ct),
            None => Ok(None),
        }
    }

    pub(crate) fn into_stream(self) -> ByteStream {
        self.body
    }
}

/// Where a raw upload reads its bytes from
pub enum DataSource {
    /// A local file, streamed from disk
    Path(PathBuf),
    /// Any byte stream
    Stream(ByteStream),
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A raw binary upload: the object name, its size and type, and where the
/// bytes come from
#[derive(Debug)]
pub struct RawUpload {
    /// Byte source
    pub source: DataSource,
    /// Object name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Content type; guessed from the name when absent
    pub content_type: Option<String>,
}

impl RawUpload {
    /// Upload a local file under `name`
    pub fn from_path(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            source: DataSource::Path(path.into()),
            name: name.into(),
            size,
            content_type: None,
        }
    }

    /// Upload a byte stream under `name`
    pub fn from_stream(stream: ByteStream, name: impl Into<String>, size: u64) -> Self {
        Self {
            source: DataSource::Stream(stream),
            name: name.into(),
            size,
            content_type: None,
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Content type to send: the declared one, or a guess from the name
    pub fn resolved_content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .to_string()
        })
    }

    pub(crate) async fn open(self) -> Result<ByteStream> {
        match self.source {
            DataSource::Stream(stream) => Ok(stream),
            DataSource::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                Ok(Box::pin(tokio_util::io::ReaderStream::new(file)))
            }
        }
    }
}

#[derive(Debug, Default)]
struct PumpStats {
    bytes_received: u64,
    bytes_sent: u64,
}

/// Forward `inbound` as the body of `spec`.
///
/// Without a boundary every chunk is forwarded verbatim and
/// `declared_length` becomes the outbound `Content-Length`. With a boundary
/// only decoded part data is forwarded and the outbound body is chunked.
/// Progress counts raw inbound bytes against `declared_length`.
pub(crate) async fn proxy_upload(
    dispatcher: &Dispatcher,
    session: &AuthSession,
    mut spec: RequestSpec,
    inbound: ByteStream,
    declared_length: Option<u64>,
    boundary: Option<String>,
    progress: Option<ProgressCallback>,
) -> Result<UploadOutcome> {
    let decoder = boundary.as_deref().map(FormDataDecoder::new).transpose()?;

    match (&decoder, declared_length) {
        (None, Some(length)) => {
            if !spec.headers.contains_key(header::CONTENT_LENGTH) {
                spec.headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }
        (Some(_), _) => {
            spec.headers.remove(header::CONTENT_LENGTH);
        }
        (None, None) => {}
    }

    let (tx, rx) = mpsc::channel(dispatcher.config().proxy_buffer_chunks.max(1));
    spec.body = RequestBody::Stream(reqwest::Body::wrap_stream(ReceiverStream::new(rx)));

    let send = dispatcher.issue(Some(session), spec);
    let pump = pump_inbound(inbound, tx, decoder, declared_length, progress);
    let (pumped, response) = tokio::join!(pump, send);

    let stats = pumped?;
    let response = response?;
    debug!(
        received = stats.bytes_received,
        sent = stats.bytes_sent,
        status = response.status,
        "Upload complete"
    );

    Ok(UploadOutcome {
        status: response.status,
        etag: response.etag(),
        bytes_received: stats.bytes_received,
        bytes_sent: stats.bytes_sent,
    })
}

async fn pump_inbound(
    mut inbound: ByteStream,
    tx: mpsc::Sender<io::Result<Bytes>>,
    mut decoder: Option<FormDataDecoder>,
    declared_length: Option<u64>,
    progress: Option<ProgressCallback>,
) -> Result<PumpStats> {
    let mut stats = PumpStats::default();
    let mut events = Vec::new();

    while let Some(chunk) = inbound.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(ClientError::Io(e));
            }
        };

        stats.bytes_received += chunk.len() as u64;
        if let Some(cb) = &progress {
            cb(UploadProgress {
                bytes_received: stats.bytes_received,
                bytes_total: declared_length,
            });
        }

        let Some(decoder) = decoder.as_mut() else {
            stats.bytes_sent += chunk.len() as u64;
            if tx.send(Ok(chunk)).await.is_err() {
                // The outbound request is gone; its error is reported by the sender
                break;
            }
            continue;
        };

        let consumed = decoder.write(&chunk, &mut events);
        if !forward_events(&mut events, &tx, &mut stats).await {
            break;
        }
        if consumed != chunk.len() {
            return Err(abort(
                &tx,
                format!(
                    "multipart decoder consumed {} of {} bytes at offset {}",
                    consumed,
                    chunk.len(),
                    stats.bytes_received - chunk.len() as u64
                ),
            )
            .await);
        }
    }

    if let Some(mut decoder) = decoder {
        let finished = decoder.finish(&mut events);
        forward_events(&mut events, &tx, &mut stats).await;
        if let Err(e) = finished {
            return Err(abort(&tx, e.to_string()).await);
        }
    }

    Ok(stats)
}

/// Send decoded part data downstream; returns false once the receiver is gone
async fn forward_events(
    events: &mut Vec<FormEvent>,
    tx: &mpsc::Sender<io::Result<Bytes>>,
    stats: &mut PumpStats,
) -> bool {
    for event in events.drain(..) {
        match event {
            FormEvent::Data(data) => {
                stats.bytes_sent += data.len() as u64;
                if tx.send(Ok(data)).await.is_err() {
                    return false;
                }
            }
            FormEvent::Headers(part) => {
                debug!(
                    name = ?part.name,
                    filename = ?part.filename,
                    mime = ?part.mime,
                    "Forwarding form part"
                );
            }
            FormEvent::PartBegin | FormEvent::PartEnd | FormEvent::End => {}
        }
    }
    true
}

/// Fail the outbound body so the backend never sees a truncated object as
/// complete
async fn abort(tx: &mpsc::Sender<io::Result<Bytes>>, message: String) -> ClientError {
    warn!("Aborting upload: {}", message);
    let _ = tx
        .send(Err(io::Error::new(io::ErrorKind::InvalidData, message.clone())))
        .await;
    ClientError::Decode(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let p = UploadProgress {
            bytes_received: 25,
            bytes_total: Some(100),
        };
        assert_eq!(p.percentage(), Some(25.0));

        let unknown = UploadProgress {
            bytes_received: 25,
            bytes_total: None,
        };
        assert_eq!(unknown.percentage(), None);
    }

    #[test]
    fn test_inbound_boundary_detection() {
        let upload = InboundUpload::new(futures::stream::empty::<io::Result<Bytes>>())
            .with_content_type("multipart/form-data; boundary=----abc");
        assert_eq!(upload.boundary().unwrap().as_deref(), Some("----abc"));

        let raw = InboundUpload::new(futures::stream::empty::<io::Result<Bytes>>())
            .with_content_type("image/png");
        assert_eq!(raw.boundary().unwrap(), None);
    }

    #[test]
    fn test_raw_upload_content_type_guess() {
        let upload = RawUpload::from_path("/tmp/x", "report.pdf", 10);
        assert_eq!(upload.resolved_content_type(), "application/pdf");

        let declared = RawUpload::from_path("/tmp/x", "report.pdf", 10)
            .with_content_type("text/plain");
        assert_eq!(declared.resolved_content_type(), "text/plain");
    }

    #[tokio::test]
    async fn test_pump_decodes_multipart() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n\r\nPAYLOAD\r\n--b--\r\n";
        let chunks: Vec<io::Result<Bytes>> = body
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let inbound: ByteStream = Box::pin(futures::stream::iter(chunks));
        let (tx, rx) = mpsc::channel(64);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let progress: ProgressCallback = Arc::new(move |p: UploadProgress| seen_cb.lock().unwrap().push(p));

        let stats = pump_inbound(
            inbound,
            tx,
            Some(FormDataDecoder::new("b").unwrap()),
            Some(body.len() as u64),
            Some(progress),
        )
        .await
        .unwrap();

        let forwarded: Vec<u8> = ReceiverStream::new(rx)
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(forwarded, b"PAYLOAD");
        assert_eq!(stats.bytes_received, body.len() as u64);
        assert_eq!(stats.bytes_sent, 7);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().unwrap().bytes_received, body.len() as u64);
        assert_eq!(seen.last().unwrap().percentage(), Some(100.0));
    }

    #[tokio::test]
    async fn test_pump_aborts_on_malformed_multipart() {
        let inbound: ByteStream = Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(
            b"--b\r\n: no name\r\n\r\n",
        ))]));
        let (tx, rx) = mpsc::channel(8);

        let result = pump_inbound(inbound, tx, Some(FormDataDecoder::new("b").unwrap()), None, None).await;
        assert!(matches!(result, Err(ClientError::Decode(_))));

        let items: Vec<_> = ReceiverStream::new(rx).collect().await;
        assert!(items.last().unwrap().is_err());
    }
}
