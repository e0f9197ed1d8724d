//! Main client implementation

use crate::{
    auth::{self, AuthSession},
    dispatcher::{encode_path, Dispatcher, RequestSpec},
    proxy::{self, InboundUpload, ProgressCallback, RawUpload},
    sink::ResponseSink,
    types::*,
    ClientError, Config, Result,
};
use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

/// Swift storage client.
///
/// Every resource call first awaits the authentication session, so a call
/// issued before authentication finishes waits for it instead of racing it.
#[derive(Debug)]
pub struct SwiftClient {
    dispatcher: Dispatcher,
    session: OnceCell<AuthSession>,
}

impl SwiftClient {
    /// Create an unauthenticated client; the first call authenticates
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(config)?,
            session: OnceCell::new(),
        })
    }

    /// Create a client and authenticate before returning it
    pub async fn connect(config: Config) -> Result<Self> {
        let client = Self::new(config)?;
        client.authenticate().await?;
        Ok(client)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        self.dispatcher.config()
    }

    /// Authenticate if no session exists yet.
    ///
    /// Concurrent callers share one in-flight request. A failure leaves the
    /// session unset, so a later call tries again.
    pub async fn authenticate(&self) -> Result<&AuthSession> {
        self.session
            .get_or_try_init(|| auth::authenticate(&self.dispatcher))
            .await
    }

    /// The current session, if authentication has completed
    pub fn session(&self) -> Option<&AuthSession> {
        self.session.get()
    }

    /// Access the underlying dispatcher for requests not covered here
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn account_path(&self, session: &AuthSession) -> String {
        format!("{}/{}", self.config().api_prefix, session.account())
    }

    fn container_path(&self, session: &AuthSession, container: &str) -> Result<String> {
        check_name("container", container)?;
        Ok(format!("{}/{}", self.account_path(session), container))
    }

    fn object_path(&self, session: &AuthSession, container: &str, object: &str) -> Result<String> {
        check_name("object", object)?;
        Ok(format!("{}/{}", self.container_path(session, container)?, object))
    }

    /// Issue a buffered request with the session attached
    pub async fn issue(&self, spec: RequestSpec) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        self.dispatcher.issue(Some(session), spec).await
    }

    // ==================== Account Operations ====================

    /// List the containers of the account, in backend order
    #[instrument(skip(self))]
    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::get(self.account_path(session)).query("format", "json");
        let response = self.dispatcher.issue(Some(session), spec).await?;
        Ok(parse_listing(&response, "containers"))
    }

    /// Read account usage and metadata
    #[instrument(skip(self))]
    pub async fn retrieve_account_metadata(&self) -> Result<AccountMetadata> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::HEAD, self.account_path(session));
        let response = self.dispatcher.issue(Some(session), spec).await?;
        Ok(AccountMetadata::from_headers(&response.headers))
    }

    // ==================== Container Operations ====================

    /// List the objects in a container, in backend order
    #[instrument(skip(self))]
    pub async fn list_objects(&self, container: &str) -> Result<Vec<ObjectEntry>> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::get(self.container_path(session, container)?).query("format", "json");
        let response = self.dispatcher.issue(Some(session), spec).await?;
        Ok(parse_listing(&response, "objects"))
    }

    /// Create a container
    #[instrument(skip(self))]
    pub async fn create_container(&self, container: &str) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::PUT, self.container_path(session, container)?)
            .header(header::CONTENT_LENGTH.as_str(), "0")?;
        self.dispatcher.issue(Some(session), spec).await
    }

    /// Delete a container without touching its objects. The backend refuses
    /// this while the container is not empty; see
    /// [`delete_container`](Self::delete_container).
    #[instrument(skip(self))]
    pub async fn delete_empty_container(&self, container: &str) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::DELETE, self.container_path(session, container)?);
        self.dispatcher.issue(Some(session), spec).await
    }

    /// Read container usage and metadata
    #[instrument(skip(self))]
    pub async fn retrieve_container_metadata(&self, container: &str) -> Result<ContainerMetadata> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::HEAD, self.container_path(session, container)?);
        let response = self.dispatcher.issue(Some(session), spec).await?;
        Ok(ContainerMetadata::from_headers(&response.headers))
    }

    // ==================== Object Operations ====================

    /// Stream an object into `sink`.
    ///
    /// Content-Length and Content-Type are mirrored onto the sink before the
    /// first chunk. If the transfer fails the sink is aborted before the
    /// error is returned.
    #[instrument(skip(self, sink))]
    pub async fn get_file<K>(&self, container: &str, object: &str, sink: &mut K) -> Result<StreamedResponse>
    where
        K: ResponseSink + ?Sized,
    {
        let result = async {
            let session = self.authenticate().await?;
            let spec = RequestSpec::get(self.object_path(session, container, object)?);
            self.dispatcher.issue_to_sink(Some(session), spec, sink).await
        }
        .await;

        if let Err(e) = &result {
            sink.abort(e).await;
        }
        result
    }

    /// Fetch a whole object into memory
    #[instrument(skip(self))]
    pub async fn retrieve_object(&self, container: &str, object: &str) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::get(self.object_path(session, container, object)?);
        self.dispatcher.issue(Some(session), spec).await
    }

    /// Create an object from an inbound upload.
    ///
    /// A `multipart/form-data` body is decoded and only the part data is
    /// stored; anything else is stored verbatim.
    #[instrument(skip(self, upload, progress))]
    pub async fn create_object(
        &self,
        container: &str,
        object: &str,
        upload: InboundUpload,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome> {
        let session = self.authenticate().await?;
        let path = self.object_path(session, container, object)?;
        let boundary = upload.boundary()?;
        let length = upload.content_length();

        let mut spec = RequestSpec::new(Method::PUT, path);
        if boundary.is_none() {
            if let Some(content_type) = upload.content_type() {
                spec = spec.header(header::CONTENT_TYPE.as_str(), content_type)?;
            }
        }

        debug!(multipart = boundary.is_some(), length, "Proxying upload");
        proxy::proxy_upload(
            &self.dispatcher,
            session,
            spec,
            upload.into_stream(),
            length,
            boundary,
            progress,
        )
        .await
    }

    /// Replace an object from an inbound upload
    pub async fn update_object(
        &self,
        container: &str,
        object: &str,
        upload: InboundUpload,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome> {
        self.create_object(container, object, upload, progress).await
    }

    /// Store raw data under `upload.name`
    #[instrument(skip(self, upload, progress), fields(object = %upload.name, size = upload.size))]
    pub async fn put_raw(
        &self,
        container: &str,
        upload: RawUpload,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome> {
        let session = self.authenticate().await?;
        let path = self.object_path(session, container, &upload.name)?;
        let size = upload.size;
        let spec = RequestSpec::new(Method::PUT, path)
            .header(header::CONTENT_TYPE.as_str(), upload.resolved_content_type())?;
        let stream = upload.open().await?;

        proxy::proxy_upload(&self.dispatcher, session, spec, stream, Some(size), None, progress).await
    }

    /// Delete an object
    #[instrument(skip(self))]
    pub async fn delete_object(&self, container: &str, object: &str) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::DELETE, self.object_path(session, container, object)?);
        self.dispatcher.issue(Some(session), spec).await
    }

    /// Read object metadata without its body
    #[instrument(skip(self))]
    pub async fn retrieve_object_metadata(&self, container: &str, object: &str) -> Result<ObjectMetadata> {
        let session = self.authenticate().await?;
        let spec = RequestSpec::new(Method::HEAD, self.object_path(session, container, object)?);
        let response = self.dispatcher.issue(Some(session), spec).await?;
        Ok(ObjectMetadata::from_headers(&response.headers))
    }

    /// Replace the custom metadata of an object. Keys are sent as
    /// `X-Object-Meta-<key>`.
    #[instrument(skip(self, metadata))]
    pub async fn update_object_metadata(
        &self,
        container: &str,
        object: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<SwiftResponse> {
        let session = self.authenticate().await?;
        let mut spec = RequestSpec::new(Method::POST, self.object_path(session, container, object)?);
        for (key, value) in metadata {
            spec = spec.header(&format!("{}{}", OBJECT_META_PREFIX, key), value)?;
        }
        self.dispatcher.issue(Some(session), spec).await
    }

    /// Server-side copy of `from_container/source` to `container/dest`
    #[instrument(skip(self))]
    pub async fn copy_object(
        &self,
        container: &str,
        dest: &str,
        from_container: &str,
        source: &str,
    ) -> Result<CopyOutcome> {
        let session = self.authenticate().await?;
        check_name("container", from_container)?;
        check_name("object", source)?;

        let spec = RequestSpec::new(Method::PUT, self.object_path(session, container, dest)?)
            .header(COPY_FROM, encode_path(&format!("/{}/{}", from_container, source)))?
            .header(header::CONTENT_LENGTH.as_str(), "0")?;
        let response = self.dispatcher.issue(Some(session), spec).await?;

        Ok(CopyOutcome {
            status: response.status,
            etag: response.etag(),
        })
    }
}

const COPY_FROM: &str = "X-Copy-From";
const OBJECT_META_PREFIX: &str = "X-Object-Meta-";

/// Reject empty names, `/` in container names and `.`/`..` path segments
fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} name is empty", kind)));
    }
    if kind == "container" && name.contains('/') {
        return Err(ClientError::InvalidArgument(format!(
            "container name {:?} contains '/'",
            name
        )));
    }
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(ClientError::InvalidArgument(format!(
            "{} name {:?} has a dot segment",
            kind, name
        )));
    }
    Ok(())
}

/// Decode a `?format=json` listing. An empty or unparsable body yields an
/// empty list.
fn parse_listing<T: DeserializeOwned>(response: &SwiftResponse, what: &str) -> Vec<T> {
    if response.status == 204 || response.body.is_empty() {
        return Vec::new();
    }
    match serde_json::from_slice(&response.body) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(status = response.status, "Unparsable {} listing, treating as empty: {}", what, e);
            Vec::new()
        }
    }
}
