//! Operation descriptors.
//!
//! An [`Operation`] captures everything about one remote call: method, path
//! template and substitutions, query options, payload, file attachments and
//! the API it targets. Setters are fluent; once an operation is executed it is
//! consumed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use url::form_urlencoded;

use crate::api_version::ApiVersion;
use crate::credential::Credential;
use crate::error::Result;
use crate::response::{self, Download};

/// A readable source for an upload.
///
/// The reader is closed when the file is dropped, which happens exactly once
/// whether the call succeeds or fails.
pub struct UploadFile {
    /// File name reported in the part's `Content-Disposition`.
    pub name: String,

    /// MIME type of the content.
    pub content_type: String,

    /// Document id the service should assign. Defaults to the file's
    /// position (starting at 1) when attached to an operation.
    pub document_id: Option<String>,

    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl UploadFile {
    /// Wrap a reader.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            document_id: None,
            reader: Box::new(reader),
        }
    }

    /// Upload an in-memory buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(name, content_type, std::io::Cursor::new(bytes.into()))
    }

    /// Open a file from disk. The MIME type is guessed from the extension.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let content_type = guess_content_type(path);
        Ok(Self::new(name, content_type, file))
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("document_id", &self.document_id)
            .finish_non_exhaustive()
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Request payload.
#[derive(Debug, Default)]
pub(crate) enum Payload {
    #[default]
    None,
    /// JSON body; encoding errors surface when the request is built.
    Json(std::result::Result<Vec<u8>, serde_json::Error>),
    /// `application/x-www-form-urlencoded` key/value pairs.
    Form(Vec<(String, String)>),
    /// Raw byte stream sent as the whole body.
    Stream(UploadFile),
}

/// One remote call.
///
/// # Example
///
/// ```
/// use esign_core::{Operation, ESIGN_V21};
///
/// let op = Operation::get("envelopes/{envelopeId}/recipients", &ESIGN_V21)
///     .path_param("envelopeId", "e-1")
///     .query("include_tabs", "true");
/// assert_eq!(op.resolved_path(), "envelopes/e-1/recipients");
/// ```
#[derive(Debug)]
pub struct Operation {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) path_params: Vec<(String, String)>,
    pub(crate) query: BTreeMap<String, Vec<String>>,
    pub(crate) payload: Payload,
    pub(crate) files: Vec<UploadFile>,
    pub(crate) accept: Option<String>,
    pub(crate) version: &'static ApiVersion,
}

impl Operation {
    /// Create an operation. `path` is relative to the API (see [`ApiVersion`]).
    pub fn new(method: Method, path: impl Into<String>, version: &'static ApiVersion) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            query: BTreeMap::new(),
            payload: Payload::None,
            files: Vec::new(),
            accept: None,
            version,
        }
    }

    pub fn get(path: impl Into<String>, version: &'static ApiVersion) -> Self {
        Self::new(Method::GET, path, version)
    }

    pub fn post(path: impl Into<String>, version: &'static ApiVersion) -> Self {
        Self::new(Method::POST, path, version)
    }

    pub fn put(path: impl Into<String>, version: &'static ApiVersion) -> Self {
        Self::new(Method::PUT, path, version)
    }

    pub fn delete(path: impl Into<String>, version: &'static ApiVersion) -> Self {
        Self::new(Method::DELETE, path, version)
    }

    /// Substitute `{name}` in the path template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Append a query value. Repeated keys keep their insertion order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Append several values for one key.
    pub fn query_multi<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.query
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Replace every value of a query key.
    pub fn set_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), vec![value.into()]);
        self
    }

    /// Position of the first result in a paged listing.
    pub fn start_position(self, position: u32) -> Self {
        self.set_query("start_position", position.to_string())
    }

    /// Maximum number of results in a paged listing.
    pub fn count(self, count: u32) -> Self {
        self.set_query("count", count.to_string())
    }

    pub fn from_date(self, from: DateTime<Utc>) -> Self {
        self.set_query("from_date", from.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn to_date(self, to: DateTime<Utc>) -> Self {
        self.set_query("to_date", to.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Comma-joined `include` option.
    pub fn include(self, items: &[&str]) -> Self {
        self.set_query("include", items.join(","))
    }

    /// Send a JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Self {
        self.payload = Payload::Json(serde_json::to_vec(payload));
        self
    }

    /// Send a form-encoded payload.
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.payload = Payload::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Send a byte stream as the whole body.
    pub fn upload(mut self, file: UploadFile) -> Self {
        self.payload = Payload::Stream(file);
        self
    }

    /// Attach a file. Any attachment switches the body to multipart.
    pub fn file(mut self, mut file: UploadFile) -> Self {
        if file.document_id.is_none() {
            file.document_id = Some((self.files.len() + 1).to_string());
        }
        self.files.push(file);
        self
    }

    /// Set the `Accept` header.
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn version(&self) -> &'static ApiVersion {
        self.version
    }

    /// The path with every known placeholder substituted. Unknown
    /// placeholders are left as written.
    pub fn resolved_path(&self) -> String {
        let mut path = self.path.clone();
        for (name, value) in &self.path_params {
            path = path.replace(&format!("{{{}}}", name), value);
        }
        path
    }

    /// Form-encoded query string with keys in lexicographic order.
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.query {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        Some(serializer.finish())
    }

    /// Execute and decode the JSON response into `T`.
    pub async fn execute<T, C>(self, credential: &C) -> Result<T>
    where
        T: DeserializeOwned,
        C: Credential + ?Sized,
    {
        let op = if self.accept.is_none() {
            self.accept("application/json")
        } else {
            self
        };
        let response = credential.send(op.build()?).await?;
        response::decode_json(response).await
    }

    /// Execute and ignore the response body.
    pub async fn execute_empty<C>(self, credential: &C) -> Result<()>
    where
        C: Credential + ?Sized,
    {
        let response = credential.send(self.build()?).await?;
        response::discard(response).await
    }

    /// Execute and return the body as an open stream.
    ///
    /// The caller owns the returned [`Download`]; dropping it closes the
    /// connection.
    pub async fn execute_download<C>(self, credential: &C) -> Result<Download>
    where
        C: Credential + ?Sized,
    {
        let response = credential.send(self.build()?).await?;
        response::download(response).await
    }
}
