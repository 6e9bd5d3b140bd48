//! Turning an [`Operation`] into a transport request.
//!
//! Body selection, in order:
//! 1. one or more file attachments: `multipart/form-data`, JSON payload first
//! 2. form payload: `application/x-www-form-urlencoded`
//! 3. JSON payload: `application/json`
//! 4. stream payload: sent as-is with the file's content type
//! 5. otherwise no body
//!
//! Multipart bodies are streamed, so attachments are never buffered whole.

use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio_util::io::ReaderStream;
use url::{Url, form_urlencoded};
use uuid::Uuid;

use crate::api_version::ApiVersion;
use crate::error::{Error, Result};
use crate::operation::{Operation, Payload, UploadFile};
use crate::token::Token;

/// Body of an [`ApiRequest`].
pub enum RequestBody {
    Empty,
    /// Fully buffered body.
    Bytes(Bytes),
    /// Streamed body.
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A built request waiting for a credential to authorize it.
///
/// Authorization sets the bearer header and fills in [`url`](ApiRequest::url).
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,

    /// Operation path after placeholder substitution.
    pub path: String,

    /// Encoded query string.
    pub query: Option<String>,

    pub headers: HeaderMap,

    pub body: RequestBody,

    pub version: &'static ApiVersion,

    /// Absolute URL, set once the request has been authorized.
    pub url: Option<Url>,
}

impl ApiRequest {
    /// Set the `Authorization` header for a token.
    pub fn set_bearer(&mut self, token: &Token) -> Result<()> {
        let mut value = HeaderValue::from_str(&token.authorization_header())
            .map_err(|_| Error::config("access token is not a valid header value"))?;
        value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }

    /// The body bytes when the body is buffered.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            RequestBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Convert into a `reqwest` request. The request must be authorized.
    pub fn into_reqwest(self, client: &reqwest::Client) -> Result<reqwest::Request> {
        let ApiRequest {
            method,
            path,
            headers,
            body,
            url,
            ..
        } = self;
        let url = url.ok_or_else(|| Error::config(format!("request for {} was not authorized", path)))?;

        let builder = client.request(method, url).headers(headers);
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };
        Ok(builder.build()?)
    }
}

impl Operation {
    /// Build the transport request.
    ///
    /// Fails if the JSON payload could not be encoded. Attached readers are
    /// dropped, and so closed, on every failure path.
    pub fn build(self) -> Result<ApiRequest> {
        let path = self.resolved_path();
        let query = self.query_string();
        let Operation {
            method,
            payload,
            files,
            accept,
            version,
            ..
        } = self;

        let mut headers = HeaderMap::new();
        if let Some(accept) = accept {
            let value = HeaderValue::from_str(&accept)
                .map_err(|_| Error::config(format!("invalid accept header {:?}", accept)))?;
            headers.insert(header::ACCEPT, value);
        }

        let body = if !files.is_empty() {
            let json = match payload {
                Payload::None => None,
                Payload::Json(encoded) => Some(encoded.map_err(Error::Encode)?),
                _ => {
                    return Err(Error::config(
                        "file attachments can only be combined with a JSON payload",
                    ));
                }
            };
            for file in &files {
                check_part_header("file name", &file.name)?;
                check_part_header("content type", &file.content_type)?;
                if let Some(id) = &file.document_id {
                    check_part_header("document id", id)?;
                }
            }
            let boundary = Uuid::new_v4().simple().to_string();
            headers.insert(
                header::CONTENT_TYPE,
                content_type(&format!("multipart/form-data; boundary={}", boundary))?,
            );
            RequestBody::Stream(multipart_stream(&boundary, json, files))
        } else {
            match payload {
                Payload::None => RequestBody::Empty,
                Payload::Form(pairs) => {
                    let encoded = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(pairs.iter())
                        .finish();
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                    RequestBody::Bytes(Bytes::from(encoded))
                }
                Payload::Json(encoded) => {
                    let encoded = encoded.map_err(Error::Encode)?;
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                    RequestBody::Bytes(Bytes::from(encoded))
                }
                Payload::Stream(file) => {
                    headers.insert(header::CONTENT_TYPE, content_type(&file.content_type)?);
                    RequestBody::Stream(ReaderStream::new(file.reader).boxed())
                }
            }
        };

        Ok(ApiRequest {
            method,
            path,
            query,
            headers,
            body,
            version,
            url: None,
        })
    }
}

fn content_type(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::config(format!("invalid content type {:?}", value)))
}

/// Part headers are written by hand, so a line break in a value would start
/// a new header.
fn check_part_header(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(Error::config(format!(
            "{} {:?} contains control characters",
            field, value
        )));
    }
    Ok(())
}

fn chunk(data: impl Into<Bytes>) -> BoxStream<'static, io::Result<Bytes>> {
    stream::once(futures::future::ready(Ok(data.into()))).boxed()
}

/// Stream a multipart body: the JSON part (if any) followed by each file in order.
pub(crate) fn multipart_stream(
    boundary: &str,
    json: Option<Vec<u8>>,
    files: Vec<UploadFile>,
) -> BoxStream<'static, io::Result<Bytes>> {
    let mut parts: Vec<BoxStream<'static, io::Result<Bytes>>> = Vec::new();

    if let Some(json) = json {
        let mut head = format!(
            "--{}\r\nContent-Type: application/json\r\nContent-Disposition: form-data\r\n\r\n",
            boundary
        )
        .into_bytes();
        head.extend_from_slice(&json);
        head.extend_from_slice(b"\r\n");
        parts.push(chunk(head));
    }

    for (index, file) in files.into_iter().enumerate() {
        let document_id = file
            .document_id
            .clone()
            .unwrap_or_else(|| (index + 1).to_string());
        let head = format!(
            "--{}\r\nContent-Type: {}\r\nContent-Disposition: file; filename=\"{}\";documentid={}\r\n\r\n",
            boundary,
            file.content_type,
            file.name.replace('"', "\\\""),
            document_id
        );
        parts.push(chunk(head));
        parts.push(ReaderStream::new(file.reader).boxed());
        parts.push(chunk(&b"\r\n"[..]));
    }

    parts.push(chunk(format!("--{}--\r\n", boundary)));
    stream::iter(parts).flatten().boxed()
}
