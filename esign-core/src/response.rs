//! Response resolution.
//!
//! Any 2xx status is a success. Everything else is read in full and turned
//! into a [`ResponseError`]. Success bodies are either decoded as JSON,
//! discarded, or handed back as a live [`Download`] stream.

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Response, header};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ResponseError, Result};

/// Pass success responses through; convert everything else into an error.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let limit = response.content_length();
    let mut raw = response.bytes().await?;
    if let Some(limit) = limit {
        raw.truncate(limit as usize);
    }

    tracing::debug!("Request failed with {} ({} bytes)", status, raw.len());
    Err(ResponseError::from_body(status, raw).into())
}

/// Decode a success body into `T`. An empty body decodes as JSON `null`.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    let body: &[u8] = if body.is_empty() { b"null" } else { &body };
    serde_json::from_slice(body).map_err(Error::Decode)
}

/// Check the status and drop the body.
pub async fn discard(response: Response) -> Result<()> {
    let response = ensure_success(response).await?;
    response.bytes().await?;
    Ok(())
}

/// Check the status and hand back the open body stream.
pub async fn download(response: Response) -> Result<Download> {
    let response = ensure_success(response).await?;
    Ok(Download::new(response))
}

/// A binary response body that has not been read yet.
///
/// The connection stays open until the download is consumed or dropped.
#[derive(Debug)]
pub struct Download {
    /// `Content-Type` of the body.
    pub content_type: Option<String>,

    /// `Content-Length` of the body, when the server sent one.
    pub content_length: Option<u64>,

    /// Raw `Content-Disposition` header.
    pub content_disposition: Option<String>,

    response: Response,
}

impl Download {
    fn new(response: Response) -> Self {
        let header_str = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            content_type: header_str(header::CONTENT_TYPE),
            content_length: response.content_length(),
            content_disposition: header_str(header::CONTENT_DISPOSITION),
            response,
        }
    }

    /// File name from the `Content-Disposition` header.
    pub fn filename(&self) -> Option<&str> {
        let disposition = self.content_disposition.as_deref()?;
        disposition.split(';').find_map(|part| {
            let value = part.trim().strip_prefix("filename=")?;
            Some(value.trim_matches('"')).filter(|v| !v.is_empty())
        })
    }

    /// Consume the download as a stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        self.response.bytes_stream().map_err(Error::from)
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.response.bytes().await?)
    }

    /// Copy the body into a writer, returning the number of bytes written.
    pub async fn write_to<W: AsyncWrite + Unpin>(self, writer: &mut W) -> Result<u64> {
        let mut stream = Box::pin(self.into_stream());
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}
