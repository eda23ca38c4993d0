//! Normalization of API responses into [`ApiResponse`].

use reqwest::{StatusCode, header};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// The body of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Json(Value),
    /// The file part of a multipart attachment download.
    Bytes(Vec<u8>),
}

/// The uniform shape of every resource call.
///
/// A non-success status is not an error: the raw response text is kept in `message` and the
/// caller decides what to do based on `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The JSON part accompanying a multipart attachment download.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ApiResponse {
    #[instrument(skip(response), fields(url = %response.url()))]
    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?;
        debug!(%status, size = body.len(), "response received");

        Ok(Self::normalize(status, content_type.as_deref(), &body))
    }

    /// Builds the response from its parts.
    ///
    /// `200` and `202` bodies are parsed, as a metadata part and a file part when the content
    /// type is `multipart/*` and as JSON otherwise. When parsing fails, or for any other status,
    /// the body is kept as text in `message`.
    #[must_use]
    pub fn normalize(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Self {
        let mut response = Self {
            status: status.as_u16(),
            content: None,
            message: None,
            metadata: None,
        };

        if !matches!(status, StatusCode::OK | StatusCode::ACCEPTED) {
            response.message = Some(String::from_utf8_lossy(body).into_owned());
            return response;
        }

        let parsed = match content_type {
            Some(content_type) if content_type.starts_with("multipart/") => {
                multipart::parse(content_type, body).map(|(metadata, file)| {
                    response.metadata = Some(metadata);
                    Content::Bytes(file)
                })
            }
            _ => serde_json::from_slice(body).ok().map(Content::Json),
        };

        match parsed {
            Some(content) => response.content = Some(content),
            None => {
                trace!("response body could not be parsed, keeping it as text");
                response.message = Some(String::from_utf8_lossy(body).into_owned());
            }
        }
        response
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }

    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.content {
            Some(Content::Json(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            Some(Content::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

mod multipart {
    use serde_json::Value;

    fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
        haystack
            .get(from..)?
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|position| position + from)
    }

    fn boundary(content_type: &str) -> Option<&str> {
        content_type.split(';').skip(1).find_map(|parameter| {
            let (name, value) = parameter.trim().split_once('=')?;
            name.eq_ignore_ascii_case("boundary")
                .then(|| value.trim_matches('"'))
                .filter(|value| !value.is_empty())
        })
    }

    /// The bodies of every part, without their headers.
    fn parts<'a>(body: &'a [u8], boundary: &str) -> Option<Vec<&'a [u8]>> {
        let delimiter = format!("--{boundary}").into_bytes();
        let mut parts = Vec::new();
        let mut position = find(body, &delimiter, 0)? + delimiter.len();

        loop {
            let rest = body.get(position..)?;
            if rest.starts_with(b"--") {
                return Some(parts);
            }
            let next = find(body, &delimiter, position)?;
            let part = &body[position..next];
            let part = part.strip_prefix(b"\r\n").unwrap_or(part);
            let part = part.strip_suffix(b"\r\n").unwrap_or(part);

            let content = match find(part, b"\r\n\r\n", 0) {
                Some(end) => &part[end + 4..],
                None if part.starts_with(b"\r\n") => &part[2..],
                None => return None,
            };
            parts.push(content);
            position = next + delimiter.len();
        }
    }

    /// Splits an attachment download into its JSON metadata and its file.
    pub(super) fn parse(content_type: &str, body: &[u8]) -> Option<(Value, Vec<u8>)> {
        let parts = parts(body, boundary(content_type)?)?;
        let [meta, file] = parts.as_slice() else {
            return None;
        };
        let metadata = serde_json::from_slice(meta).ok()?;
        Some((metadata, file.to_vec()))
    }

}
