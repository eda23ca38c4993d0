use std::path::Path;

use reqwest::{
    Method,
    header::HeaderMap,
    multipart::{Form, Part},
};
use serde::Serialize;
use serde_json::Value;
use url::{Url, form_urlencoded};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::headers::APPLICATION_JSON;

/// Serializes flat query parameters into a URL-encoded string, without the leading `?`.
///
/// `parameters` must serialize to a map (a `HashMap`, a `BTreeMap`, a struct or `json!({..})`)
/// whose values are strings, numbers or booleans. `null` values are left out, but `()` or `None`
/// in place of the map is rejected; pass an empty map for no query. Keys are emitted in sorted
/// order so the same parameters always produce the same string.
pub fn query_string<T: Serialize + ?Sized>(parameters: &T) -> Result<String> {
    let value = serde_json::to_value(parameters).map_err(|e| Error::InvalidQuery(e.to_string()))?;
    let map = match value {
        Value::Object(map) => map,
        other => return Err(Error::InvalidQuery(format!("expected a mapping, got {other}"))),
    };

    let mut pairs: Vec<(String, String)> = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            nested => {
                return Err(Error::InvalidQuery(format!(
                    "value of {key:?} is not a scalar: {nested}"
                )));
            }
        };
        pairs.push((key, value));
    }
    pairs.sort();

    Ok(form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish())
}

/// A file and its metadata, sent as a `multipart/form-data` body with a JSON `meta` part and a
/// `file` part.
#[derive(Debug, Clone)]
pub struct Attachment {
    meta: Value,
    file_name: String,
    content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        meta: &impl Serialize,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        Ok(Self {
            meta: serde_json::to_value(meta)?,
            file_name: file_name.into(),
            content: content.into(),
        })
    }

    /// Reads the file at `path`. The file is closed again before this returns.
    pub async fn from_path(meta: &impl Serialize, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self::new(meta, file_name, content)
    }

    /// Builds a fresh form. Forms are consumed by sending, so a retried request needs a new one.
    pub(crate) fn form(&self) -> Result<Form> {
        let meta = Part::text(serde_json::to_string(&self.meta)?).mime_str(APPLICATION_JSON)?;
        let file = Part::bytes(self.content.clone()).file_name(self.file_name.clone());
        Ok(Form::new().part("meta", meta).part("file", file))
    }
}

#[derive(Debug, Clone, Default)]
pub enum Body {
    /// Nothing is sent. Some gateways reject a JSON body on `GET`.
    #[default]
    Empty,
    Json(Value),
    Multipart(Attachment),
}

/// Where a request takes its headers from.
#[derive(Debug, Clone, Default)]
pub enum Headers {
    /// The session's headers for the method and path.
    #[default]
    Session,
    /// Only the bearer authorization header, with whatever token is current when sent.
    AuthorizationOnly,
    /// The caller's headers in place of the session's content-type policy. `Authorization` is
    /// always the session's current token, so a retry carries the refreshed one.
    Custom(HeaderMap),
}

/// One API call: method, path below the versioned API root, query, body.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) body: Body,
    pub(crate) headers: Headers,
    pub(crate) url: Option<Url>,
}

impl Endpoint {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            body: Body::Empty,
            headers: Headers::Session,
            url: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets the query parameters. See [`query_string`].
    pub fn query<T: Serialize + ?Sized>(mut self, parameters: &T) -> Result<Self> {
        self.query = query_string(parameters)?;
        Ok(self)
    }

    /// Sets a JSON body. `null` and `{}` leave the request without a body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = match serde_json::to_value(body)? {
            Value::Null => Body::Empty,
            Value::Object(map) if map.is_empty() => Body::Empty,
            value => Body::Json(value),
        };
        Ok(self)
    }

    #[must_use]
    pub fn multipart(mut self, attachment: Attachment) -> Self {
        self.body = Body::Multipart(attachment);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sends the request to `url` instead of below the versioned API root.
    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves the absolute URL: API root, path, then the query string when there is one.
    pub fn to_url(&self, config: &Config) -> Result<Url> {
        let mut url = match &self.url {
            Some(url) => url.clone(),
            None => Url::parse(&format!(
                "{}{}",
                config.api_url(),
                self.path.trim_start_matches('/')
            ))
            .map_err(|_| Error::InvalidEndpoint)?,
        };
        if !self.query.is_empty() {
            url.set_query(Some(&self.query));
        }
        Ok(url)
    }
}
