use reqwest::{Method, StatusCode, header::HeaderMap};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::{ApiVersion, Config, Environment};
use crate::endpoints::{Body, Endpoint, Headers};
use crate::error::Result;
use crate::oauth::{Credentials, Token};
use crate::response::ApiResponse;
use crate::session::Session;

/// This is the client that is used for interacting with the Procountor API. It owns the session
/// and sends every request with the current token, re-authenticating once when the server
/// answers `401 Unauthorized`.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    config: Config,
    session: Session,
}

impl Client {
    /// Authenticates with `credentials` and returns a ready client.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`](crate::Error::Authentication) when no token can be
    /// obtained; a client never exists without one.
    #[instrument(skip(credentials))]
    pub async fn new(credentials: impl Into<Credentials>, config: Config) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let session = Session::authenticate(credentials.into(), &http, &config).await?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    /// Validates `api_version` and then authenticates. An invalid version fails before any
    /// request is made.
    pub async fn connect(
        credentials: impl Into<Credentials>,
        environment: Environment,
        api_version: &str,
    ) -> Result<Self> {
        let api_version: ApiVersion = api_version.parse()?;
        Self::new(credentials, Config::new(environment, api_version)).await
    }

    /// Creates a client from a previously obtained token without authenticating.
    pub fn from_tokens(
        credentials: impl Into<Credentials>,
        config: Config,
        token: Token,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            config,
            session: Session::with_token(credentials.into(), token),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The headers a request for `path` would be sent with.
    pub async fn headers_for(&self, method: &Method, path: &str) -> Result<HeaderMap> {
        self.session.headers_for(method, path).await
    }

    /// Obtains a new token and stores it in the session.
    pub async fn refresh_access_token(&self) -> Result<Token> {
        self.session.refresh(&self.http, &self.config).await
    }

    /// Tells the server to revoke the current token.
    ///
    /// The token is kept locally; using the client afterwards gets a `401`, which triggers the
    /// usual refresh.
    #[instrument(skip(self))]
    pub async fn invalidate_token(&self) -> Result<ApiResponse> {
        let endpoint = Endpoint::post("logout")
            .with_url(self.config.logout_url()?)
            .with_headers(Headers::AuthorizationOnly);
        self.request(endpoint).await
    }

    /// Performs one API call. `body` is sent as JSON and `query` must be a flat mapping.
    pub async fn execute<Q: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &Q,
    ) -> Result<ApiResponse> {
        self.execute_with_headers(method, path, body, query, None)
            .await
    }

    /// Like [`Client::execute`], but `headers`, when given, replace the session's content-type
    /// policy. The bearer token is still added on every attempt.
    pub async fn execute_with_headers<Q: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &Q,
        headers: Option<HeaderMap>,
    ) -> Result<ApiResponse> {
        let mut endpoint = Endpoint::new(method, path).query(query)?;
        if let Some(body) = body {
            endpoint = endpoint.json(body)?;
        }
        if let Some(headers) = headers {
            endpoint = endpoint.with_headers(Headers::Custom(headers));
        }
        self.request(endpoint).await
    }

    /// Performs one API call, refreshing the token and retrying once on `401`.
    ///
    /// Only transport and authentication failures are errors; every status the server returns
    /// is reported through [`ApiResponse`].
    #[instrument(skip(self, endpoint), fields(method = %endpoint.method, path = %endpoint.path))]
    pub async fn request(&self, endpoint: Endpoint) -> Result<ApiResponse> {
        let url = endpoint.to_url(&self.config)?;

        let mut response = self.send(&endpoint, &url).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(%url, "request unauthorized, refreshing the token and retrying once");
            self.session.refresh(&self.http, &self.config).await?;
            response = self.send(&endpoint, &url).await?;
        }

        ApiResponse::from_response(response).await
    }

    async fn send(&self, endpoint: &Endpoint, url: &Url) -> Result<reqwest::Response> {
        let headers = match &endpoint.headers {
            Headers::Session => {
                self.session
                    .headers_for(&endpoint.method, &endpoint.path)
                    .await?
            }
            Headers::AuthorizationOnly => self.session.authorization().await?,
            Headers::Custom(custom) => {
                let mut headers = custom.clone();
                headers.extend(self.session.authorization().await?);
                headers
            }
        };

        let mut request = self
            .http
            .request(endpoint.method.clone(), url.clone())
            .headers(headers);
        request = match &endpoint.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Multipart(attachment) => request.multipart(attachment.form()?),
        };

        trace!(%url, "sending request");
        Ok(request.send().await?)
    }
}
