//! The session manager: owns the credentials and the current token.

use oauth2::AccessToken;
use reqwest::{
    Method,
    header::{self, HeaderMap, HeaderValue},
};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::Result;
use crate::headers::content_type_for;
use crate::oauth::{Authenticator, Credentials, Token};

/// Holds the credentials and the single token used to authorize every request.
///
/// The token is replaced in place by [`Session::refresh`]. Two tasks that both see a `401` at the
/// same time will each refresh; the session does not coalesce concurrent refreshes.
#[derive(Debug)]
pub struct Session {
    credentials: Credentials,
    token: RwLock<Token>,
}

impl Session {
    /// Runs the credentials' flow once and returns a session holding the resulting token.
    #[instrument(skip_all)]
    pub async fn authenticate(
        credentials: Credentials,
        http: &reqwest::Client,
        config: &Config,
    ) -> Result<Self> {
        let token = credentials.authenticate(http, config).await?;
        info!("authenticated");
        Ok(Self::with_token(credentials, token))
    }

    /// Restores a session from a previously obtained token without contacting the server.
    #[must_use]
    pub fn with_token(credentials: Credentials, token: Token) -> Self {
        Self {
            credentials,
            token: RwLock::new(token),
        }
    }

    /// Obtains a new token, stores it and returns it.
    #[instrument(skip_all)]
    pub async fn refresh(&self, http: &reqwest::Client, config: &Config) -> Result<Token> {
        let current = self.token().await;
        let token = self.credentials.refresh(http, config, &current).await?;
        *self.token.write().await = token.clone();
        debug!("token refreshed");
        Ok(token)
    }

    /// A copy of the current token, for callers that persist it.
    #[must_use]
    pub async fn token(&self) -> Token {
        self.token.read().await.clone()
    }

    /// A copy of the current access token.
    #[must_use]
    pub async fn access_token(&self) -> AccessToken {
        self.token.read().await.access_token().clone()
    }

    /// The `Authorization` header carrying the current access token.
    pub async fn authorization(&self) -> Result<HeaderMap> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", self.access_token().await.secret()))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// The headers to attach to a request for `path`: the bearer token, and the content type
    /// unless the multipart encoder provides it.
    pub async fn headers_for(&self, method: &Method, path: &str) -> Result<HeaderMap> {
        let mut headers = self.authorization().await?;
        if let Some(content_type) = content_type_for(method, path) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        Ok(headers)
    }
}
