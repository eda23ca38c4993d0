//! Credentials and the two token flows supported by the Procountor API.
//!
//! * [`ClientCredentials`] exchanges the client id, client secret and API key directly for an
//!   access token. There is no refresh token; renewing means exchanging again.
//! * [`ResourceOwner`] logs in with a username, password and company id to obtain an
//!   authorization code, then exchanges the code for an access token and a refresh token.

use oauth2::{
    AccessToken, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    ResourceOwnerPassword, ResourceOwnerUsername,
};
use reqwest::{StatusCode, header};
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

fn env_var(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::MissingEnvironmentVariable(name))
}

/// Stores the OAuth 2 client ID and client secret.
#[derive(Debug, Clone)]
pub struct KeyPair(pub(crate) ClientId, pub(crate) ClientSecret);

impl KeyPair {
    /// Creates a new `KeyPair` from the provided `client_id` and `client_secret` strings.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self(
            ClientId::new(client_id.into()),
            ClientSecret::new(client_secret.into()),
        )
    }

    /// Creates a new `KeyPair` from `PROCOUNTOR_CLIENT_ID` and `PROCOUNTOR_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            env_var("PROCOUNTOR_CLIENT_ID")?,
            env_var("PROCOUNTOR_CLIENT_SECRET")?,
        ))
    }

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.0
    }
}

fn redirect_url(redirect_uri: impl Into<String>) -> Result<RedirectUrl> {
    RedirectUrl::new(redirect_uri.into()).map_err(Error::InvalidRedirectUri)
}

/// The bearer token held by a session, and the refresh token when the flow issues one.
#[derive(Debug, Clone)]
pub struct Token {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
}

impl Token {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: AccessToken::new(access_token.into()),
            refresh_token: refresh_token.map(RefreshToken::new),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
}

/// Posts a form to the token endpoint and reads the token out of the answer.
#[instrument(skip(http, form))]
async fn request_token(http: &reqwest::Client, url: Url, form: &[(&str, &str)]) -> Result<Token> {
    let response = http
        .post(url)
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    debug!(%status, "token endpoint responded");

    match status {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => {
            return Err(Error::authentication(
                status,
                "Not found api endpoint. Please, check your API version.",
            ));
        }
        StatusCode::UNAUTHORIZED => {
            return Err(Error::authentication(
                status,
                "Authentication failed. Please, check your credentials.",
            ));
        }
        _ => {
            return Err(Error::authentication(
                status,
                format!(
                    "Authentication got an unexpected HTTP status code: {}. Content: {text}",
                    status.as_u16()
                ),
            ));
        }
    }

    let token: TokenResponse = serde_json::from_str(&text)
        .map_err(|e| Error::parse(format!("{e}. Response was: {text}")))?;

    match token.access_token {
        Some(access_token) => Ok(Token {
            access_token,
            refresh_token: token.refresh_token,
        }),
        None => Err(Error::parse(format!(
            "no access_token in the response. Response was: {text}"
        ))),
    }
}

/// A way of obtaining and renewing the bearer token.
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    /// Obtains the initial token.
    async fn authenticate(&self, http: &reqwest::Client, config: &Config) -> Result<Token>;

    /// Obtains a fresh token to replace `current`.
    async fn refresh(
        &self,
        http: &reqwest::Client,
        config: &Config,
        current: &Token,
    ) -> Result<Token>;
}

/// Client id, client secret and API key, exchanged directly for a token.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    key_pair: KeyPair,
    api_key: ClientSecret,
    redirect_url: RedirectUrl,
}

impl ClientCredentials {
    pub fn new(
        key_pair: KeyPair,
        api_key: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            key_pair,
            api_key: ClientSecret::new(api_key.into()),
            redirect_url: redirect_url(redirect_uri)?,
        })
    }

    /// Reads the client id and secret, `PROCOUNTOR_API_KEY` and `PROCOUNTOR_REDIRECT_URI`.
    pub fn from_env() -> Result<Self> {
        Self::new(
            KeyPair::from_env()?,
            env_var("PROCOUNTOR_API_KEY")?,
            env_var("PROCOUNTOR_REDIRECT_URI")?,
        )
    }
}

impl Authenticator for ClientCredentials {
    #[instrument(skip_all, fields(client_id = %self.key_pair.0.as_str()))]
    async fn authenticate(&self, http: &reqwest::Client, config: &Config) -> Result<Token> {
        request_token(
            http,
            config.token_url()?,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.key_pair.0.as_str()),
                ("client_secret", self.key_pair.1.secret().as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("api_key", self.api_key.secret().as_str()),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        http: &reqwest::Client,
        config: &Config,
        _current: &Token,
    ) -> Result<Token> {
        self.authenticate(http, config).await
    }
}

/// End-user credentials, exchanged for an authorization code and then for tokens.
#[derive(Debug, Clone)]
pub struct ResourceOwner {
    key_pair: KeyPair,
    username: ResourceOwnerUsername,
    password: ResourceOwnerPassword,
    company_id: String,
    redirect_url: RedirectUrl,
    /// Posts the login form. The authorization endpoint answers with a `302` whose `Location`
    /// carries the code, so this client never follows redirects.
    login_http: reqwest::Client,
}

impl ResourceOwner {
    pub fn new(
        key_pair: KeyPair,
        username: impl Into<String>,
        password: impl Into<String>,
        company_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            key_pair,
            username: ResourceOwnerUsername::new(username.into()),
            password: ResourceOwnerPassword::new(password.into()),
            company_id: company_id.into(),
            redirect_url: redirect_url(redirect_uri)?,
            login_http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
        })
    }

    /// Reads the client id and secret plus `PROCOUNTOR_USERNAME`, `PROCOUNTOR_PASSWORD`,
    /// `PROCOUNTOR_COMPANY_ID` and `PROCOUNTOR_REDIRECT_URI`.
    pub fn from_env() -> Result<Self> {
        Self::new(
            KeyPair::from_env()?,
            env_var("PROCOUNTOR_USERNAME")?,
            env_var("PROCOUNTOR_PASSWORD")?,
            env_var("PROCOUNTOR_COMPANY_ID")?,
            env_var("PROCOUNTOR_REDIRECT_URI")?,
        )
    }

    /// Logs in and returns the authorization code from the redirect.
    ///
    /// A relative `Location` is resolved against the authorization endpoint.
    #[instrument(skip_all, fields(username = %self.username.as_str()))]
    async fn authorize(&self, config: &Config) -> Result<AuthorizationCode> {
        let authorization_url = config.authorization_url()?;
        let state = CsrfToken::new_random();

        let response = self
            .login_http
            .post(authorization_url.clone())
            .form(&[
                ("response_type", "code"),
                ("client_id", self.key_pair.0.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("state", state.secret().as_str()),
                ("username", self.username.as_str()),
                ("password", self.password.secret().as_str()),
                ("company_id", self.company_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::FOUND {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::authentication(status, error_description(&text)));
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| authorization_url.join(v).ok())
            .ok_or_else(|| Error::authentication(status, "redirect without a valid Location"))?;

        let mut code = None;
        let mut description = None;
        for (key, value) in location.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                "state" if value.as_ref() != state.secret().as_str() => {
                    return Err(Error::authentication(status, "state mismatch in redirect"));
                }
                _ => {}
            }
        }

        code.map(AuthorizationCode::new).ok_or_else(|| {
            Error::authentication(
                status,
                description.unwrap_or_else(|| "no authorization code in redirect".to_string()),
            )
        })
    }
}

/// Picks the most useful description out of an authorization error body.
fn error_description(text: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        error_description: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(text) {
        Ok(ErrorBody {
            error_description: Some(description),
            ..
        })
        | Ok(ErrorBody {
            error: Some(description),
            ..
        }) => description,
        _ => text.to_string(),
    }
}

impl Authenticator for ResourceOwner {
    #[instrument(skip_all, fields(client_id = %self.key_pair.0.as_str()))]
    async fn authenticate(&self, http: &reqwest::Client, config: &Config) -> Result<Token> {
        let code = self.authorize(config).await?;
        debug!("received authorization code");

        request_token(
            http,
            config.token_url()?,
            &[
                ("grant_type", "authorization_code"),
                ("code", code.secret().as_str()),
                ("client_id", self.key_pair.0.as_str()),
                ("client_secret", self.key_pair.1.secret().as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
            ],
        )
        .await
    }

    #[instrument(skip_all, fields(client_id = %self.key_pair.0.as_str()))]
    async fn refresh(
        &self,
        http: &reqwest::Client,
        config: &Config,
        current: &Token,
    ) -> Result<Token> {
        let Some(refresh_token) = current.refresh_token() else {
            debug!("no refresh token held, logging in again");
            return self.authenticate(http, config).await;
        };

        let mut token = request_token(
            http,
            config.token_url()?,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.secret().as_str()),
                ("client_id", self.key_pair.0.as_str()),
                ("client_secret", self.key_pair.1.secret().as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
            ],
        )
        .await?;

        // The refresh token survives a refresh unless the server rotates it.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.clone());
        }
        Ok(token)
    }
}

/// The flow used by a session, selected by which credentials the caller supplies.
#[derive(Debug, Clone)]
pub enum Credentials {
    ClientCredentials(ClientCredentials),
    ResourceOwner(ResourceOwner),
}

impl From<ClientCredentials> for Credentials {
    fn from(credentials: ClientCredentials) -> Self {
        Self::ClientCredentials(credentials)
    }
}

impl From<ResourceOwner> for Credentials {
    fn from(credentials: ResourceOwner) -> Self {
        Self::ResourceOwner(credentials)
    }
}

impl Authenticator for Credentials {
    async fn authenticate(&self, http: &reqwest::Client, config: &Config) -> Result<Token> {
        match self {
            Self::ClientCredentials(flow) => flow.authenticate(http, config).await,
            Self::ResourceOwner(flow) => flow.authenticate(http, config).await,
        }
    }

    async fn refresh(
        &self,
        http: &reqwest::Client,
        config: &Config,
        current: &Token,
    ) -> Result<Token> {
        match self {
            Self::ClientCredentials(flow) => flow.refresh(http, config, current).await,
            Self::ResourceOwner(flow) => flow.refresh(http, config, current).await,
        }
    }
}
