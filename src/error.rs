use miette::Diagnostic;
use reqwest::StatusCode;
use thiserror::Error;
use tracing_error::SpanTrace;

/// Errors that can occur when interacting with the Procountor API.
///
/// Only configuration, authentication and transport failures are errors. A resource call that
/// reaches the server always yields an [`ApiResponse`](crate::ApiResponse), whatever its status.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("invalid api version {0:?}")]
    #[diagnostic(
        code(procountor::invalid_api_version),
        help("Valid values are `latest`, `supported` or an API version >= 20.01, such as `20.01`")
    )]
    InvalidApiVersion(String),

    #[error("query parameters must be a flat mapping: {0}")]
    #[diagnostic(
        code(procountor::invalid_query),
        help("Pass a map or a struct whose fields are strings, numbers or booleans")
    )]
    InvalidQuery(String),

    #[error("environment variable {0} is not set")]
    #[diagnostic(
        code(procountor::missing_environment_variable),
        help("Export the variable or construct the credentials explicitly")
    )]
    MissingEnvironmentVariable(&'static str),

    #[error("invalid redirect uri: {0}")]
    #[diagnostic(
        code(procountor::invalid_redirect_uri),
        help("The redirect uri must be an absolute URL registered for the client")
    )]
    InvalidRedirectUri(#[source] url::ParseError),

    #[error("endpoint could not be parsed as a URL")]
    #[diagnostic(
        code(procountor::invalid_endpoint),
        help("Check that the API endpoint URL is correctly formatted")
    )]
    InvalidEndpoint,

    /// The token or authorization endpoint answered with an unexpected status. The client
    /// cannot be used without a token, so this is always fatal.
    #[error("authentication failed ({status}): {message}")]
    #[diagnostic(
        code(procountor::authentication),
        help("Verify the client credentials, the environment and the API version")
    )]
    Authentication {
        status: StatusCode,
        message: String,
        span_trace: SpanTrace,
    },

    /// The token endpoint answered successfully but the token could not be read.
    #[error("cannot read the token response: {message}")]
    #[diagnostic(
        code(procountor::parse),
        help("The token endpoint returned data in an unexpected format")
    )]
    Parse {
        message: String,
        span_trace: SpanTrace,
    },

    #[error("error making request: {0:?}")]
    #[diagnostic(
        code(procountor::request_error),
        help("Check your network connection and Procountor API availability")
    )]
    Request(#[source] reqwest::Error),

    #[error("error encoding request body: {0}")]
    #[diagnostic(code(procountor::serialization_error))]
    Serialization(#[source] serde_json::Error),

    #[error("invalid header value")]
    #[diagnostic(
        code(procountor::invalid_header_value),
        help("The access token contains characters that are not allowed in an HTTP header")
    )]
    InvalidHeaderValue(#[source] reqwest::header::InvalidHeaderValue),

    #[error("error reading attachment: {0}")]
    #[diagnostic(
        code(procountor::io),
        help("Check that the attachment file exists and is readable")
    )]
    Io(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn authentication(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%status, %message, "authentication failed");
        Self::Authentication {
            status,
            message,
            span_trace: SpanTrace::capture(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            span_trace: SpanTrace::capture(),
        }
    }

    /// The span trace captured when the error was created, if any.
    #[must_use]
    pub fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            Self::Authentication { span_trace, .. } | Self::Parse { span_trace, .. } => {
                Some(span_trace)
            }
            _ => None,
        }
    }

    /// Whether this error stems from configuration rather than from the server.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidApiVersion(_)
                | Self::InvalidQuery(_)
                | Self::MissingEnvironmentVariable(_)
                | Self::InvalidRedirectUri(_)
                | Self::InvalidEndpoint
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeaderValue(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Type alias for results from this crate.
///
/// This is already a Miette diagnostic result due to the implementation of
/// the Diagnostic trait for the Error type.
pub type Result<O> = std::result::Result<O, Error>;
