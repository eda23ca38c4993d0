use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

pub const PRODUCTION_HOST: &str = "https://api.procountor.com";
pub const TEST_HOST: &str = "https://pts-procountor.pubdev.azure.procountor.com";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^2[0-9]\.[0-9]{2}$").unwrap());

/// Which Procountor installation the client talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    /// The public test environment.
    #[default]
    Test,
    Production,
    /// Any other host, such as a local mock server.
    Custom(Url),
}

impl Environment {
    /// The host without a trailing slash.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Test => TEST_HOST,
            Self::Production => PRODUCTION_HOST,
            Self::Custom(url) => url.as_str().trim_end_matches('/'),
        }
    }
}

/// The API version selector.
///
/// Parsed from `latest`, `supported` or a `YY.MM` version string no older than `20.01`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ApiVersion {
    Latest,
    #[default]
    Supported,
    Specified(String),
}

impl ApiVersion {
    /// The path segment between the host and the resource path.
    #[must_use]
    pub fn segment(&self) -> String {
        match self {
            Self::Latest => "latest/api".to_string(),
            Self::Supported => "supported/api".to_string(),
            Self::Specified(version) => format!("v{}/api", version.replace('.', "")),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest" => Ok(Self::Latest),
            "supported" => Ok(Self::Supported),
            version if VERSION_PATTERN.is_match(version) => Ok(Self::Specified(version.to_string())),
            other => Err(Error::InvalidApiVersion(other.to_string())),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Supported => write!(f, "supported"),
            Self::Specified(version) => write!(f, "{version}"),
        }
    }
}

/// Where the client sends its requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub environment: Environment,
    pub api_version: ApiVersion,
}

impl Config {
    #[must_use]
    pub fn new(environment: Environment, api_version: ApiVersion) -> Self {
        Self {
            environment,
            api_version,
        }
    }

    /// Replaces the API version, validating the string first.
    pub fn with_api_version(mut self, api_version: &str) -> Result<Self> {
        self.api_version = api_version.parse()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn api_host(&self) -> &str {
        self.environment.host()
    }

    /// The versioned API root, always ending in a slash.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("{}/{}/", self.api_host(), self.api_version.segment())
    }

    pub fn token_url(&self) -> Result<Url> {
        Url::parse(&format!("{}oauth/token/", self.api_url())).map_err(|_| Error::InvalidEndpoint)
    }

    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse(&format!("{}oauth/authz", self.api_url())).map_err(|_| Error::InvalidEndpoint)
    }

    /// The logout endpoint lives on the bare host, outside the versioned API root.
    pub fn logout_url(&self) -> Result<Url> {
        Url::parse(&format!("{}/logout", self.api_host())).map_err(|_| Error::InvalidEndpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_versions() {
        for version in ["latest", "supported", "20.01", "21.12", "29.99"] {
            assert!(version.parse::<ApiVersion>().is_ok(), "{version} should parse");
        }
    }

    #[test]
    fn rejects_unknown_versions() {
        for version in ["", "v20.01", "19.01", "20.1", "2001", "20.011", "30.01", "Latest", " 20.01"] {
            let error = version.parse::<ApiVersion>().unwrap_err();
            assert!(matches!(error, Error::InvalidApiVersion(_)), "{version} should fail");
            assert!(error.is_configuration());
        }
    }

    #[test]
    fn version_segments() {
        assert_eq!(ApiVersion::Latest.segment(), "latest/api");
        assert_eq!(ApiVersion::Supported.segment(), "supported/api");
        assert_eq!("20.01".parse::<ApiVersion>().unwrap().segment(), "v2001/api");
    }

    #[test]
    fn resolves_urls() {
        let config = Config::default().with_api_version("22.03").unwrap();
        assert_eq!(config.api_url(), format!("{TEST_HOST}/v2203/api/"));
        assert_eq!(
            config.token_url().unwrap().as_str(),
            format!("{TEST_HOST}/v2203/api/oauth/token/")
        );
        assert_eq!(config.logout_url().unwrap().as_str(), format!("{TEST_HOST}/logout"));

        let production = Config::new(Environment::Production, ApiVersion::Latest);
        assert_eq!(production.api_url(), "https://api.procountor.com/latest/api/");
    }

    #[test]
    fn custom_host_drops_trailing_slash() {
        let environment = Environment::Custom(Url::parse("http://127.0.0.1:8080/").unwrap());
        let config = Config::default().with_environment(environment);
        assert_eq!(config.api_url(), "http://127.0.0.1:8080/supported/api/");
    }
}
