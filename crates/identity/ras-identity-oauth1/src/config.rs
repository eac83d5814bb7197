//! OAuth 1.0a configuration types.

use crate::error::{OAuth1Error, OAuth1Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Longest accepted lifetime of a protected state value (one day)
pub const MAX_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Backchannel and redirect endpoints of one provider environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth1Endpoints {
    /// Endpoint used to obtain a request token
    pub request_token: String,
    /// Endpoint the user is redirected to in order to authorize the request token
    pub authorization: String,
    /// Endpoint used to exchange a verified request token for an access token
    pub access_token: String,
    /// Endpoint used to obtain user information after authentication
    pub user_profile: String,
}

impl OAuth1Endpoints {
    pub fn production() -> Self {
        Self {
            request_token: "https://secure.trademe.co.nz/Oauth/RequestToken".to_string(),
            authorization: "https://secure.trademe.co.nz/Oauth/Authorize".to_string(),
            access_token: "https://secure.trademe.co.nz/Oauth/AccessToken".to_string(),
            user_profile: "https://api.trademe.co.nz/v1/MyTradeMe/Summary.json".to_string(),
        }
    }

    pub fn sandbox() -> Self {
        Self {
            request_token: "https://secure.tmsandbox.co.nz/Oauth/RequestToken".to_string(),
            authorization: "https://secure.tmsandbox.co.nz/Oauth/Authorize".to_string(),
            access_token: "https://secure.tmsandbox.co.nz/Oauth/AccessToken".to_string(),
            user_profile: "https://api.tmsandbox.co.nz/v1/MyTradeMe/Summary.json".to_string(),
        }
    }

    /// Every endpoint under one base URL, e.g. a mock server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            request_token: format!("{}/Oauth/RequestToken", base),
            authorization: format!("{}/Oauth/Authorize", base),
            access_token: format!("{}/Oauth/AccessToken", base),
            user_profile: format!("{}/v1/MyTradeMe/Summary.json", base),
        }
    }

    fn validate(&self) -> OAuth1Result<()> {
        for (name, value) in [
            ("request_token", &self.request_token),
            ("authorization", &self.authorization),
            ("access_token", &self.access_token),
            ("user_profile", &self.user_profile),
        ] {
            let url = Url::parse(value).map_err(|e| {
                OAuth1Error::ConfigError(format!("Endpoint '{}' is not a valid URL: {}", name, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(OAuth1Error::ConfigError(format!(
                    "Endpoint '{}' must be an absolute http(s) URL",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for OAuth1Endpoints {
    fn default() -> Self {
        Self::production()
    }
}

/// OAuth 1.0a flow options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth1Options {
    /// Name of the authentication scheme, used as claim issuer
    pub authentication_type: String,
    /// Text a sign-in page can show for this provider
    pub caption: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub endpoints: OAuth1Endpoints,
    /// Permissions requested from the provider
    pub scopes: Vec<String>,
    /// Path the provider redirects back to
    pub callback_path: String,
    pub backchannel_timeout_seconds: u64,
    /// Authentication type the identity is re-issued under when signing in
    pub sign_in_as_authentication_type: Option<String>,
    pub state_ttl_seconds: u64,
    pub state_cookie_name: String,
}

impl Default for OAuth1Options {
    fn default() -> Self {
        Self {
            authentication_type: "TradeMe".to_string(),
            caption: "TradeMe".to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            endpoints: OAuth1Endpoints::default(),
            scopes: vec!["MyTradeMeRead".to_string()],
            callback_path: "/signin-trademe".to_string(),
            backchannel_timeout_seconds: 60,
            sign_in_as_authentication_type: None,
            state_ttl_seconds: 600, // 10 minutes
            state_cookie_name: "__OAuth1State".to_string(),
        }
    }
}

impl OAuth1Options {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoints(mut self, endpoints: OAuth1Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    pub fn with_backchannel_timeout(mut self, seconds: u64) -> Self {
        self.backchannel_timeout_seconds = seconds;
        self
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_sign_in_as(mut self, authentication_type: impl Into<String>) -> Self {
        self.sign_in_as_authentication_type = Some(authentication_type.into());
        self
    }

    pub fn backchannel_timeout(&self) -> Duration {
        Duration::from_secs(self.backchannel_timeout_seconds)
    }

    /// Path of the route that starts the flow, e.g. `/challenge/trademe`
    pub fn challenge_path(&self) -> String {
        format!("/challenge/{}", self.authentication_type.to_lowercase())
    }

    pub fn validate(&self) -> OAuth1Result<()> {
        if self.consumer_key.trim().is_empty() {
            return Err(OAuth1Error::ConfigError(
                "The 'consumer_key' option must be provided".to_string(),
            ));
        }
        if self.consumer_secret.trim().is_empty() {
            return Err(OAuth1Error::ConfigError(
                "The 'consumer_secret' option must be provided".to_string(),
            ));
        }
        if self.authentication_type.trim().is_empty() {
            return Err(OAuth1Error::ConfigError(
                "The 'authentication_type' option must be provided".to_string(),
            ));
        }
        check_route_path("Callback path", &self.callback_path)?;
        check_route_path("Challenge path", &self.challenge_path())?;
        if self.callback_path == self.challenge_path() {
            return Err(OAuth1Error::ConfigError(format!(
                "Callback path '{}' collides with the challenge path",
                self.callback_path
            )));
        }
        if self.backchannel_timeout_seconds == 0 {
            return Err(OAuth1Error::ConfigError(
                "Backchannel timeout must be positive".to_string(),
            ));
        }
        if !(1..=MAX_STATE_TTL_SECONDS).contains(&self.state_ttl_seconds) {
            return Err(OAuth1Error::ConfigError(format!(
                "State TTL must be between 1 and {} seconds",
                MAX_STATE_TTL_SECONDS
            )));
        }
        if self.state_cookie_name.is_empty() {
            return Err(OAuth1Error::ConfigError(
                "State cookie name must not be empty".to_string(),
            ));
        }
        self.endpoints.validate()
    }
}

/// Routes are mounted literally, so axum path syntax is not allowed.
fn check_route_path(name: &str, path: &str) -> OAuth1Result<()> {
    if !path.starts_with('/') {
        return Err(OAuth1Error::ConfigError(format!(
            "{} '{}' must start with '/'",
            name, path
        )));
    }
    let has_capture = path.contains(['{', '}', '*']) || path.split('/').any(|s| s.starts_with(':'));
    if has_capture || path.contains(['?', '#']) {
        return Err(OAuth1Error::ConfigError(format!(
            "{} '{}' must be a literal path",
            name, path
        )));
    }
    Ok(())
}
