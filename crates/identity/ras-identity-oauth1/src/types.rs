//! OAuth 1.0a protocol types.

use ras_identity_core::{AuthenticationProperties, ClaimsIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OAuth1Error;

/// Temporary credentials granted by the request-token endpoint.
///
/// Travels only inside the protected state value; it is consumed by exactly
/// one access-token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: String,
    pub callback_confirmed: bool,
    #[serde(default)]
    pub properties: AuthenticationProperties,
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .field("callback_confirmed", &self.callback_confirmed)
            .field("properties", &self.properties)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub token_secret: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Profile document returned by the provider.
///
/// The recognized fields are extracted best-effort; `raw` always holds the
/// complete JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub raw: serde_json::Map<String, serde_json::Value>,
    pub member_id: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
}

impl Profile {
    pub fn from_json(value: serde_json::Value) -> Result<Self, OAuth1Error> {
        let serde_json::Value::Object(raw) = value else {
            return Err(OAuth1Error::InvalidProfile(
                "profile document is not a JSON object".to_string(),
            ));
        };

        Ok(Self {
            member_id: field_as_string(&raw, "MemberId"),
            nickname: field_as_string(&raw, "Nickname"),
            email: field_as_string(&raw, "Email"),
            raw,
        })
    }
}

fn field_as_string(raw: &serde_json::Map<String, serde_json::Value>, name: &str) -> Option<String> {
    match raw.get(name)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Query parameters of the provider's redirect back to the callback path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    /// Present when the user refused access on the provider's page
    pub denied: Option<String>,
    /// Protected state echoed from the authorize redirect
    pub state: Option<String>,
}

/// Terminal value of one callback leg
#[derive(Debug)]
pub enum AuthenticationOutcome {
    Success {
        identity: ClaimsIdentity,
        access_token: AccessToken,
        properties: AuthenticationProperties,
    },
    Denied {
        /// Always [`OAuth1Error::AccessDenied`]
        error: OAuth1Error,
        properties: AuthenticationProperties,
    },
    Failed {
        error: OAuth1Error,
        /// Known only when the state could still be decoded
        properties: Option<AuthenticationProperties>,
    },
}

impl AuthenticationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthenticationOutcome::Success { .. })
    }

    pub fn properties(&self) -> Option<&AuthenticationProperties> {
        match self {
            AuthenticationOutcome::Success { properties, .. }
            | AuthenticationOutcome::Denied { properties, .. } => Some(properties),
            AuthenticationOutcome::Failed { properties, .. } => properties.as_ref(),
        }
    }
}
