//! Core identity types shared between external identity providers and the host.
//!
//! Providers produce a [`ClaimsIdentity`] together with the caller's
//! [`AuthenticationProperties`]; the host persists the result through its own
//! [`SignInManager`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Well-known claim type URIs.
pub mod claim_types {
    pub const NAME_IDENTIFIER: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
    pub const NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
    pub const EMAIL: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
}

/// Value type attached to plain string claims.
pub const XML_SCHEMA_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity has no authentication type")]
    MissingAuthenticationType,

    /// Returned by a [`SignInManager`] that refuses to persist the identity
    #[error("Sign-in rejected: {0}")]
    SignInRejected(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub value_type: String,
    pub issuer: String,
}

impl Claim {
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: XML_SCHEMA_STRING.to_string(),
            issuer: issuer.into(),
        }
    }
}

/// A set of claims asserted by one authentication type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    authentication_type: String,
    claims: Vec<Claim>,
}

impl ClaimsIdentity {
    pub fn new(authentication_type: impl Into<String>) -> IdentityResult<Self> {
        let authentication_type = authentication_type.into();
        if authentication_type.trim().is_empty() {
            return Err(IdentityError::MissingAuthenticationType);
        }

        Ok(Self {
            authentication_type,
            claims: Vec::new(),
        })
    }

    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.add_claim(claim);
        self
    }

    pub fn remove_claims(&mut self, claim_type: &str) -> usize {
        let before = self.claims.len();
        self.claims.retain(|c| c.claim_type != claim_type);
        before - self.claims.len()
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    /// Value of the name claim, if any.
    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME).map(|c| c.value.as_str())
    }

    /// Copy of this identity under a different authentication type.
    pub fn retyped(&self, authentication_type: impl Into<String>) -> IdentityResult<Self> {
        let mut identity = Self::new(authentication_type)?;
        identity.claims = self.claims.clone();
        Ok(identity)
    }
}

/// Caller state that survives an external sign-in round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProperties {
    /// Where the user is sent once the flow finishes.
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

impl AuthenticationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }
}

/// Host-side persistence of a completed external sign-in (cookie, session, token...).
#[async_trait]
pub trait SignInManager: Send + Sync {
    async fn sign_in(
        &self,
        identity: &ClaimsIdentity,
        properties: &AuthenticationProperties,
    ) -> IdentityResult<()>;
}
