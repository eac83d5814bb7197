//! Extension hooks invoked during the callback leg.

use crate::error::OAuth1Result;
use crate::types::{AccessToken, Profile};
use async_trait::async_trait;
use futures::future::BoxFuture;
use ras_identity_core::{AuthenticationProperties, ClaimsIdentity};

/// The parts of the current HTTP request a flow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub scheme: String,
    /// Host including a non-default port
    pub host: String,
    pub path: String,
    pub query: Option<String>,
}

impl RequestInfo {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: path.into(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// `scheme://host`
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Absolute URL of the request
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}{}?{}", self.origin(), self.path, query),
            None => format!("{}{}", self.origin(), self.path),
        }
    }
}

/// Context of the `authenticated` hook.
///
/// Setting `identity` to `None` rejects the sign-in.
#[derive(Debug)]
pub struct AuthenticatedContext {
    pub request: RequestInfo,
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthenticationProperties,
    profile: Profile,
    access_token: AccessToken,
}

impl AuthenticatedContext {
    pub(crate) fn new(
        request: RequestInfo,
        profile: Profile,
        access_token: AccessToken,
        identity: ClaimsIdentity,
        properties: AuthenticationProperties,
    ) -> Self {
        Self {
            request,
            identity: Some(identity),
            properties,
            profile,
            access_token,
        }
    }

    /// The complete profile document
    pub fn raw_profile(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.profile.raw
    }

    pub fn member_id(&self) -> Option<&str> {
        self.profile.member_id.as_deref()
    }

    pub fn nickname(&self) -> Option<&str> {
        self.profile.nickname.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.profile.email.as_deref()
    }

    pub fn access_token(&self) -> &str {
        &self.access_token.token
    }

    pub fn access_token_secret(&self) -> &str {
        &self.access_token.token_secret
    }

    pub(crate) fn into_parts(self) -> (Option<ClaimsIdentity>, AuthenticationProperties, AccessToken) {
        (self.identity, self.properties, self.access_token)
    }
}

/// Context of the `return_endpoint` hook, run right before sign-in and redirect.
#[derive(Debug)]
pub struct ReturnEndpointContext {
    pub request: RequestInfo,
    /// `None` when the flow was denied or failed after the state was decoded
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthenticationProperties,
    /// Authentication type the identity is signed in under
    pub sign_in_as_authentication_type: Option<String>,
    request_completed: bool,
}

impl ReturnEndpointContext {
    pub(crate) fn new(
        request: RequestInfo,
        identity: Option<ClaimsIdentity>,
        properties: AuthenticationProperties,
        sign_in_as_authentication_type: Option<String>,
    ) -> Self {
        Self {
            request,
            identity,
            properties,
            sign_in_as_authentication_type,
            request_completed: false,
        }
    }

    /// The hook produced the response itself; no redirect is issued.
    pub fn request_completed(&mut self) {
        self.request_completed = true;
    }

    pub fn is_request_completed(&self) -> bool {
        self.request_completed
    }
}

/// Hooks an application can use to enrich, veto or redirect a sign-in.
#[async_trait]
pub trait OAuth1Events: Send + Sync {
    async fn authenticated(&self, _context: &mut AuthenticatedContext) -> OAuth1Result<()> {
        Ok(())
    }

    async fn return_endpoint(&self, _context: &mut ReturnEndpointContext) -> OAuth1Result<()> {
        Ok(())
    }
}

pub struct DefaultEvents;

impl OAuth1Events for DefaultEvents {}

type AuthenticatedCallback = Box<
    dyn for<'a> Fn(&'a mut AuthenticatedContext) -> BoxFuture<'a, OAuth1Result<()>>
        + Send
        + Sync,
>;
type ReturnEndpointCallback = Box<
    dyn for<'a> Fn(&'a mut ReturnEndpointContext) -> BoxFuture<'a, OAuth1Result<()>>
        + Send
        + Sync,
>;

/// [`OAuth1Events`] built from closures.
///
/// ```ignore
/// let events = EventCallbacks::new().on_authenticated(|ctx| {
///     Box::pin(async move {
///         ctx.properties.items.insert("source".into(), "trademe".into());
///         Ok(())
///     })
/// });
/// ```
#[derive(Default)]
pub struct EventCallbacks {
    on_authenticated: Option<AuthenticatedCallback>,
    on_return_endpoint: Option<ReturnEndpointCallback>,
}

impl EventCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_authenticated<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a mut AuthenticatedContext) -> BoxFuture<'a, OAuth1Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.on_authenticated = Some(Box::new(callback));
        self
    }

    pub fn on_return_endpoint<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a mut ReturnEndpointContext) -> BoxFuture<'a, OAuth1Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.on_return_endpoint = Some(Box::new(callback));
        self
    }
}

#[async_trait]
impl OAuth1Events for EventCallbacks {
    async fn authenticated(&self, context: &mut AuthenticatedContext) -> OAuth1Result<()> {
        match &self.on_authenticated {
            Some(callback) => callback(context).await,
            None => Ok(()),
        }
    }

    async fn return_endpoint(&self, context: &mut ReturnEndpointContext) -> OAuth1Result<()> {
        match &self.on_return_endpoint {
            Some(callback) => callback(context).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuth1Error;

    fn authenticated_context() -> AuthenticatedContext {
        let profile = Profile::from_json(serde_json::json!({
            "MemberId": 9,
            "Nickname": "nick",
            "Region": "Otago"
        }))
        .unwrap();
        AuthenticatedContext::new(
            RequestInfo::new("https", "app.example.com", "/signin-trademe"),
            profile,
            AccessToken {
                token: "at".to_string(),
                token_secret: "ats".to_string(),
            },
            ClaimsIdentity::new("TradeMe").unwrap(),
            AuthenticationProperties::new(),
        )
    }

    #[test]
    fn test_request_info_urls() {
        let request = RequestInfo::new("http", "localhost:3000", "/orders").with_query("page=2");
        assert_eq!(request.origin(), "http://localhost:3000");
        assert_eq!(request.url(), "http://localhost:3000/orders?page=2");
        assert!(!request.is_https());

        let request = RequestInfo::new("https", "app.example.com", "/").with_query("");
        assert_eq!(request.query, None);
        assert_eq!(request.url(), "https://app.example.com/");
    }

    #[test]
    fn test_authenticated_context_accessors() {
        let context = authenticated_context();
        assert_eq!(context.member_id(), Some("9"));
        assert_eq!(context.nickname(), Some("nick"));
        assert_eq!(context.email(), None);
        assert_eq!(context.raw_profile()["Region"], "Otago");
        assert_eq!(context.access_token(), "at");
        assert_eq!(context.access_token_secret(), "ats");
    }

    #[tokio::test]
    async fn test_default_events_change_nothing() {
        let mut context = authenticated_context();
        DefaultEvents.authenticated(&mut context).await.unwrap();
        assert!(context.identity.is_some());

        let mut context = ReturnEndpointContext::new(
            RequestInfo::new("https", "app.example.com", "/signin-trademe"),
            None,
            AuthenticationProperties::new(),
            None,
        );
        DefaultEvents.return_endpoint(&mut context).await.unwrap();
        assert!(!context.is_request_completed());
    }

    #[tokio::test]
    async fn test_callbacks_are_invoked() {
        let events = EventCallbacks::new()
            .on_authenticated(|ctx| {
                Box::pin(async move {
                    ctx.properties.items.insert("seen".into(), "yes".into());
                    Ok(())
                })
            })
            .on_return_endpoint(|ctx| {
                Box::pin(async move {
                    ctx.request_completed();
                    Err(OAuth1Error::Hook("stop".into()))
                })
            });

        let mut context = authenticated_context();
        events.authenticated(&mut context).await.unwrap();
        assert_eq!(context.properties.items["seen"], "yes");

        let mut context = ReturnEndpointContext::new(
            RequestInfo::new("https", "app.example.com", "/signin-trademe"),
            None,
            AuthenticationProperties::new(),
            None,
        );
        assert!(events.return_endpoint(&mut context).await.is_err());
        assert!(context.is_request_completed());
    }
}
