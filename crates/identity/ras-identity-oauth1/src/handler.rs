//! OAuth 1.0a flow controller.
//!
//! Two independent legs share nothing but the protected state value:
//!
//! * the start leg obtains a request token and redirects the browser to the
//!   provider's authorize page;
//! * the callback leg validates the provider's redirect, exchanges the
//!   verified request token, fetches the profile and produces an
//!   [`AuthenticationOutcome`] which [`OAuth1Handler::return_endpoint`] turns
//!   into a sign-in and a redirect.

use crate::client::OAuth1Client;
use crate::config::OAuth1Options;
use crate::error::{OAuth1Error, OAuth1Result};
use crate::events::{
    AuthenticatedContext, DefaultEvents, OAuth1Events, RequestInfo, ReturnEndpointContext,
};
use crate::identity::IdentityMapper;
use crate::state::{SealedStateFormat, StateDataFormat};
use crate::transport::{Backchannel, CertificatePins, HttpBackchannel};
use crate::types::{AuthenticationOutcome, CallbackQuery, RequestToken};
use ras_identity_core::{AuthenticationProperties, ClaimsIdentity};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

/// Redirect produced by the start leg
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Provider authorize URL carrying `oauth_token` and `state`
    pub redirect_url: String,
    /// Protected state, also suitable for a cookie
    pub state: String,
}

/// What the host does once the callback leg is over
#[derive(Debug)]
pub struct ReturnDecision {
    /// Identity to sign in, already under the sign-in authentication type
    pub sign_in: Option<(ClaimsIdentity, AuthenticationProperties)>,
    /// `None` when the return hook completed the request itself
    pub redirect_uri: Option<String>,
}

pub struct OAuth1Handler {
    options: OAuth1Options,
    client: OAuth1Client,
    state_format: Arc<dyn StateDataFormat>,
    events: Arc<dyn OAuth1Events>,
    mapper: IdentityMapper,
}

impl OAuth1Handler {
    pub fn builder(options: OAuth1Options) -> OAuth1HandlerBuilder {
        OAuth1HandlerBuilder::new(options)
    }

    pub fn options(&self) -> &OAuth1Options {
        &self.options
    }

    /// Absolute callback URL for the host the request arrived on
    pub fn callback_url(&self, request: &RequestInfo) -> String {
        format!("{}{}", request.origin(), self.options.callback_path)
    }

    /// Start leg: request token, protect it, build the authorize redirect.
    ///
    /// Without a caller-supplied `redirect_uri` the user returns to the
    /// current request URL. On failure no redirect must be issued.
    pub async fn challenge(
        &self,
        request: &RequestInfo,
        mut properties: AuthenticationProperties,
    ) -> OAuth1Result<Challenge> {
        if properties.redirect_uri.is_none() {
            properties.redirect_uri = Some(request.url());
        }

        let callback_url = self.callback_url(request);
        let request_token = self
            .client
            .request_token(&callback_url, properties)
            .await
            .inspect_err(|e| error!("Failed to obtain request token: {}", e))?;

        let state = self.state_format.protect(&request_token)?;

        let mut redirect_url = Url::parse(&self.options.endpoints.authorization)?;
        redirect_url
            .query_pairs_mut()
            .append_pair("oauth_token", &request_token.token)
            .append_pair("state", &state);

        info!(
            "Started OAuth1 flow for {}",
            self.options.authentication_type
        );

        Ok(Challenge {
            redirect_url: redirect_url.into(),
            state,
        })
    }

    /// Callback leg.
    ///
    /// `cookie_state` is consulted only when the query carries no state.
    pub async fn authenticate(
        &self,
        request: &RequestInfo,
        query: &CallbackQuery,
        cookie_state: Option<&str>,
    ) -> AuthenticationOutcome {
        let protected = query.state.as_deref().or(cookie_state);
        let Some(protected) = protected.filter(|s| !s.is_empty()) else {
            warn!("OAuth1 callback without state");
            return AuthenticationOutcome::Failed {
                error: OAuth1Error::InvalidState("missing".to_string()),
                properties: None,
            };
        };

        let request_token = match self.state_format.unprotect(protected) {
            Ok(token) => token,
            Err(e) => {
                warn!(security_event = true, "Rejected OAuth1 state: {}", e);
                return AuthenticationOutcome::Failed {
                    error: e,
                    properties: None,
                };
            }
        };
        let properties = request_token.properties.clone();

        let verifier = query.oauth_verifier.as_deref().filter(|v| !v.is_empty());
        let returned_token = query.oauth_token.as_deref().filter(|t| !t.is_empty());
        let (Some(verifier), Some(returned_token), None) =
            (verifier, returned_token, query.denied.as_ref())
        else {
            info!("User denied access to {}", self.options.authentication_type);
            return AuthenticationOutcome::Denied {
                error: OAuth1Error::AccessDenied {
                    reason: "access_denied",
                },
                properties,
            };
        };

        if returned_token != request_token.token {
            warn!(
                security_event = true,
                "OAuth1 callback token does not match the request token"
            );
            return AuthenticationOutcome::Failed {
                error: OAuth1Error::TokenMismatch,
                properties: Some(properties),
            };
        }

        match self
            .complete(request, &request_token, verifier, properties.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("OAuth1 callback failed: {}", e);
                AuthenticationOutcome::Failed {
                    error: e,
                    properties: Some(properties),
                }
            }
        }
    }

    async fn complete(
        &self,
        request: &RequestInfo,
        request_token: &RequestToken,
        verifier: &str,
        properties: AuthenticationProperties,
    ) -> OAuth1Result<AuthenticationOutcome> {
        let access_token = self
            .client
            .exchange_for_access_token(request_token, verifier)
            .await?;
        let profile = self.client.fetch_profile(&access_token).await?;
        let identity = self.mapper.to_identity(&profile, &access_token);

        let mut context =
            AuthenticatedContext::new(request.clone(), profile, access_token, identity, properties);
        self.events.authenticated(&mut context).await?;

        let (identity, properties, access_token) = context.into_parts();
        Ok(match identity {
            Some(identity) => {
                info!(
                    member = identity.name().unwrap_or_default(),
                    "Completed OAuth1 sign-in for {}", self.options.authentication_type
                );
                AuthenticationOutcome::Success {
                    identity,
                    access_token,
                    properties,
                }
            }
            None => {
                info!("Authenticated hook rejected the identity");
                AuthenticationOutcome::Denied {
                    error: OAuth1Error::AccessDenied { reason: "rejected" },
                    properties,
                }
            }
        })
    }

    /// Turn an outcome into a sign-in and a redirect.
    ///
    /// An outcome without recoverable properties has no safe destination and
    /// is returned as an error; the host answers it with a bare 500.
    pub async fn return_endpoint(
        &self,
        request: &RequestInfo,
        outcome: AuthenticationOutcome,
    ) -> OAuth1Result<ReturnDecision> {
        let (identity, properties) = match outcome {
            AuthenticationOutcome::Success {
                identity,
                properties,
                ..
            } => (Some(identity), properties),
            AuthenticationOutcome::Denied { properties, .. } => (None, properties),
            AuthenticationOutcome::Failed {
                properties: Some(properties),
                ..
            } => (None, properties),
            AuthenticationOutcome::Failed {
                error,
                properties: None,
            } => return Err(error),
        };

        let mut context = ReturnEndpointContext::new(
            request.clone(),
            identity,
            properties,
            self.options.sign_in_as_authentication_type.clone(),
        );
        self.events.return_endpoint(&mut context).await?;

        let sign_in = match context.identity.take() {
            Some(identity) => {
                let identity = match &context.sign_in_as_authentication_type {
                    Some(sign_in_as) if sign_in_as != identity.authentication_type() => {
                        identity.retyped(sign_in_as.as_str())?
                    }
                    _ => identity,
                };
                Some((identity, context.properties.clone()))
            }
            None => None,
        };

        let redirect_uri = if context.is_request_completed() {
            None
        } else {
            context.properties.redirect_uri.clone().map(|uri| {
                if sign_in.is_none() {
                    add_query_parameter(&uri, "error", "access_denied")
                } else {
                    uri
                }
            })
        };

        Ok(ReturnDecision {
            sign_in,
            redirect_uri,
        })
    }

    /// Callback leg followed by the return endpoint.
    pub async fn handle_callback(
        &self,
        request: &RequestInfo,
        query: &CallbackQuery,
        cookie_state: Option<&str>,
    ) -> OAuth1Result<ReturnDecision> {
        let outcome = self.authenticate(request, query, cookie_state).await;
        self.return_endpoint(request, outcome).await
    }
}

/// Append `key=value` to the query of a possibly relative URI, keeping any fragment.
fn add_query_parameter(uri: &str, key: &str, value: &str) -> String {
    let (base, fragment) = match uri.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (uri, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let pair: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();

    match fragment {
        Some(fragment) => format!("{}{}{}#{}", base, separator, pair, fragment),
        None => format!("{}{}{}", base, separator, pair),
    }
}

/// Assembles an [`OAuth1Handler`] from options and injected collaborators.
pub struct OAuth1HandlerBuilder {
    options: OAuth1Options,
    state_format: Option<Arc<dyn StateDataFormat>>,
    state_secret: Option<Vec<u8>>,
    events: Option<Arc<dyn OAuth1Events>>,
    backchannel: Option<Arc<dyn Backchannel>>,
    certificate_pins: Option<CertificatePins>,
}

impl OAuth1HandlerBuilder {
    pub fn new(options: OAuth1Options) -> Self {
        Self {
            options,
            state_format: None,
            state_secret: None,
            events: None,
            backchannel: None,
            certificate_pins: None,
        }
    }

    pub fn state_format(mut self, format: Arc<dyn StateDataFormat>) -> Self {
        self.state_format = Some(format);
        self
    }

    /// Use [`SealedStateFormat`] keyed by `secret`
    pub fn state_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.state_secret = Some(secret.into());
        self
    }

    pub fn events(mut self, events: Arc<dyn OAuth1Events>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn backchannel(mut self, backchannel: Arc<dyn Backchannel>) -> Self {
        self.backchannel = Some(backchannel);
        self
    }

    pub fn certificate_pins(mut self, pins: CertificatePins) -> Self {
        self.certificate_pins = Some(pins);
        self
    }

    pub fn build(self) -> OAuth1Result<OAuth1Handler> {
        self.options.validate()?;

        let backchannel: Arc<dyn Backchannel> = match (self.backchannel, self.certificate_pins) {
            (Some(_), Some(_)) => {
                return Err(OAuth1Error::ConfigError(
                    "Certificate pins cannot be combined with a custom backchannel".to_string(),
                ));
            }
            (Some(backchannel), None) => backchannel,
            (None, pins) => Arc::new(HttpBackchannel::new(
                self.options.backchannel_timeout(),
                pins.as_ref(),
            )?),
        };

        let state_format: Arc<dyn StateDataFormat> = match (self.state_format, self.state_secret)
        {
            (Some(_), Some(_)) => {
                return Err(OAuth1Error::ConfigError(
                    "Supply either a state format or a state secret, not both".to_string(),
                ));
            }
            (Some(format), None) => format,
            (None, Some(secret)) => {
                Arc::new(SealedStateFormat::for_options(&secret, &self.options)?)
            }
            (None, None) => {
                return Err(OAuth1Error::ConfigError(
                    "A state format or state secret must be supplied".to_string(),
                ));
            }
        };

        let mapper = IdentityMapper::new(&self.options.authentication_type)?;
        let client = OAuth1Client::new(&self.options, backchannel);

        Ok(OAuth1Handler {
            options: self.options,
            client,
            state_format,
            events: self.events.unwrap_or_else(|| Arc::new(DefaultEvents)),
            mapper,
        })
    }
}
