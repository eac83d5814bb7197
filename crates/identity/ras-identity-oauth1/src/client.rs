//! Token exchange and profile calls against the provider's backchannel.

use crate::config::{OAuth1Endpoints, OAuth1Options};
use crate::error::{OAuth1Error, OAuth1Result};
use crate::signer::{OAuth1Signer, SignedParameters, TokenCredentials};
use crate::transport::{Backchannel, BackchannelRequest, BackchannelResponse};
use crate::types::{AccessToken, Profile, RequestToken};
use http::Method;
use ras_identity_core::AuthenticationProperties;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

/// OAuth 1.0a client for the request-token, access-token and profile calls
#[derive(Clone)]
pub struct OAuth1Client {
    signer: OAuth1Signer,
    backchannel: Arc<dyn Backchannel>,
    endpoints: OAuth1Endpoints,
    scopes: Vec<String>,
}

impl OAuth1Client {
    pub fn new(options: &OAuth1Options, backchannel: Arc<dyn Backchannel>) -> Self {
        Self {
            signer: OAuth1Signer::new(&options.consumer_key, &options.consumer_secret),
            backchannel,
            endpoints: options.endpoints.clone(),
            scopes: options.scopes.clone(),
        }
    }

    /// Obtain temporary credentials for `callback_url`.
    ///
    /// A provider that does not confirm the callback (including one that omits
    /// `oauth_callback_confirmed` altogether) is rejected.
    pub async fn request_token(
        &self,
        callback_url: &str,
        properties: AuthenticationProperties,
    ) -> OAuth1Result<RequestToken> {
        let mut url = Url::parse(&self.endpoints.request_token)?;
        if !self.scopes.is_empty() {
            url.query_pairs_mut()
                .append_pair("scope", &self.scopes.join(","));
        }

        let signed = self.signer.sign(
            &Method::POST,
            &url,
            &[("oauth_callback".to_string(), callback_url.to_string())],
            None,
        );
        let response = self
            .send(Method::POST, url, signed, "request token")
            .await?;

        let fields = parse_form(&response.body);
        let token = required(&fields, "oauth_token")?;
        let token_secret = required(&fields, "oauth_token_secret")?;
        let callback_confirmed = fields
            .get("oauth_callback_confirmed")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if !callback_confirmed {
            error!("Request token response did not confirm the callback URL");
            return Err(OAuth1Error::CallbackNotConfirmed);
        }

        debug!("Obtained request token");
        Ok(RequestToken {
            token,
            token_secret,
            callback_confirmed,
            properties,
        })
    }

    /// Exchange an authorized request token and its verifier for an access token
    pub async fn exchange_for_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> OAuth1Result<AccessToken> {
        let url = Url::parse(&self.endpoints.access_token)?;
        let signed = self.signer.sign(
            &Method::POST,
            &url,
            &[("oauth_verifier".to_string(), verifier.to_string())],
            Some(TokenCredentials {
                token: &request_token.token,
                secret: &request_token.token_secret,
            }),
        );
        let response = self
            .send(Method::POST, url, signed, "access token")
            .await?;

        let fields = parse_form(&response.body);
        let access_token = AccessToken {
            token: required(&fields, "oauth_token")?,
            token_secret: required(&fields, "oauth_token_secret")?,
        };

        info!("Successfully exchanged request token for access token");
        Ok(access_token)
    }

    /// Fetch the authenticated member's profile document
    pub async fn fetch_profile(&self, access_token: &AccessToken) -> OAuth1Result<Profile> {
        let url = Url::parse(&self.endpoints.user_profile)?;
        let signed = self.signer.sign(
            &Method::GET,
            &url,
            &[],
            Some(TokenCredentials {
                token: &access_token.token,
                secret: &access_token.token_secret,
            }),
        );
        let response = self.send(Method::GET, url, signed, "user profile").await?;

        let document: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| OAuth1Error::InvalidProfile(e.to_string()))?;
        let profile = Profile::from_json(document)?;

        debug!(member_id = ?profile.member_id, "Retrieved user profile");
        Ok(profile)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        signed: SignedParameters,
        endpoint: &'static str,
    ) -> OAuth1Result<BackchannelResponse> {
        let response = self
            .backchannel
            .send(BackchannelRequest {
                method,
                url,
                authorization: signed.authorization_header(),
            })
            .await?;

        if !response.status.is_success() {
            error!(
                status = response.status.as_u16(),
                "{} request failed", endpoint
            );
            return Err(OAuth1Error::UnexpectedStatus {
                endpoint,
                status: response.status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn required(fields: &HashMap<String, String>, name: &'static str) -> OAuth1Result<String> {
    fields
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(OAuth1Error::MissingField(name))
}
