//! axum endpoints for the two legs of the flow.

use crate::events::RequestInfo;
use crate::handler::OAuth1Handler;
use crate::types::CallbackQuery;
use axum::{
    Router,
    extract::{OriginalUri, Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use ras_identity_core::{AuthenticationProperties, SignInManager};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Router exposing `GET <callback_path>` and `GET /challenge/<provider>`.
///
/// Failures are answered with a bare `500`; no diagnostic text reaches the browser.
pub struct OAuth1Routes {
    handler: Arc<OAuth1Handler>,
    sign_in: Arc<dyn SignInManager>,
}

#[derive(Clone)]
struct RoutesState {
    handler: Arc<OAuth1Handler>,
    sign_in: Arc<dyn SignInManager>,
}

#[derive(Debug, Deserialize)]
struct ChallengeQuery {
    #[serde(rename = "returnUrl")]
    return_url: Option<String>,
}

impl OAuth1Routes {
    pub fn new(handler: Arc<OAuth1Handler>, sign_in: Arc<dyn SignInManager>) -> Self {
        Self { handler, sign_in }
    }

    pub fn challenge_path(&self) -> String {
        self.handler.options().challenge_path()
    }

    /// Both paths were checked to be distinct literals when the handler was built.
    pub fn router(self) -> Router {
        let callback_path = self.handler.options().callback_path.clone();
        let challenge_path = self.challenge_path();

        Router::new()
            .route(&callback_path, get(callback))
            .route(&challenge_path, get(challenge))
            .with_state(RoutesState {
                handler: self.handler,
                sign_in: self.sign_in,
            })
    }
}

async fn challenge(
    State(state): State<RoutesState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<ChallengeQuery>,
    jar: CookieJar,
) -> Response {
    let request = request_info(&uri, &headers);

    // Only local destinations are accepted.
    let return_url = query
        .return_url
        .filter(|url| is_local_url(url))
        .unwrap_or_else(|| "/".to_string());
    let properties = AuthenticationProperties::new().with_redirect_uri(return_url);

    match state.handler.challenge(&request, properties).await {
        Ok(challenge) => {
            let options = state.handler.options();
            let cookie = Cookie::build((options.state_cookie_name.clone(), challenge.state))
                .path(options.callback_path.clone())
                .http_only(true)
                .secure(request.is_https())
                .same_site(SameSite::Lax);
            (jar.add(cookie), Redirect::to(&challenge.redirect_url)).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn callback(
    State(state): State<RoutesState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let request = request_info(&uri, &headers);
    let options = state.handler.options();

    let cookie_state = jar
        .get(&options.state_cookie_name)
        .map(|cookie| cookie.value().to_string());
    let jar = jar.remove(
        Cookie::build((options.state_cookie_name.clone(), ""))
            .path(options.callback_path.clone()),
    );

    let decision = match state
        .handler
        .handle_callback(&request, &query, cookie_state.as_deref())
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            error!("OAuth1 callback has no safe destination: {}", e);
            return (jar, StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    };

    if let Some((identity, properties)) = &decision.sign_in {
        if let Err(e) = state.sign_in.sign_in(identity, properties).await {
            error!("Sign-in failed: {}", e);
            return (jar, StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    }

    match decision.redirect_uri {
        Some(uri) => (jar, Redirect::to(&uri)).into_response(),
        None => (jar, StatusCode::NO_CONTENT).into_response(),
    }
}

/// Scheme and host as seen by the client, honouring `X-Forwarded-Proto`.
fn request_info(uri: &Uri, headers: &HeaderMap) -> RequestInfo {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .or(uri.scheme_str())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or(uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    RequestInfo::new(scheme, host, uri.path()).with_query(uri.query().unwrap_or_default())
}

fn is_local_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}
