//! TradeMe sign-in demo
//!
//! Visit `/challenge/trademe?returnUrl=/` to start the OAuth 1.0a flow. Members
//! that completed it are listed as JSON on `/`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{Json, Router, extract::State, routing::get};
use ras_identity_core::{
    AuthenticationProperties, ClaimsIdentity, IdentityError, IdentityResult, SignInManager,
    claim_types,
};
use ras_identity_oauth1::{CertificatePins, EventCallbacks, OAuth1Handler, OAuth1Routes};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Debug, Clone, Serialize)]
struct SignedInMember {
    member_id: String,
    nickname: Option<String>,
    email: Option<String>,
    authentication_type: String,
}

/// Keeps every completed sign-in in memory; identities without a member id are refused
#[derive(Default)]
struct MemorySignIn {
    members: RwLock<Vec<SignedInMember>>,
}

#[async_trait]
impl SignInManager for MemorySignIn {
    async fn sign_in(
        &self,
        identity: &ClaimsIdentity,
        _properties: &AuthenticationProperties,
    ) -> IdentityResult<()> {
        let claim = |claim_type: &str| identity.find_first(claim_type).map(|c| c.value.clone());
        let Some(member_id) = claim(claim_types::NAME_IDENTIFIER) else {
            return Err(IdentityError::SignInRejected(
                "identity carries no member id".to_string(),
            ));
        };
        let member = SignedInMember {
            member_id,
            nickname: claim(claim_types::NAME),
            email: claim(claim_types::EMAIL),
            authentication_type: identity.authentication_type().to_string(),
        };

        info!(member_id = %member.member_id, "Member signed in");
        self.members.write().await.push(member);
        Ok(())
    }
}

async fn list_members(State(sign_in): State<Arc<MemorySignIn>>) -> Json<Vec<SignedInMember>> {
    Json(sign_in.members.read().await.clone())
}

fn load_pins(config: &Config) -> Result<Option<CertificatePins>> {
    if config.certificate_pins.is_empty() {
        return Ok(None);
    }

    let mut pins = CertificatePins::new();
    for path in &config.certificate_pins {
        let pem = std::fs::read(path)
            .with_context(|| format!("Failed to read pinned certificate {}", path.display()))?;
        pins = pins.add_pem(&pem)?;
    }
    Ok(Some(pins))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ras_identity_oauth1=debug")),
        )
        .with_target(false)
        .init();

    let config = Config::load()?;

    let events = EventCallbacks::new().on_authenticated(|ctx| {
        Box::pin(async move {
            info!(
                member_id = ctx.member_id().unwrap_or_default(),
                "TradeMe member authenticated"
            );
            Ok(())
        })
    });

    let mut builder = OAuth1Handler::builder(config.oauth.clone())
        .state_secret(config.state_secret.as_bytes())
        .events(Arc::new(events));
    if let Some(pins) = load_pins(&config)? {
        builder = builder.certificate_pins(pins);
    }
    let handler = Arc::new(builder.build()?);

    let sign_in = Arc::new(MemorySignIn::default());
    let app = Router::new()
        .route("/", get(list_members))
        .with_state(sign_in.clone())
        .merge(OAuth1Routes::new(handler, sign_in).router());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("TradeMe sign-in demo listening on http://{}", addr);
    info!(
        "Start a sign-in at http://{}/challenge/trademe?returnUrl=/",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ras_identity_core::Claim;

    #[tokio::test]
    async fn test_memory_sign_in_records_members() {
        let sign_in = MemorySignIn::default();
        let identity = ClaimsIdentity::new("ApplicationCookie")
            .unwrap()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "4000123", "TradeMe"))
            .with_claim(Claim::new(claim_types::NAME, "kiwi_seller", "TradeMe"));

        sign_in
            .sign_in(&identity, &AuthenticationProperties::new())
            .await
            .unwrap();

        let members = sign_in.members.read().await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_id, "4000123");
        assert_eq!(members[0].nickname.as_deref(), Some("kiwi_seller"));
        assert_eq!(members[0].authentication_type, "ApplicationCookie");
    }

    #[tokio::test]
    async fn test_memory_sign_in_refuses_anonymous_identity() {
        let sign_in = MemorySignIn::default();
        let identity = ClaimsIdentity::new("ApplicationCookie").unwrap();

        let result = sign_in
            .sign_in(&identity, &AuthenticationProperties::new())
            .await;

        assert!(matches!(result, Err(IdentityError::SignInRejected(_))));
        assert!(sign_in.members.read().await.is_empty());
    }
}
