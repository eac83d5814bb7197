//! OAuth 1.0a three-legged sign-in for TradeMe-style providers.
//!
//! The [`OAuth1Handler`] runs the start leg (request token and authorize
//! redirect) and the callback leg (verifier check, access-token exchange,
//! profile fetch and identity mapping). No server-side session is kept: the
//! request token travels through the browser inside an authenticated,
//! encrypted state value produced by a [`StateDataFormat`].
//!
//! [`OAuth1Routes`] mounts both legs on an axum router and hands completed
//! identities to the host's [`SignInManager`].

mod client;
mod config;
mod error;
mod events;
mod handler;
mod identity;
mod routes;
mod signer;
mod state;
mod transport;
mod types;


pub use client::OAuth1Client;
pub use config::{MAX_STATE_TTL_SECONDS, OAuth1Endpoints, OAuth1Options};
pub use error::{ErrorKind, OAuth1Error, OAuth1Result};
pub use events::{
    AuthenticatedContext, DefaultEvents, EventCallbacks, OAuth1Events, RequestInfo,
    ReturnEndpointContext,
};
pub use handler::{Challenge, OAuth1Handler, OAuth1HandlerBuilder, ReturnDecision};
pub use identity::IdentityMapper;
pub use routes::OAuth1Routes;
pub use signer::{OAuth1Signer, SignedParameters, TokenCredentials, percent_encode};
pub use state::{SealedStateFormat, StateDataFormat};
pub use transport::{
    Backchannel, BackchannelRequest, BackchannelResponse, CertificatePins, HttpBackchannel,
    MAX_RESPONSE_BYTES,
};
pub use types::{AccessToken, AuthenticationOutcome, CallbackQuery, Profile, RequestToken};

// Re-export common types for convenience
pub use ras_identity_core::{AuthenticationProperties, ClaimsIdentity, SignInManager};
