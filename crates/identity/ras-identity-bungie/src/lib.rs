//! Bungie.net sign-in for axum applications.
//!
//! Implements the OAuth2 Authorization Code flow against Bungie.net: a
//! challenged 401 becomes a redirect to the provider, the callback is checked
//! against a correlation cookie and a tamper-evident `state`, the code is
//! exchanged for a token and the user's profile is mapped into a
//! [`ClaimsIdentity`]. Establishing a session is left to the host's
//! [`SignInHandler`].

mod backchannel;
mod config;
mod constants;
mod context;
mod correlation;
mod error;
mod events;
mod handler;
mod middleware;
mod request;
mod return_endpoint;
mod state;


pub use backchannel::{build_client, read_bounded};
pub use config::{BungieAuthenticationOptions, BungieSettings, MIN_STATE_KEY_LEN};
pub use constants::*;
pub use context::{BungieAuthenticatedContext, TokenResponse};
pub use correlation::{CORRELATION_KEY, CorrelationGuard};
pub use error::{BungieError, BungieResult};
pub use events::{BungieAuthenticationEvents, DefaultEvents};
pub use handler::{AuthenticateOutcome, BungieAuthentication};
pub use middleware::{Challenge, bungie_authentication};
pub use request::RequestContext;
pub use return_endpoint::{ReturnDecision, ReturnEndpointContext, add_query_string};
pub use state::PropertiesDataFormat;

// Re-export common types for convenience
pub use ras_identity_core::{
    AuthProperties, AuthenticationTicket, Claim, ClaimsIdentity, IdentityError, SecureDataFormat,
    SignInHandler, claim_types,
};
