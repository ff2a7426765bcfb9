//! Extension points invoked during the flow.

use crate::context::BungieAuthenticatedContext;
use crate::error::BungieResult;
use crate::return_endpoint::ReturnEndpointContext;
use async_trait::async_trait;

/// Hooks into the Bungie.net sign-in flow.
///
/// Both methods default to doing nothing. An error from `authenticated`
/// rejects the login; an error from `return_endpoint` fails the callback
/// with a server error.
#[async_trait]
pub trait BungieAuthenticationEvents: Send + Sync {
    /// Called after the profile has been mapped into an identity
    async fn authenticated(&self, _context: &mut BungieAuthenticatedContext) -> BungieResult<()> {
        Ok(())
    }

    /// Called before the callback response is produced, with or without an identity
    async fn return_endpoint(&self, _context: &mut ReturnEndpointContext) -> BungieResult<()> {
        Ok(())
    }
}

/// Events that leave the flow untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvents;

impl BungieAuthenticationEvents for DefaultEvents {}
