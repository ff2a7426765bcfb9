//! HTTP client used for the token and profile calls.

use crate::config::BungieAuthenticationOptions;
use crate::error::{BungieError, BungieResult};
use reqwest::{Client, Response};
use tracing::debug;

/// Build the backchannel client for a set of options.
///
/// A caller-supplied client is used as is. Otherwise a client with the
/// configured timeout is built; pinned root certificates replace the
/// built-in trust store.
pub fn build_client(options: &BungieAuthenticationOptions) -> BungieResult<Client> {
    if let Some(client) = &options.backchannel_client {
        if !options.backchannel_root_certificates.is_empty() {
            return Err(BungieError::ConfigError(
                "pinned root certificates cannot be applied to a custom backchannel client"
                    .to_string(),
            ));
        }
        return Ok(client.clone());
    }

    let mut builder = Client::builder().timeout(options.backchannel_timeout);

    if !options.backchannel_root_certificates.is_empty() {
        debug!(
            "Pinning {} backchannel root certificate(s)",
            options.backchannel_root_certificates.len()
        );
        builder = builder.tls_built_in_root_certs(false);
        for certificate in &options.backchannel_root_certificates {
            builder = builder.add_root_certificate(certificate.clone());
        }
    }

    Ok(builder.build()?)
}

/// Read a response body, failing once it grows past `limit` bytes
pub async fn read_bounded(mut response: Response, limit: usize) -> BungieResult<Vec<u8>> {
    if let Some(length) = response.content_length() {
        if length > limit as u64 {
            return Err(BungieError::ResponseTooLarge(limit));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(BungieError::ResponseTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
