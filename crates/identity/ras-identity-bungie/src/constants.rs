//! Bungie.net endpoints and defaults.

use std::time::Duration;

pub const AUTHORIZATION_ENDPOINT: &str = "https://www.bungie.net/en/oauth/authorize";
pub const TOKEN_ENDPOINT: &str = "https://www.bungie.net/platform/app/oauth/token/";
/// The membership id is appended verbatim
pub const USER_INFO_ENDPOINT: &str = "https://www.bungie.net/Platform/User/GetBungieNetUserById/";

pub const DEFAULT_AUTHENTICATION_TYPE: &str = "Bungie";
pub const DEFAULT_CALLBACK_PATH: &str = "/signin-bungie";
pub const DEFAULT_BACKCHANNEL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STATE_LIFETIME: Duration = Duration::from_secs(15 * 60);

/// Upper bound for token and profile response bodies (10 MiB)
pub const MAX_RESPONSE_CONTENT_BUFFER_SIZE: usize = 10 * 1024 * 1024;

pub const API_KEY_HEADER: &str = "X-API-Key";
