use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use ras_identity_bungie::{
    BungieAuthentication, BungieAuthenticationOptions, Challenge, bungie_authentication,
};
use ras_identity_core::{AuthProperties, ClaimsIdentity, IdentityError, IdentityResult, SignInHandler};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_COOKIE: &str = "bungie_login_session";

/// In-memory sessions keyed by an opaque cookie value
#[derive(Clone, Default)]
struct Sessions {
    inner: Arc<RwLock<HashMap<String, ClaimsIdentity>>>,
}

impl Sessions {
    fn get(&self, id: &str) -> Option<ClaimsIdentity> {
        self.inner.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl SignInHandler for Sessions {
    fn authentication_type(&self) -> &str {
        "Cookies"
    }

    async fn sign_in(
        &self,
        _properties: &AuthProperties,
        identity: &ClaimsIdentity,
    ) -> IdentityResult<HeaderMap> {
        let id = URL_SAFE_NO_PAD.encode(thread_rng().r#gen::<[u8; 32]>());

        self.inner
            .write()
            .map_err(|_| IdentityError::SignInError("session store poisoned".to_string()))?
            .insert(id.clone(), identity.clone());

        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::SET_COOKIE,
            HeaderValue::from_str(&cookie.to_string())
                .map_err(|e| IdentityError::SignInError(e.to_string()))?,
        );
        Ok(headers)
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
  <body>
    <h1>Bungie.net sign-in demo</h1>
    <p><a href="/profile">View your profile</a></p>
  </body>
</html>"#,
    )
}

async fn profile_handler(State(sessions): State<Sessions>, jar: CookieJar) -> Response {
    let identity = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| sessions.get(cookie.value()));

    match identity {
        Some(identity) => Html(format!(
            "<h1>Welcome, {}</h1><p>Membership id: {}</p>",
            escape_html(identity.name().unwrap_or("Guardian")),
            escape_html(identity.name_identifier().unwrap_or_default())
        ))
        .into_response(),
        None => Challenge::bungie().into_response(),
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ras_identity_bungie=debug")),
        )
        .init();

    let options = BungieAuthenticationOptions::from_env()
        .context("BUNGIE_CLIENT_ID, BUNGIE_CLIENT_SECRET and BUNGIE_API_KEY must be set")?;

    let sessions = Sessions::default();
    let auth = BungieAuthentication::new(options)
        .context("Invalid Bungie.net configuration")?
        .with_sign_in(sessions.clone());

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/profile", get(profile_handler))
        .with_state(sessions)
        .layer(middleware::from_fn_with_state(auth, bungie_authentication));

    let bind_addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Server running on http://{}", bind_addr);
    warn!("Sessions are kept in memory and lost on restart");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
