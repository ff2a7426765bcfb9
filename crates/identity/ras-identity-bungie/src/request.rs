//! The parts of an inbound request the flow looks at.

use axum::http::{HeaderMap, Uri, header};
use axum_extra::extract::cookie::CookieJar;
use url::form_urlencoded;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Scheme, host, path and cookies of the request being handled
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub scheme: String,
    pub host: String,
    /// Prefix the application is mounted under, empty or starting with '/'
    pub path_base: String,
    /// False when a path base was configured but the request path lies outside it
    pub within_path_base: bool,
    pub path: String,
    pub query: Option<String>,
    pub cookies: CookieJar,
}

impl RequestContext {
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let scheme = uri
            .scheme_str()
            .map(str::to_string)
            .or_else(|| {
                headers
                    .get(FORWARDED_PROTO)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_ascii_lowercase())
                    .filter(|v| v == "http" || v == "https")
            })
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        Self {
            scheme,
            host,
            path_base: String::new(),
            within_path_base: true,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            cookies: CookieJar::from_headers(headers),
        }
    }

    /// Mount the request under `path_base`, stripping it from the path.
    ///
    /// A request whose path does not start with `path_base` keeps its path
    /// untouched and is flagged as lying outside the mount.
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        let path_base = path_base.into();
        if path_base.is_empty() {
            return self;
        }

        let rest = match self.path.strip_prefix(path_base.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
            _ => {
                self.within_path_base = false;
                return self;
            }
        };

        self.path = if rest.is_empty() { "/".to_string() } else { rest };
        self.path_base = path_base;
        self
    }

    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// `scheme://host` followed by the path base
    pub fn base_uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_base)
    }

    /// The full URL of this request including the query string
    pub fn current_uri(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => {
                format!("{}{}?{}", self.base_uri(), self.path, query)
            }
            _ => format!("{}{}", self.base_uri(), self.path),
        }
    }

    /// Value of a query parameter that occurs exactly once
    pub fn query_value(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        let mut values = form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned());

        let first = values.next()?;
        if values.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|c| c.value())
    }
}
