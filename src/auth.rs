//! Credential acquisition for the destination API.
//!
//! A configured token is used as-is. Otherwise a username/password pair is
//! exchanged for a token, registering the user first when the destination
//! does not know it yet. Failure never aborts the run: it only disables the
//! load stage.

use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::http_client::{ApiClient, HttpError};

/// Header scheme used when none is configured.
pub const DEFAULT_AUTH_SCHEME: &str = "JWT";

/// Errors raised while requesting a token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Token response from {url} has no access_token")]
    MissingToken { url: String },
}

/// A token plus the scheme it is presented with.
#[derive(Clone)]
pub struct Credential {
    scheme: String,
    token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(scheme: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            token: token.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token.trim())
    }
}

/// Pick the credential for `client`: a token wins over username/password.
///
/// Returns `None`, after logging a warning, when no credential can be had.
pub fn resolve_credential(
    client: &ApiClient,
    username: Option<&str>,
    password: Option<&str>,
    token: Option<&str>,
    scheme: &str,
) -> Option<Credential> {
    if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
        return Some(Credential::new(scheme, token));
    }
    let (Some(username), Some(password)) = (username, password) else {
        warn!(
            "No token or username/password given; loading into {} is disabled.",
            client.base_url()
        );
        return None;
    };
    match request_token(client, username, password) {
        Ok(token) => {
            info!("Acquired token for user '{username}'.");
            Some(Credential::new(scheme, token))
        }
        Err(err) => {
            warn!(
                "Could not get token for {}: {err}; loading is disabled.",
                client.base_url()
            );
            None
        }
    }
}

/// Exchange a username and password for a token, registering the user if needed.
pub fn request_token(
    client: &ApiClient,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    let login = json!({"username": username, "password": password});
    match client.get_json(&user_url(client, username)) {
        Ok(_) => debug!("User '{username}' exists."),
        Err(HttpError::Status { status, .. }) => {
            debug!("User lookup returned HTTP {status}; trying to create user '{username}'.");
            if let Err(err) = client.post_json(&client.endpoint("register"), &login) {
                debug!("Registering '{username}' failed: {err}");
            }
        }
        Err(err) => return Err(err.into()),
    }
    debug!("Getting token for user '{username}'.");
    let auth_url = client.endpoint("auth");
    let response = client.post_json(&auth_url, &login)?;
    response
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthError::MissingToken { url: auth_url })
}

fn user_url(client: &ApiClient, username: &str) -> String {
    let base = client.endpoint("user");
    let Ok(mut url) = Url::parse(&base) else {
        return format!("{base}/{username}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(username);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::RetryConfig;

    fn client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9/api", RetryConfig::default())
    }

    #[test]
    fn token_wins_over_username_and_password() {
        let credential =
            resolve_credential(&client(), Some("user"), Some("pw"), Some(" abc "), "JWT").unwrap();
        assert_eq!(credential.header_value(), "JWT abc");
    }

    #[test]
    fn missing_credentials_disable_loading() {
        assert!(resolve_credential(&client(), Some("user"), None, None, "JWT").is_none());
        assert!(resolve_credential(&client(), None, None, Some("  "), "JWT").is_none());
    }

    #[test]
    fn user_url_escapes_the_name() {
        assert_eq!(user_url(&client(), "a b/c"), "http://127.0.0.1:9/api/user/a%20b%2Fc");
    }

    #[test]
    fn debug_redacts_the_token() {
        let rendered = format!("{:?}", Credential::new("Bearer", "s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
