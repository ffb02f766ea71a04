/// Flow State Token
///
/// Anti-CSRF correlation value round-tripped through the browser: issued in
/// a cookie scoped to the initiating path and echoed back by the provider in
/// the `state` query parameter.
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::fmt;
use subtle::ConstantTimeEq;

use super::config::StateCookieConfig;
use super::error::AuthError;

/// Bytes of OS randomness behind each token
pub const STATE_TOKEN_BYTES: usize = 64;

#[derive(Clone, PartialEq, Eq)]
pub struct FlowStateToken(String);

impl FlowStateToken {
    /// Draw a fresh token from the operating system CSPRNG.
    pub fn generate() -> Result<Self, AuthError> {
        let mut bytes = [0u8; STATE_TOKEN_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| AuthError::StateGeneration(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FlowStateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlowStateToken([REDACTED])")
    }
}

/// Constant-time comparison of the cookie value and the submitted `state`.
pub fn state_matches(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

/// `Set-Cookie` value issuing `token` for the callback at `path`.
pub fn state_cookie(config: &StateCookieConfig, token: &FlowStateToken, path: &str) -> String {
    format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}{}",
        config.name,
        token.as_str(),
        cookie_path(path),
        config.max_age_secs,
        config.same_site.as_str(),
        if config.secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value that expires the state cookie for `path`.
pub fn expired_state_cookie(config: &StateCookieConfig, path: &str) -> String {
    format!(
        "{}=; Path={}; Max-Age=0; HttpOnly; SameSite={}{}",
        config.name,
        cookie_path(path),
        config.same_site.as_str(),
        if config.secure { "; Secure" } else { "" }
    )
}

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (cookie_name, value) = cookie.trim().split_once('=')?;
            (cookie_name == name).then_some(value)
        })
}

// A path carrying attribute separators or whitespace would corrupt the
// Set-Cookie line; such requests get a site-wide cookie instead.
fn cookie_path(path: &str) -> &str {
    if path.starts_with('/')
        && !path
            .bytes()
            .any(|b| b == b';' || b == b',' || b.is_ascii_whitespace() || b.is_ascii_control())
    {
        path
    } else {
        "/"
    }
}
