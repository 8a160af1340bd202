//! Cookie-backed token storage.
//!
//! Both session cookies are always written together: a refreshed pair or a cleared
//! session is rendered as two `Set-Cookie` headers on the same response.

use crate::domain::token::{TokenPair, token_expiry};
use axum::http::{HeaderMap, HeaderValue, header};
use std::sync::{Mutex, PoisonError, RwLock};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

const HTTP_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

/// Holder of the current session tokens.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Replaces both tokens at once.
    fn store(&self, pair: &TokenPair);
    /// Drops both tokens.
    fn clear(&self);
}

/// Extract a cookie value from the Cookie header(s).
#[must_use]
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Whether `value` is a non-empty RFC 6265 `cookie-value` without quotes.
#[must_use]
pub fn is_cookie_value(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

/// Renders a session cookie. Without a known expiry the cookie lives for the browser session.
#[must_use]
pub fn session_cookie(name: &str, value: &str, expires: Option<OffsetDateTime>, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/");
    if let Some(formatted) = expires.and_then(|at| at.to_offset(UtcOffset::UTC).format(HTTP_DATE).ok()) {
        cookie.push_str("; Expires=");
        cookie.push_str(&formatted);
    }
    cookie.push_str("; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Renders a cookie that deletes `name` on the client.
#[must_use]
pub fn expired_cookie(name: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{name}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax{secure}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingWrite {
    Store(TokenPair),
    ClearAccess,
    ClearBoth,
}

#[derive(Debug, Default)]
struct JarState {
    access: Option<String>,
    refresh: Option<String>,
    pending: Option<PendingWrite>,
}

/// Per-request cookie jar: reads the incoming `Cookie` header and records the writes
/// that must be sent back on the response.
#[derive(Debug)]
pub struct RequestCookies {
    state: Mutex<JarState>,
    secure: bool,
}

impl RequestCookies {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let state = JarState {
            access: get_cookie(headers, ACCESS_COOKIE_NAME).map(str::to_string),
            refresh: get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_string),
            pending: None,
        };
        Self { state: Mutex::new(state), secure }
    }

    /// Drops only the access token, leaving the refresh cookie untouched.
    pub fn clear_access(&self) {
        let mut state = self.lock();
        state.access = None;
        state.pending = Some(PendingWrite::ClearAccess);
    }

    /// `Set-Cookie` values for the pending write, if any.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        let cookies = match &self.lock().pending {
            None => Vec::new(),
            Some(PendingWrite::Store(pair))
                if !is_cookie_value(&pair.access_token) || !is_cookie_value(&pair.refresh_token) =>
            {
                tracing::error!("Refusing to store a token pair that is not a valid cookie value");
                Vec::new()
            }
            Some(PendingWrite::Store(pair)) => vec![
                session_cookie(
                    ACCESS_COOKIE_NAME,
                    &pair.access_token,
                    token_expiry(&pair.access_token),
                    self.secure,
                ),
                session_cookie(
                    REFRESH_COOKIE_NAME,
                    &pair.refresh_token,
                    token_expiry(&pair.refresh_token),
                    self.secure,
                ),
            ],
            Some(PendingWrite::ClearAccess) => vec![expired_cookie(ACCESS_COOKIE_NAME, self.secure)],
            Some(PendingWrite::ClearBoth) => vec![
                expired_cookie(ACCESS_COOKIE_NAME, self.secure),
                expired_cookie(REFRESH_COOKIE_NAME, self.secure),
            ],
        };

        // Either every cookie of the write is emitted or none is.
        match cookies.iter().map(|cookie| HeaderValue::from_str(cookie)).collect::<Result<Vec<_>, _>>() {
            Ok(values) => values,
            Err(_) => {
                tracing::error!("Refusing to emit session cookies with invalid header characters");
                Vec::new()
            }
        }
    }

    /// Appends the pending `Set-Cookie` headers to a response header map.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for value in self.set_cookie_headers() {
            headers.append(header::SET_COOKIE, value);
        }
    }

    /// Rewrites the request `Cookie` header so handlers behind the gate see the
    /// current session tokens instead of the ones the client sent.
    pub fn rewrite_request_cookies(&self, headers: &mut HeaderMap) {
        let state = self.lock();
        let mut parts: Vec<String> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter(|part| {
                let name = part.split_once('=').map_or(*part, |(name, _)| name).trim();
                !part.is_empty() && name != ACCESS_COOKIE_NAME && name != REFRESH_COOKIE_NAME
            })
            .map(str::to_string)
            .collect();

        if let Some(access) = &state.access {
            parts.push(format!("{ACCESS_COOKIE_NAME}={access}"));
        }
        if let Some(refresh) = &state.refresh {
            parts.push(format!("{REFRESH_COOKIE_NAME}={refresh}"));
        }

        headers.remove(header::COOKIE);
        if parts.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&parts.join("; ")) {
            headers.insert(header::COOKIE, value);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JarState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for RequestCookies {
    fn access_token(&self) -> Option<String> {
        self.lock().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.lock().refresh.clone()
    }

    fn store(&self, pair: &TokenPair) {
        let mut state = self.lock();
        state.access = Some(pair.access_token.clone());
        state.refresh = Some(pair.refresh_token.clone());
        state.pending = Some(PendingWrite::Store(pair.clone()));
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.access = None;
        state.refresh = None;
        state.pending = Some(PendingWrite::ClearBoth);
    }
}

/// In-process token store for API clients living outside a request cycle.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pair(pair: TokenPair) -> Self {
        Self { tokens: RwLock::new(Some(pair)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(|p| p.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(|p| p.refresh_token.clone())
    }

    fn store(&self, pair: &TokenPair) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
    }

    fn clear(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
