use jsonwebtoken::dangerous::insecure_decode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

/// An access/refresh token pair as issued by the auth service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &fingerprint(&self.access_token))
            .field("refresh_token", &fingerprint(&self.refresh_token))
            .finish()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("access token is malformed or carries no expiry")]
    InvalidAccessToken,
    #[error("refresh token is malformed or carries no expiry")]
    InvalidRefreshToken,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }

    /// Decoded expiries of both tokens. A pair is only persisted when both are present.
    ///
    /// # Errors
    /// Returns which token failed to decode, lacked an `exp` claim or carried characters
    /// outside the compact token alphabet.
    pub fn expiries(&self) -> Result<(OffsetDateTime, OffsetDateTime), TokenError> {
        let access = Some(self.access_token.as_str())
            .filter(|token| is_compact_token(token))
            .and_then(token_expiry)
            .ok_or(TokenError::InvalidAccessToken)?;
        let refresh = Some(self.refresh_token.as_str())
            .filter(|token| is_compact_token(token))
            .and_then(token_expiry)
            .ok_or(TokenError::InvalidRefreshToken)?;
        Ok((access, refresh))
    }
}

/// Claims read from a bearer token. Every field is optional; callers decide what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    }
}

/// Decodes the claims of a JWT without verifying its signature.
///
/// The auth service is authoritative for signatures; the gate only needs the expiry
/// to decide whether a refresh is due. Malformed input yields `None`.
#[must_use]
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    insecure_decode::<TokenClaims>(token).ok().map(|data| data.claims)
}

/// Whether `token` only uses the compact JWS alphabet (base64url segments joined by `.`).
///
/// Anything else cannot be stored verbatim as a cookie value.
#[must_use]
pub fn is_compact_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'='))
}

/// Expiry of a token, or `None` when it should be treated as invalid.
#[must_use]
pub fn token_expiry(token: &str) -> Option<OffsetDateTime> {
    decode_claims(token)?.expires_at()
}

/// Short stable identifier for a token, safe to log.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
