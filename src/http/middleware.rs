//! Identity tokens: HS256 verification and extraction from the upgrade request

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use sha2::Sha256;

use crate::rooms::Identity;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_NICKNAME: &str = "Guest";

/// Claims issued by the auth service
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// User id; numeric ids are accepted and kept as text
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl IdentityClaims {
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            nickname: self
                .nickname
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NICKNAME.to_string()),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Verify a token's signature and expiry and return its identity
pub fn verify_jwt(token: &str, secret: &str) -> Result<Identity, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());

    let provided = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: IdentityClaims =
        serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidToken)?;

    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims.into_identity())
}

/// Where the token arrived; a subprotocol token must be echoed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Query(String),
    Protocol(String),
    Bearer(String),
}

impl TokenSource {
    pub fn token(&self) -> &str {
        match self {
            TokenSource::Query(t) | TokenSource::Protocol(t) | TokenSource::Bearer(t) => t,
        }
    }
}

/// Find the token in `?token=`, `Sec-WebSocket-Protocol` or `Authorization`
pub fn extract_token(query: Option<&str>, headers: &HeaderMap) -> Option<TokenSource> {
    if let Some(token) = query.filter(|t| !t.is_empty()) {
        return Some(TokenSource::Query(token.to_string()));
    }
    if let Some(token) = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').map(str::trim).find(|t| !t.is_empty()))
    {
        return Some(TokenSource::Protocol(token.to_string()));
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .map(|t| TokenSource::Bearer(t.to_string()))
}

/// Extract JWT from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing identity token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}
