use crate::schemas::MemberId;
use actix_web::{http::header::HeaderValue, HttpRequest};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("unusable signing key")]
    InvalidKey,
}

/// Issues and checks member access tokens of the form
/// `<member id>.<issued at, unix seconds>.<hex HMAC-SHA256 of the first two parts>`.
///
/// A token is accepted until `ttl` has passed since it was issued.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        let key = sha256_hasher.finalize();
        let mac = HmacSha256::new_from_slice(&key).map_err(|_| AuthError::InvalidKey)?;
        Ok(Self { mac, ttl })
    }

    pub fn issue(&self, member: MemberId, now: DateTime<Utc>) -> String {
        let claims = format!("{member}.{}", now.timestamp());
        let mut mac = self.mac.clone();
        mac.update(claims.as_bytes());
        let signature = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("{claims}.{signature}")
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<MemberId, AuthError> {
        let (claims, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let (member, issued_at) = claims.split_once('.').ok_or(AuthError::Malformed)?;
        let member_id: MemberId = member.parse().map_err(|_| AuthError::Malformed)?;
        let issued_at = issued_at
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or(AuthError::Malformed)?;
        let signature = decode_hex(signature).ok_or(AuthError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;
        if issued_at > now + Duration::seconds(CLOCK_SKEW_SECS) || now - issued_at > self.ttl {
            return Err(AuthError::Expired);
        }
        Ok(member_id)
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect()
}

/// The member behind the request's `Authorization: Bearer` header.
pub fn authenticate(request: &HttpRequest, signer: &TokenSigner) -> Result<MemberId, AuthError> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)
        .and_then(Result::ok)
        .ok_or(AuthError::Missing)?;
    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Missing)?;
    signer.verify(token.trim(), Utc::now())
}
