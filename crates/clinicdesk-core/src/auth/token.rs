//! Token data and access-token expiry evaluation.
//!
//! Access tokens are JWTs: three dot-separated base64url segments whose middle
//! segment decodes to a JSON object with an `exp` claim (seconds since the
//! Unix epoch, UTC). Signatures are never verified here, the backend does that.
//! Anything that cannot be read is treated as expired.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::SessionError;

/// base64url that accepts both padded and unpadded segments
const JWT_SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A complete set of session credentials.
///
/// All four fields travel together. A set with any empty field is never
/// persisted (see [`TokenData::validate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct TokenData {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    pub role: String,
    pub email: String,
}

impl TokenData {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        role: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            role: role.into(),
            email: email.into(),
        }
    }

    /// Check that every field is present.
    pub fn validate(&self) -> Result<(), SessionError> {
        let fields = [
            ("access token", &self.access_token),
            ("refresh token", &self.refresh_token),
            ("role", &self.role),
            ("email", &self.email),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(SessionError::IncompleteTokens(name));
            }
        }
        Ok(())
    }
}

/// Read the `exp` claim of a JWT, if the token is well formed.
///
/// Returns `None` for the wrong number of segments, a payload that is not
/// base64url JSON, or a missing, zero or non-numeric `exp`.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = JWT_SEGMENT.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    if exp == 0.0 || !exp.is_finite() {
        return None;
    }

    Utc.timestamp_millis_opt((exp * 1000.0) as i64).single()
}

/// True if `token` is expired at `now`, or cannot be read at all.
pub fn is_token_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match token_expiry(token) {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

/// True if `token` is expired right now, or cannot be read at all.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now())
}
