//! Client Reference Correlation
//!
//! A checkout session carries the member's ID in its client reference so the
//! success handler can find who paid. With a secret configured the reference
//! is signed (`uid=<id>&sig=<hex hmac>`) and the signature is checked when the
//! reference is read back.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BillingError, Result};

type HmacSha256 = Hmac<Sha256>;

const UID_PREFIX: &str = "uid=";
const SIG_SEPARATOR: &str = "&sig=";

/// Encodes and decodes session client references
#[derive(Clone, Default)]
pub struct ClientReferenceCodec {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for ClientReferenceCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientReferenceCodec")
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

impl ClientReferenceCodec {
    /// Plain `uid=<id>` references
    pub const fn unsigned() -> Self {
        Self { secret: None }
    }

    /// HMAC-SHA256 signed references
    pub fn signed(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Some(secret.as_ref().to_vec()),
        }
    }

    /// Signed if `CLIENT_REFERENCE_SECRET` is set and non-empty
    pub fn from_env() -> Self {
        match std::env::var("CLIENT_REFERENCE_SECRET") {
            Ok(secret) if !secret.is_empty() => Self::signed(secret),
            _ => Self::unsigned(),
        }
    }

    pub const fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    fn mac(&self, secret: &[u8], user_id: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| BillingError::Config(format!("client reference secret: {e}")))?;
        mac.update(user_id.as_bytes());
        Ok(mac)
    }

    /// Build the reference attached to a new session
    pub fn encode(&self, user_id: &str) -> Result<String> {
        match &self.secret {
            None => Ok(format!("{UID_PREFIX}{user_id}")),
            Some(secret) => {
                let tag = self.mac(secret, user_id)?.finalize().into_bytes();
                Ok(format!("{UID_PREFIX}{user_id}{SIG_SEPARATOR}{}", hex::encode(tag)))
            }
        }
    }

    /// Recover the user ID from a session's reference
    pub fn decode(&self, reference: &str) -> Result<String> {
        let reference = reference.trim();
        let body = reference.strip_prefix(UID_PREFIX).unwrap_or(reference);

        let Some(secret) = &self.secret else {
            if body.is_empty() {
                return Err(BillingError::ClientReference("empty user id".into()));
            }
            return Ok(body.to_string());
        };

        let (user_id, signature) = body
            .rsplit_once(SIG_SEPARATOR)
            .ok_or_else(|| BillingError::ClientReference("reference is not signed".into()))?;

        if user_id.is_empty() {
            return Err(BillingError::ClientReference("empty user id".into()));
        }

        let tag = hex::decode(signature)
            .map_err(|_| BillingError::ClientReference("signature is not hex".into()))?;

        self.mac(secret, user_id)?
            .verify_slice(&tag)
            .map_err(|_| BillingError::ClientReference("signature mismatch".into()))?;

        Ok(user_id.to_string())
    }
}
