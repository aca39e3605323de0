//! Payment authorization parsing.
//!
//! The client supplies an EIP-3009-style "transfer with authorization" tuple
//! plus signature, wrapped in a base64 JSON envelope in the `X-PAYMENT`
//! header (x402 convention). Authorizations are ephemeral: parsed, verified,
//! and discarded - never persisted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// x402 protocol version this gate speaks.
pub const X402_VERSION: u8 = 1;

/// Payment scheme for fixed-price routes.
pub const SCHEME_EXACT: &str = "exact";

/// Decoded `X-PAYMENT` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    pub payload: ExactPaymentPayload,
}

/// Inner payload of the `exact` scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactPaymentPayload {
    pub signature: String,
    pub authorization: AuthorizationTuple,
}

/// The signed EIP-3009 tuple. Numeric fields travel as decimal strings and
/// byte fields as 0x-prefixed hex, exactly as the wallet produced them, so
/// the signature keeps matching what was signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationTuple {
    /// Payer address
    pub from: String,
    /// Receiving address
    pub to: String,
    /// Token amount in base units, decimal string
    pub value: String,
    /// Unix seconds after which the authorization is valid
    pub valid_after: String,
    /// Unix seconds until which the authorization is valid
    pub valid_before: String,
    /// 32-byte single-use nonce, 0x-prefixed hex
    pub nonce: String,
}

impl AuthorizationTuple {
    /// Token amount in base units.
    pub fn value(&self) -> Result<u128, AuthorizationError> {
        self.value
            .parse()
            .map_err(|_| AuthorizationError::InvalidField(format!("value: {}", self.value)))
    }

    /// Start of the validity window, unix seconds.
    pub fn valid_after(&self) -> Result<i64, AuthorizationError> {
        self.valid_after.parse().map_err(|_| {
            AuthorizationError::InvalidField(format!("validAfter: {}", self.valid_after))
        })
    }

    /// End of the validity window, unix seconds.
    pub fn valid_before(&self) -> Result<i64, AuthorizationError> {
        self.valid_before.parse().map_err(|_| {
            AuthorizationError::InvalidField(format!("validBefore: {}", self.valid_before))
        })
    }

    /// The nonce as raw bytes. Must decode to exactly 32 bytes.
    pub fn nonce_bytes(&self) -> Result<[u8; 32], AuthorizationError> {
        let stripped = self.nonce.strip_prefix("0x").unwrap_or(&self.nonce);
        let bytes = hex::decode(stripped)
            .map_err(|_| AuthorizationError::InvalidField(format!("nonce: {}", self.nonce)))?;
        bytes.try_into().map_err(|_| {
            AuthorizationError::InvalidField("nonce must be exactly 32 bytes".to_string())
        })
    }
}

/// A 65-byte secp256k1 signature split into its recovery parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Signature {
    /// Parse from 0x-prefixed hex of the 65-byte `r || s || v` layout.
    pub fn parse(hex_sig: &str) -> Result<Self, AuthorizationError> {
        let stripped = hex_sig.strip_prefix("0x").unwrap_or(hex_sig);
        let bytes = hex::decode(stripped)
            .map_err(|_| AuthorizationError::InvalidField("signature is not hex".to_string()))?;
        if bytes.len() != 65 {
            return Err(AuthorizationError::InvalidField(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { v: bytes[64], r, s })
    }
}

/// Decode an `X-PAYMENT` header value into a payment payload.
pub fn decode_payment_header(header: &str) -> Result<PaymentPayload, AuthorizationError> {
    let bytes = BASE64
        .decode(header.trim())
        .map_err(|e| AuthorizationError::MalformedEnvelope(format!("base64: {}", e)))?;
    let payload: PaymentPayload = serde_json::from_slice(&bytes)
        .map_err(|e| AuthorizationError::MalformedEnvelope(format!("json: {}", e)))?;
    if payload.scheme != SCHEME_EXACT {
        return Err(AuthorizationError::MalformedEnvelope(format!(
            "unsupported scheme: {}",
            payload.scheme
        )));
    }
    Ok(payload)
}

/// Encode a payment payload into an `X-PAYMENT` header value.
#[must_use]
pub fn encode_payment_header(payload: &PaymentPayload) -> String {
    // Serialization of our own types cannot fail.
    BASE64.encode(serde_json::to_vec(payload).unwrap_or_default())
}

/// Loose shape check for a 20-byte hex address.
#[must_use]
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}
