//! Error types for the payment gate.

use thiserror::Error;

/// Errors from the chain client.
///
/// The gate maps every one of these to `VerificationUnavailable`; payment
/// verification never fails open.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level failure reaching the RPC endpoint.
    #[error("chain transport error: {0}")]
    Transport(String),

    /// The RPC call exceeded its time budget.
    #[error("chain call timed out")]
    Timeout,

    /// The node answered with something the client cannot interpret.
    #[error("invalid chain response: {0}")]
    InvalidResponse(String),
}

/// Errors loading the pricing table.
#[derive(Debug, Error)]
pub enum PricingError {
    /// Could not read the pricing file.
    #[error("failed to read pricing file: {0}")]
    Io(#[from] std::io::Error),

    /// The pricing file is not valid TOML for the expected shape.
    #[error("failed to parse pricing file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors decoding a payment header into an authorization.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The envelope is not base64-encoded JSON of the expected shape.
    #[error("malformed payment envelope: {0}")]
    MalformedEnvelope(String),

    /// A field inside an otherwise well-formed envelope cannot be parsed.
    #[error("invalid authorization field: {0}")]
    InvalidField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_timeout_displays() {
        assert_eq!(ChainError::Timeout.to_string(), "chain call timed out");
    }

    #[test]
    fn authorization_error_carries_detail() {
        let err = AuthorizationError::InvalidField("nonce must be 32 bytes".to_string());
        assert!(err.to_string().contains("nonce must be 32 bytes"));
    }
}
