//! Chain client for authorization verification.
//!
//! [`TokenChain`] is the seam between the gate and the token contract. The
//! JSON-RPC implementation simulates `transferWithAuthorization` with
//! `eth_call` - a read-only dry run that exercises the contract's own
//! signature and domain-separator checks without moving funds - and reads
//! `authorizationState` live for nonce consumption. Nonce state is never
//! cached locally, so correctness survives process restarts and
//! multi-instance deployment.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::authorization::{AuthorizationTuple, Signature};
use crate::error::{AuthorizationError, ChainError};

/// Selector for `transferWithAuthorization(address,address,uint256,uint256,uint256,bytes32,uint8,bytes32,bytes32)`.
const TRANSFER_WITH_AUTHORIZATION: [u8; 4] = [0xe3, 0xee, 0x16, 0x0e];

/// Selector for `authorizationState(address,bytes32)`.
const AUTHORIZATION_STATE: [u8; 4] = [0xe9, 0x4a, 0x01, 0x02];

/// Read-only view of the token contract's authorization state.
#[async_trait]
pub trait TokenChain: Send + Sync {
    /// Whether the contract accepts the signature for this exact tuple
    /// (domain separator included). Must not mutate chain state.
    async fn verify_authorization(
        &self,
        token: &str,
        auth: &AuthorizationTuple,
        signature: &Signature,
    ) -> Result<bool, ChainError>;

    /// Whether the owner's nonce has already been consumed on-chain.
    async fn is_nonce_consumed(
        &self,
        token: &str,
        owner: &str,
        nonce: &[u8; 32],
    ) -> Result<bool, ChainError>;
}

/// JSON-RPC implementation of [`TokenChain`].
pub struct RpcTokenChain {
    http: reqwest::Client,
    rpc_url: String,
    call_timeout: Duration,
}

impl RpcTokenChain {
    /// Create a client against an Ethereum-compatible JSON-RPC endpoint.
    pub fn new(rpc_url: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            call_timeout,
        }
    }

    async fn eth_call(&self, to: &str, calldata: &[u8]) -> Result<RpcOutcome, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": to, "data": format!("0x{}", hex::encode(calldata)) },
                "latest"
            ]
        });

        let request = self.http.post(&self.rpc_url).json(&body).send();
        let response = tokio::time::timeout(self.call_timeout, request)
            .await
            .map_err(|_| ChainError::Timeout)?
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let parsed: RpcResponse = tokio::time::timeout(self.call_timeout, response.json())
            .await
            .map_err(|_| ChainError::Timeout)?
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = parsed.error {
            debug!(code = error.code, message = %error.message, "eth_call reverted");
            return Ok(RpcOutcome::Reverted);
        }
        match parsed.result {
            Some(result) => Ok(RpcOutcome::Returned(result)),
            None => Err(ChainError::InvalidResponse(
                "response carried neither result nor error".to_string(),
            )),
        }
    }
}

enum RpcOutcome {
    Returned(String),
    Reverted,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[async_trait]
impl TokenChain for RpcTokenChain {
    async fn verify_authorization(
        &self,
        token: &str,
        auth: &AuthorizationTuple,
        signature: &Signature,
    ) -> Result<bool, ChainError> {
        let calldata = encode_transfer_with_authorization(auth, signature)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        match self.eth_call(token, &calldata).await? {
            RpcOutcome::Returned(_) => Ok(true),
            RpcOutcome::Reverted => Ok(false),
        }
    }

    async fn is_nonce_consumed(
        &self,
        token: &str,
        owner: &str,
        nonce: &[u8; 32],
    ) -> Result<bool, ChainError> {
        let mut calldata = Vec::with_capacity(4 + 64);
        calldata.extend_from_slice(&AUTHORIZATION_STATE);
        calldata.extend_from_slice(
            &encode_address(owner).map_err(|e| ChainError::InvalidResponse(e.to_string()))?,
        );
        calldata.extend_from_slice(nonce);

        match self.eth_call(token, &calldata).await? {
            RpcOutcome::Returned(result) => decode_bool_word(&result),
            RpcOutcome::Reverted => Err(ChainError::InvalidResponse(
                "authorizationState reverted".to_string(),
            )),
        }
    }
}

/// ABI-encode the full `transferWithAuthorization` call for an eth_call dry
/// run.
fn encode_transfer_with_authorization(
    auth: &AuthorizationTuple,
    signature: &Signature,
) -> Result<Vec<u8>, AuthorizationError> {
    let mut data = Vec::with_capacity(4 + 32 * 9);
    data.extend_from_slice(&TRANSFER_WITH_AUTHORIZATION);
    data.extend_from_slice(&encode_address(&auth.from)?);
    data.extend_from_slice(&encode_address(&auth.to)?);
    data.extend_from_slice(&encode_u256(auth.value()?));
    data.extend_from_slice(&encode_u256(
        u128::try_from(auth.valid_after()?)
            .map_err(|_| AuthorizationError::InvalidField("validAfter is negative".to_string()))?,
    ));
    data.extend_from_slice(&encode_u256(
        u128::try_from(auth.valid_before()?)
            .map_err(|_| AuthorizationError::InvalidField("validBefore is negative".to_string()))?,
    ));
    data.extend_from_slice(&auth.nonce_bytes()?);
    data.extend_from_slice(&encode_u256(u128::from(signature.v)));
    data.extend_from_slice(&signature.r);
    data.extend_from_slice(&signature.s);
    Ok(data)
}

/// Left-pad a 20-byte address into a 32-byte ABI word.
fn encode_address(address: &str) -> Result<[u8; 32], AuthorizationError> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    let bytes = hex::decode(stripped)
        .map_err(|_| AuthorizationError::InvalidField(format!("address: {}", address)))?;
    if bytes.len() != 20 {
        return Err(AuthorizationError::InvalidField(format!(
            "address must be 20 bytes: {}",
            address
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Big-endian encode an amount into a 32-byte ABI word.
fn encode_u256(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode a returned 32-byte word as a boolean.
fn decode_bool_word(result: &str) -> Result<bool, ChainError> {
    let stripped = result.strip_prefix("0x").unwrap_or(result);
    if stripped.is_empty() {
        return Err(ChainError::InvalidResponse("empty call result".to_string()));
    }
    let bytes = hex::decode(stripped)
        .map_err(|_| ChainError::InvalidResponse(format!("non-hex result: {}", result)))?;
    Ok(bytes.iter().any(|&b| b != 0))
}

pub mod mock {
    //! Scriptable in-memory chain for tests and dev servers.

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::authorization::{AuthorizationTuple, Signature};
    use crate::error::ChainError;

    use super::TokenChain;

    /// Mock implementation of [`TokenChain`].
    ///
    /// Signatures verify by default; script outcomes with [`set_valid`],
    /// [`consume_nonce`], and [`set_unavailable`].
    ///
    /// [`set_valid`]: MockTokenChain::set_valid
    /// [`consume_nonce`]: MockTokenChain::consume_nonce
    /// [`set_unavailable`]: MockTokenChain::set_unavailable
    #[derive(Default)]
    pub struct MockTokenChain {
        valid: AtomicBool,
        unavailable: AtomicBool,
        consumed: Mutex<HashSet<String>>,
    }

    impl MockTokenChain {
        /// A chain that accepts every signature and knows no consumed nonces.
        #[must_use]
        pub fn accepting() -> Self {
            let chain = Self::default();
            chain.valid.store(true, Ordering::SeqCst);
            chain
        }

        /// Script whether signature verification succeeds.
        pub fn set_valid(&self, valid: bool) {
            self.valid.store(valid, Ordering::SeqCst);
        }

        /// Script the chain as unreachable.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Mark a nonce as consumed on-chain, as settlement would.
        pub fn consume_nonce(&self, owner: &str, nonce: &[u8; 32]) {
            self.consumed
                .lock()
                .expect("mock chain lock poisoned")
                .insert(Self::key(owner, nonce));
        }

        fn key(owner: &str, nonce: &[u8; 32]) -> String {
            format!("{}:{}", owner.to_lowercase(), hex::encode(nonce))
        }
    }

    #[async_trait]
    impl TokenChain for MockTokenChain {
        async fn verify_authorization(
            &self,
            _token: &str,
            _auth: &AuthorizationTuple,
            _signature: &Signature,
        ) -> Result<bool, ChainError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ChainError::Timeout);
            }
            Ok(self.valid.load(Ordering::SeqCst))
        }

        async fn is_nonce_consumed(
            &self,
            _token: &str,
            owner: &str,
            nonce: &[u8; 32],
        ) -> Result<bool, ChainError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ChainError::Timeout);
            }
            Ok(self
                .consumed
                .lock()
                .expect("mock chain lock poisoned")
                .contains(&Self::key(owner, nonce)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTokenChain;
    use super::*;

    fn tuple() -> AuthorizationTuple {
        AuthorizationTuple {
            from: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
            to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            value: "10000".to_string(),
            valid_after: "0".to_string(),
            valid_before: "2524608000".to_string(),
            nonce: format!("0x{}", "cd".repeat(32)),
        }
    }

    fn signature() -> Signature {
        Signature {
            v: 27,
            r: [0x11; 32],
            s: [0x22; 32],
        }
    }

    #[test]
    fn address_encodes_left_padded() {
        let word = encode_address("0x857b06519E91e3A54538791bDbb0E22373e36b66").unwrap();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(word[12], 0x85);
        assert_eq!(word[31], 0x66);
    }

    #[test]
    fn short_address_is_rejected() {
        assert!(encode_address("0x1234").is_err());
    }

    #[test]
    fn u256_encodes_big_endian() {
        let word = encode_u256(10_000);
        assert_eq!(&word[..30], &[0u8; 30]);
        assert_eq!(word[30], 0x27);
        assert_eq!(word[31], 0x10);
    }

    #[test]
    fn transfer_calldata_has_selector_and_nine_words() {
        let data = encode_transfer_with_authorization(&tuple(), &signature()).unwrap();
        assert_eq!(data.len(), 4 + 32 * 9);
        assert_eq!(&data[..4], &TRANSFER_WITH_AUTHORIZATION);
        // nonce word sits sixth
        assert_eq!(&data[4 + 32 * 5..4 + 32 * 6], &[0xcd; 32]);
    }

    #[test]
    fn bool_word_decodes_zero_and_one() {
        assert!(!decode_bool_word(&format!("0x{}", "00".repeat(32))).unwrap());
        assert!(decode_bool_word(&format!("0x{}{}", "00".repeat(31), "01")).unwrap());
        assert!(decode_bool_word("0x").is_err());
    }

    #[tokio::test]
    async fn mock_chain_scripts_signature_validity() {
        let chain = MockTokenChain::accepting();
        assert!(chain
            .verify_authorization("0xtoken", &tuple(), &signature())
            .await
            .unwrap());

        chain.set_valid(false);
        assert!(!chain
            .verify_authorization("0xtoken", &tuple(), &signature())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mock_chain_tracks_consumed_nonces() {
        let chain = MockTokenChain::accepting();
        let nonce = [0xcd; 32];
        let owner = "0x857b06519E91e3A54538791bDbb0E22373e36b66";

        assert!(!chain.is_nonce_consumed("0xtoken", owner, &nonce).await.unwrap());
        chain.consume_nonce(owner, &nonce);
        assert!(chain.is_nonce_consumed("0xtoken", owner, &nonce).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_mock_chain_errors() {
        let chain = MockTokenChain::accepting();
        chain.set_unavailable(true);
        assert!(chain
            .verify_authorization("0xtoken", &tuple(), &signature())
            .await
            .is_err());
    }
}
