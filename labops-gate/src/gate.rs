//! The payment gate state machine.
//!
//! `guard` validates authorizations; it never settles them. Settlement (the
//! actual on-chain transfer) belongs to the downstream premium handler, so
//! guarding the same unconsumed authorization twice allows twice - the gate
//! alone must not consume the nonce.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::authorization::{
    decode_payment_header, PaymentPayload, Signature, SCHEME_EXACT, X402_VERSION,
};
use crate::chain::TokenChain;
use crate::pricing::{PricingTable, RoutePrice};

/// Why a supplied authorization was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The contract does not accept the signature for this tuple
    InvalidSignature,
    /// `now` is past `validBefore`
    Expired,
    /// `now` is before `validAfter`
    NotYetValid,
    /// The authorized value is below the route price
    InsufficientAmount,
    /// The authorization is made out to the wrong receiving address
    InvalidRecipient,
    /// The nonce was already consumed on-chain
    NonceReused,
    /// Chain verification could not complete; never fail open
    VerificationUnavailable,
}

impl RejectReason {
    /// Stable identifier used in response bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::InsufficientAmount => "insufficient_amount",
            Self::InvalidRecipient => "invalid_recipient",
            Self::NonceReused => "nonce_reused",
            Self::VerificationUnavailable => "verification_unavailable",
        }
    }

    /// Whether the caller can fix this by constructing a new authorization.
    #[must_use]
    pub fn is_client_correctable(&self) -> bool {
        !matches!(self, Self::VerificationUnavailable)
    }
}

/// The structured 402 challenge describing how to pay for a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    /// Route price in base units, decimal string
    pub max_amount_required: String,
    /// Token contract the payment must be denominated in
    pub asset: String,
    /// Receiving address the authorization must be made out to
    pub pay_to: String,
    /// The gated route this challenge is for
    pub resource: String,
    pub description: String,
    /// Nonce requirements for the authorization
    pub nonce_requirement: String,
    /// Longest validity window the gate will accept, in seconds
    pub max_timeout_seconds: u64,
}

/// Outcome of guarding one request.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Route is unpriced, or the authorization verified
    Allow,
    /// Route is priced and no usable authorization was supplied
    Challenge(PaymentChallenge),
    /// An authorization was supplied and failed verification
    Reject(RejectReason),
}

/// Validates pay-per-call access against an immutable pricing table and a
/// live view of the token contract.
pub struct PaymentGate {
    pricing: PricingTable,
    chain: Arc<dyn TokenChain>,
}

/// Longest validity window advertised in challenges.
const MAX_TIMEOUT_SECONDS: u64 = 600;

impl PaymentGate {
    /// Create a gate over a pricing table and chain client.
    pub fn new(pricing: PricingTable, chain: Arc<dyn TokenChain>) -> Self {
        Self { pricing, chain }
    }

    /// Pure lookup: does this route require payment?
    #[must_use]
    pub fn should_gate(&self, route_key: &str) -> bool {
        self.pricing.should_gate(route_key)
    }

    /// Guard a request to a route.
    ///
    /// Unpriced routes pass through. Priced routes without a parseable
    /// authorization get a challenge. Supplied authorizations are verified
    /// for recipient, validity window, amount, nonce freshness, and contract
    /// signature acceptance; any failure rejects with the specific reason.
    #[instrument(skip(self, payment_header), level = "debug")]
    pub async fn guard(&self, route_key: &str, payment_header: Option<&str>) -> GateDecision {
        let Some(price) = self.pricing.price_for(route_key) else {
            return GateDecision::Allow;
        };

        let Some(header) = payment_header else {
            return GateDecision::Challenge(self.challenge(route_key, price));
        };

        let payload = match decode_payment_header(header) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(route = route_key, error = %err, "unusable payment header");
                return GateDecision::Challenge(self.challenge(route_key, price));
            }
        };

        self.verify(route_key, price, &payload).await
    }

    async fn verify(
        &self,
        route_key: &str,
        price: &RoutePrice,
        payload: &PaymentPayload,
    ) -> GateDecision {
        let auth = &payload.payload.authorization;

        // Field-level parsing: a tuple the gate cannot even read gets the
        // challenge again rather than a misleading reject reason.
        let (signature, value, valid_after, valid_before, nonce) = match (
            Signature::parse(&payload.payload.signature),
            auth.value(),
            auth.valid_after(),
            auth.valid_before(),
            auth.nonce_bytes(),
        ) {
            (Ok(sig), Ok(v), Ok(va), Ok(vb), Ok(n)) => (sig, v, va, vb, n),
            _ => {
                debug!(route = route_key, "authorization fields failed to parse");
                return GateDecision::Challenge(self.challenge(route_key, price));
            }
        };

        if !auth.to.eq_ignore_ascii_case(&price.pay_to) {
            return GateDecision::Reject(RejectReason::InvalidRecipient);
        }

        // Local checks run before any RPC: they are deterministic, and a
        // reverted dry run could not tell expiry apart from a bad signature.
        let now = Utc::now().timestamp();
        if now < valid_after {
            return GateDecision::Reject(RejectReason::NotYetValid);
        }
        if now > valid_before {
            return GateDecision::Reject(RejectReason::Expired);
        }
        if value < u128::from(price.amount) {
            return GateDecision::Reject(RejectReason::InsufficientAmount);
        }

        match self
            .chain
            .is_nonce_consumed(&price.token, &auth.from, &nonce)
            .await
        {
            Ok(true) => return GateDecision::Reject(RejectReason::NonceReused),
            Ok(false) => {}
            Err(err) => {
                debug!(route = route_key, error = %err, "nonce check unavailable");
                return GateDecision::Reject(RejectReason::VerificationUnavailable);
            }
        }

        match self
            .chain
            .verify_authorization(&price.token, auth, &signature)
            .await
        {
            Ok(true) => GateDecision::Allow,
            Ok(false) => GateDecision::Reject(RejectReason::InvalidSignature),
            Err(err) => {
                debug!(route = route_key, error = %err, "signature check unavailable");
                GateDecision::Reject(RejectReason::VerificationUnavailable)
            }
        }
    }

    fn challenge(&self, route_key: &str, price: &RoutePrice) -> PaymentChallenge {
        PaymentChallenge {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: self.pricing.network.clone(),
            max_amount_required: price.amount.to_string(),
            asset: price.token.clone(),
            pay_to: price.pay_to.clone(),
            resource: route_key.to_string(),
            description: price.description.clone(),
            nonce_requirement: "32 random bytes, hex encoded, single use".to_string(),
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{
        encode_payment_header, AuthorizationTuple, ExactPaymentPayload,
    };
    use crate::chain::mock::MockTokenChain;
    use crate::pricing::RoutePrice;

    const TOKEN: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
    const PAYER: &str = "0x857b06519E91e3A54538791bDbb0E22373e36b66";
    const PRICE: u64 = 10_000;

    fn pricing() -> PricingTable {
        let mut table = PricingTable::empty();
        table.routes.insert(
            "export".to_string(),
            RoutePrice {
                amount: PRICE,
                token: TOKEN.to_string(),
                pay_to: PAY_TO.to_string(),
                description: "Retro export".to_string(),
            },
        );
        table
    }

    fn gate_with(chain: Arc<MockTokenChain>) -> PaymentGate {
        PaymentGate::new(pricing(), chain)
    }

    fn header(value: u64, valid_before_offset: i64, nonce_byte: u8) -> String {
        let now = Utc::now().timestamp();
        encode_payment_header(&PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactPaymentPayload {
                signature: format!("0x{}", "11".repeat(65)),
                authorization: AuthorizationTuple {
                    from: PAYER.to_string(),
                    to: PAY_TO.to_string(),
                    value: value.to_string(),
                    valid_after: "0".to_string(),
                    valid_before: (now + valid_before_offset).to_string(),
                    nonce: format!("0x{}", hex::encode([nonce_byte; 32])),
                },
            },
        })
    }

    #[tokio::test]
    async fn unpriced_route_allows_immediately() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        assert_eq!(gate.guard("telemetry", None).await, GateDecision::Allow);
    }

    #[tokio::test]
    async fn priced_route_without_payment_challenges() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));

        let GateDecision::Challenge(challenge) = gate.guard("export", None).await else {
            panic!("expected a challenge");
        };
        assert_eq!(challenge.max_amount_required, PRICE.to_string());
        assert_eq!(challenge.asset, TOKEN);
        assert_eq!(challenge.pay_to, PAY_TO);
        assert_eq!(challenge.resource, "export");
    }

    #[tokio::test]
    async fn exact_price_inside_window_allows() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let decision = gate.guard("export", Some(&header(PRICE, 300, 1))).await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn one_unit_short_is_insufficient() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let decision = gate.guard("export", Some(&header(PRICE - 1, 300, 1))).await;
        assert_eq!(
            decision,
            GateDecision::Reject(RejectReason::InsufficientAmount)
        );
    }

    #[tokio::test]
    async fn overpayment_is_accepted() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let decision = gate.guard("export", Some(&header(PRICE + 5_000, 300, 1))).await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn past_valid_before_is_expired() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let decision = gate.guard("export", Some(&header(PRICE, -30, 1))).await;
        assert_eq!(decision, GateDecision::Reject(RejectReason::Expired));
    }

    #[tokio::test]
    async fn future_valid_after_is_not_yet_valid() {
        let chain = Arc::new(MockTokenChain::accepting());
        let gate = gate_with(chain);
        let now = Utc::now().timestamp();
        let h = encode_payment_header(&PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactPaymentPayload {
                signature: format!("0x{}", "11".repeat(65)),
                authorization: AuthorizationTuple {
                    from: PAYER.to_string(),
                    to: PAY_TO.to_string(),
                    value: PRICE.to_string(),
                    valid_after: (now + 120).to_string(),
                    valid_before: (now + 600).to_string(),
                    nonce: format!("0x{}", hex::encode([9u8; 32])),
                },
            },
        });

        assert_eq!(
            gate.guard("export", Some(&h)).await,
            GateDecision::Reject(RejectReason::NotYetValid)
        );
    }

    #[tokio::test]
    async fn consumed_nonce_is_rejected_as_reuse() {
        let chain = Arc::new(MockTokenChain::accepting());
        chain.consume_nonce(PAYER, &[7u8; 32]);
        let gate = gate_with(chain);

        let decision = gate.guard("export", Some(&header(PRICE, 300, 7))).await;
        assert_eq!(decision, GateDecision::Reject(RejectReason::NonceReused));
    }

    #[tokio::test]
    async fn guard_is_idempotent_until_settlement_consumes_the_nonce() {
        let chain = Arc::new(MockTokenChain::accepting());
        let gate = gate_with(chain.clone());
        let h = header(PRICE, 300, 3);

        // Verification alone must not consume the nonce.
        assert_eq!(gate.guard("export", Some(&h)).await, GateDecision::Allow);
        assert_eq!(gate.guard("export", Some(&h)).await, GateDecision::Allow);

        // Downstream settlement consumes it; only then does reuse reject.
        chain.consume_nonce(PAYER, &[3u8; 32]);
        assert_eq!(
            gate.guard("export", Some(&h)).await,
            GateDecision::Reject(RejectReason::NonceReused)
        );
    }

    #[tokio::test]
    async fn contract_refusing_the_signature_rejects() {
        let chain = Arc::new(MockTokenChain::accepting());
        chain.set_valid(false);
        let gate = gate_with(chain);

        let decision = gate.guard("export", Some(&header(PRICE, 300, 1))).await;
        assert_eq!(
            decision,
            GateDecision::Reject(RejectReason::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn wrong_recipient_is_rejected() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let now = Utc::now().timestamp();
        let h = encode_payment_header(&PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactPaymentPayload {
                signature: format!("0x{}", "11".repeat(65)),
                authorization: AuthorizationTuple {
                    from: PAYER.to_string(),
                    to: PAYER.to_string(),
                    value: PRICE.to_string(),
                    valid_after: "0".to_string(),
                    valid_before: (now + 300).to_string(),
                    nonce: format!("0x{}", hex::encode([5u8; 32])),
                },
            },
        });

        assert_eq!(
            gate.guard("export", Some(&h)).await,
            GateDecision::Reject(RejectReason::InvalidRecipient)
        );
    }

    #[tokio::test]
    async fn unreachable_chain_never_fails_open() {
        let chain = Arc::new(MockTokenChain::accepting());
        chain.set_unavailable(true);
        let gate = gate_with(chain);

        let decision = gate.guard("export", Some(&header(PRICE, 300, 1))).await;
        assert_eq!(
            decision,
            GateDecision::Reject(RejectReason::VerificationUnavailable)
        );
    }

    #[tokio::test]
    async fn garbage_header_re_challenges() {
        let gate = gate_with(Arc::new(MockTokenChain::accepting()));
        let decision = gate.guard("export", Some("!!not-a-payment!!")).await;
        assert!(matches!(decision, GateDecision::Challenge(_)));
    }

    #[test]
    fn reject_reasons_have_stable_identifiers() {
        assert_eq!(RejectReason::NonceReused.as_str(), "nonce_reused");
        assert_eq!(
            RejectReason::VerificationUnavailable.as_str(),
            "verification_unavailable"
        );
        assert!(RejectReason::Expired.is_client_correctable());
        assert!(!RejectReason::VerificationUnavailable.is_client_correctable());
    }
}
