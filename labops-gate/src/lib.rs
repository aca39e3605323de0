//! labops-gate - x402 pay-per-call access control
//!
//! Enforces pay-per-call access to premium derived artifacts using on-chain
//! payment authorizations instead of a session paywall. The gate verifies;
//! it never settles - the actual transfer belongs to whoever serves the
//! priced resource, which keeps verification cheap, read-only, and safely
//! repeatable.

pub mod authorization;
pub mod chain;
mod error;
mod gate;
mod pricing;

pub use authorization::{
    decode_payment_header, encode_payment_header, is_address, AuthorizationTuple,
    ExactPaymentPayload, PaymentPayload, Signature, SCHEME_EXACT, X402_VERSION,
};
pub use chain::{mock::MockTokenChain, RpcTokenChain, TokenChain};
pub use error::{AuthorizationError, ChainError, PricingError};
pub use gate::{GateDecision, PaymentChallenge, PaymentGate, RejectReason};
pub use pricing::{PricingTable, RoutePrice};
