//! Request middleware

mod payment;

pub use payment::{payment_middleware, PaymentLayer, X_PAYMENT_HEADER};
