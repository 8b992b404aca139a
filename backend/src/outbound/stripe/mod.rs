//! Stripe outbound adapter.
//!
//! A thin HTTP implementation of the `PaymentProcessor` port over the Stripe
//! Payment Intents API.

mod dto;
mod http_processor;

pub use http_processor::{STRIPE_API_BASE, StripeHttpProcessor};
