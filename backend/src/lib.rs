//! Habit penalty and auto-payment engine.
//!
//! `domain` holds the services and ports, `outbound` the PostgreSQL and Stripe
//! adapters, and `config` the layered settings consumed by the binary.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
