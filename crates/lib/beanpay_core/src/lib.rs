//! # beanpay_core
//!
//! Core domain logic for Beanpay: credential and token handling, the refresh
//! token ledger, ownership checks, and persistence for bills and payments.

pub mod auth;
pub mod clock;
pub mod guard;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
