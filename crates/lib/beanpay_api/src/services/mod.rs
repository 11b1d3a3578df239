//! Helpers shared by the handlers.

pub mod cookies;
pub mod validation;
