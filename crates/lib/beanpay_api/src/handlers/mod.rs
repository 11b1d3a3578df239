//! HTTP request handlers.

pub mod auth;
pub mod bills;
pub mod payments;
pub mod ping;
pub mod users;
