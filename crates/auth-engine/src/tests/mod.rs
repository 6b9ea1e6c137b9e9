//! Scenario tests for the auth engine.
//!
//! - `harness.rs`         - Mock transport, manual clock, recording store
//! - `change_password.rs` - Password change scenarios end to end
//! - `token_refresh.rs`   - Session context: freshness, single-flight, retry, clear
//! - `flows.rs`           - Interpreter behavior and the remaining flows

pub(crate) mod harness;
