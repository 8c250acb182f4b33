//! End-to-End Integration Tests
//!
//! These tests start the identity provider on an ephemeral port and drive
//! the authorization, login and consent flow over HTTP.

mod common;
mod interaction_flows;
