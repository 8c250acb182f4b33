//! End-to-end tests for the identity provider live under `tests/`.
