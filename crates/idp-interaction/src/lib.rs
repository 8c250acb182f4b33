//! # idp-interaction
//!
//! Interaction resolution and consent grant assembly.
//!
//! The protocol engine owns interaction sessions; this crate reads them
//! through [`InteractionEngine`], drives the user through login or consent
//! with [`InteractionResolver`], and builds consent grants with
//! [`GrantAssembler`].
//!
//! ## Flow
//!
//! 1. The engine opens an interaction and redirects the browser to `/interaction/{uid}`
//! 2. [`InteractionResolver::inspect`] reads the pending prompt
//! 3. Login: the account directory authenticates the user, the engine resumes with the account
//! 4. Consent: the assembler persists a grant, the engine resumes with the grant
//! 5. Every failure comes back as a tagged [`FailureReason`], never as an error
//!
//! [`InMemoryInteractionEngine`] is a self-contained engine for development
//! and tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod assembler;
pub mod engine;
pub mod error;
pub mod memory;
pub mod resolver;

pub use assembler::GrantAssembler;
pub use engine::{interaction_url, InteractionEngine};
pub use error::{EngineError, EngineResult, FailureReason};
pub use memory::{
    parse_claims_parameter, AuthorizationRequest, EngineConfig, InMemoryInteractionEngine,
    IssuedAuthorization, RegisteredClient,
};
pub use resolver::{states, Failure, InteractionResolver, InteractionState, Pending, Resolution};
