//! # idp-model
//!
//! Domain models for the identity provider.
//!
//! This crate defines the entities shared by the account directory, the
//! interaction resolver and the HTTP surface:
//!
//! - [`Account`]: a registered end user and its optional [`Profile`]
//! - [`Claims`]: the scope-filtered projection of an account
//! - [`ConsentGrant`]: the scopes, claims and resource scopes a user granted a client
//! - [`InteractionSession`]: the engine's view of one in-flight authorization

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod account;
pub mod claims;
pub mod grant;
pub mod interaction;

pub use account::{Account, Profile};
pub use claims::{scope_tokens, Claims, SCOPE_EMAIL, SCOPE_OPENID, SCOPE_PROFILE};
pub use grant::{ConsentGrant, GrantBuilder, GrantId};
pub use interaction::{FinishOptions, InteractionResult, InteractionSession, PromptKind};
