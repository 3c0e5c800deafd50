#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pixelhost Panel Client
//!
//! Typed client for the Pterodactyl application API: user creation,
//! server creation, suspend/unsuspend, and force deletion. Every call
//! is a thin one-shot wrapper; retries and queueing live with the
//! callers (the billing state machine and the worker), not here.
//!
//! All responses are deserialized into explicit structs at the
//! boundary. A body that doesn't match the expected shape is a
//! [`PanelError::MalformedResponse`], never an untyped map.

pub mod client;
pub mod error;
pub mod types;
pub mod username;

pub use client::{PanelClient, PanelConfig};
pub use error::{PanelError, PanelResult};
pub use types::{
    CreateServerParams, CreateUserParams, CreatedServer, PanelServer, PanelUser,
};
pub use username::normalize_username;
