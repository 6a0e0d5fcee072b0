//! Keyhaven Core - Shared domain types.
//!
//! This crate provides the types shared by every Keyhaven component:
//! - `client` - HTTP client, session store, and request interceptor
//! - `cli` - Command-line front end over the client services
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no persistence, no HTTP
//! clients. The backend owns every entity here; the client only reads them
//! and sends partial updates.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, roles, users, and properties

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
