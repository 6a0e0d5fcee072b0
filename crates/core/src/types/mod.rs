//! Core types for Keyhaven.
//!
//! This module provides type-safe wrappers for the backend's domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod property;
pub mod role;
pub mod user;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use property::Property;
pub use role::Role;
pub use user::User;
