//! Core data types for the live quote feed.

pub mod auth;
pub mod price;
pub mod quote;
pub mod symbol;

pub use auth::*;
pub use price::*;
pub use quote::*;
pub use symbol::*;
