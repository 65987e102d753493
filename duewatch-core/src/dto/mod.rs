//! Data Transfer Objects
//!
//! Request and response bodies exchanged with the library API's token
//! endpoints. Due items travel as [`crate::domain::DueItem`] directly.

pub mod auth;
