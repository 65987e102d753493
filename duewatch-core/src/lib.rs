//! Duewatch Core
//!
//! Core types shared by the due-date notification poller.
//!
//! This crate contains:
//! - Domain types: due items, fetch windows and credentials
//! - DTOs: request/response bodies of the library authentication API

pub mod domain;
pub mod dto;
