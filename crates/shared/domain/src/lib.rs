//! # Domain Models
//!
//! This crate contains pure domain types with minimal dependencies (`serde`, `bitflags`).
//! Keep it lean: no I/O, networking, or heavy logic. Just data and simple helpers.

pub mod bundle;
pub mod config;
pub mod context;
pub mod registry;
pub mod roles;
pub mod tour;
