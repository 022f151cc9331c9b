//! Kernel utilities shared across slices.
//! Keep this crate lightweight; it provides config loading, the injected clock, and the
//! [`state::AppState`] container that owns initialized feature slices.
//!
//! ## Clock
//! ```rust
//! use std::time::Duration;
//! use tourline_kernel::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now(), Duration::from_secs(5));
//! ```
//!
//! ## Config loading (non-wasm)
//! ```rust,ignore
//! use tourline_kernel::config::load_config;
//! let cfg: serde_json::Value = load_config(Some("tourline")).unwrap();
//! ```
pub mod clock;
#[cfg(not(target_arch = "wasm32"))]
pub mod config;
pub mod state;

pub use tourline_domain as domain;
