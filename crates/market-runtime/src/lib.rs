//! # Market Runtime
//!
//! Configuration, wiring, and supervision for the GridMarket core. The
//! subsystems live in their own crates; this one builds a single
//! [`core::MarketCore`] value at startup and hands each long-running piece
//! its own task plus the shared shutdown signal.

pub mod config;
pub mod core;
pub mod wiring;

pub use config::{ConfigError, MarketConfig};
pub use core::{drain, MarketCore, StartupError};
