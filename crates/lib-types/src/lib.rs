//! # lib-types
//!
//! Core type definitions for the VocalTractLab binding.
//!
//! This crate provides the plain data shared by the FFI wrapper and the CLI:
//! - Time and rate units
//! - Engine lifecycle state, configuration and constants
//! - Duration estimates and finalized audio

pub mod units;
pub mod engine;
pub mod audio;

pub use units::*;
pub use engine::*;
pub use audio::*;
