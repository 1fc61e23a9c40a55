//! ffqueue - bounded-concurrency ffmpeg conversion service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod bus;
pub mod config;
pub mod converter;
