//! Command-line driver for the ludics dialogue engine
//!
//! Loads move logs and commitment files from disk, runs one engine
//! operation, and prints the result as JSON.

pub mod commands;
pub mod config;
pub mod input;
