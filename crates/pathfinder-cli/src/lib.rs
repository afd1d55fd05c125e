//! Host-side tooling for the path adjustment engine.
//!
//! - adjust_path: run one adjustment on a JSON request and print the result

pub mod config;

pub use config::Config;
