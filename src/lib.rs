//! # LangHook
//!
//! Webhook normalization and intelligent fan-out pipeline.
//!
//! This crate is a thin re-export over [`langhook_core`] and
//! [`langhook_server`]; the actual pipeline lives in those crates and in
//! `langhook-store` / `langhook-broker`. Install the `langhookd` binary to
//! run the service.

pub use langhook_core::config::Config;
pub use langhook_server::run;
