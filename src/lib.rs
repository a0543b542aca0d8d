//! Upload content shared from the host system to a user-configured server.
//!
//! A share payload is resolved into uploadables, each uploadable becomes one
//! multipart POST to `{domain}/{name}`, and the requests run concurrently with
//! per-item progress and outcomes.

pub mod commands;
pub mod config;
pub mod errors;
pub mod security;
pub mod share_payload;
pub mod uploader;
