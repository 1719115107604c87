//! Sealbox: an ephemeral self-destructing secret-sharing service.
//!
//! A client uploads a note and/or a file; the server stores them encrypted
//! under a per-item secret, hands back a single-use URL, and removes the
//! item once its read budgets are spent or its TTL passes.

pub mod api;
pub mod blob;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod pages;
pub mod reaper;
pub mod state;
