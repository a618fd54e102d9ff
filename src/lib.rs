//! Bidirectional reconciliation between a primary module catalog (SQLite)
//! and a headless CMS mirror.
//!
//! Direction is re-derived every pass from the two stores' timestamps; the
//! engine keeps no sync ledger, so a crash mid-pass can at worst leave a
//! partial write that the next pass's idempotent upsert corrects.

pub mod cms;
pub mod config;
pub mod db;
pub mod locator;
pub mod mapper;
pub mod model;
pub mod orchestrator;
pub mod resolve;
pub mod sync;
pub mod webhook;
