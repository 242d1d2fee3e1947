//! Permit Desk: building permit report ingestion plus a chat relay.
//!
//! The ingestion pipeline turns regional permit reports (fetched live,
//! uploaded as files, or pasted as text) into normalized, deduplicated
//! permit rows and RFC 4180 CSV. The chat relay forwards per-session
//! transcripts to an OpenAI-compatible completion API. Both surfaces are
//! exposed through the `pdesk` CLI and an HTTP JSON API.
//!
//! # Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`models`] | Core data types shared across the pipeline |
//! | [`source`] | Report acquisition and text decoding |
//! | [`parser`] | Fixed-width report text to permit records |
//! | [`normalize`] | Window filtering, dedup, ordering |
//! | [`export`] | CSV serialization |
//! | [`permits`] | Pipeline orchestration and CLI entry point |
//! | [`chat`] | Per-session conversation transcripts |
//! | [`provider`] | OpenAI-compatible completion client |
//! | [`server`] | axum HTTP API |

pub mod chat;
pub mod config;
pub mod export;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod permits;
pub mod provider;
pub mod server;
pub mod source;
