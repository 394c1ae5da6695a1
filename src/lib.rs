//! # CoachBot
//!
//! A retrieval-augmented chat assistant for Whop experiences.
//!
//! Admins upload training material (text or PDF), which is chunked,
//! embedded and stored per experience. When someone mentions the bot in
//! the experience's chat, the question is answered from the most similar
//! stored chunks using the experience's chosen personality.
//!
//! ## Architecture
//!
//! ```text
//!  training upload ──▶ Training ──▶ Ingestor ──▶ chunk + embed ──▶ Store
//!                                                                   │
//!  poll / webhook ──▶ Reconciler ──▶ Generator ◀── VectorRetriever ◀┘
//!                          │              │
//!                          ▼              ▼
//!                     ChatPlatform     ChatModel
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`db`], [`migrate`], [`sqlite_store`] | SQLite persistence |
//! | [`embedder`] | Input cleanup and dimension conformance around the provider |
//! | [`ingest`], [`training`], [`extract`] | Training document workflow |
//! | [`retrieve`], [`generate`] | Context retrieval and reply generation |
//! | [`reconcile`], [`webhook`], [`signature`], [`dispatch`] | Message intake |
//! | [`openai`], [`platform`], [`avatar`] | External service clients |
//! | [`services`] | Wiring |
//! | [`server`] | HTTP API |
//! | [`error`] | Error taxonomy and HTTP mapping |
//!
//! Pure logic (chunking, prompts, mention handling, payload resolution,
//! the store trait) lives in the `coachbot-core` crate.

pub mod avatar;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedder;
pub mod error;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod migrate;
pub mod openai;
pub mod platform;
pub mod reconcile;
pub mod retrieve;
pub mod server;
pub mod services;
pub mod signature;
pub mod sqlite_store;
pub mod training;
pub mod webhook;
