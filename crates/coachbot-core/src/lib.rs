//! # CoachBot Core
//!
//! Runtime-free logic shared by the CoachBot service: data models, the
//! overlapping chunker, the store abstraction, the embedding service trait
//! with vector validation, system prompt assembly, mention handling and
//! webhook envelope parsing.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Everything that talks to the outside world lives in the `coachbot`
//! application crate and plugs in through the traits defined here.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod inbound;
pub mod mention;
pub mod models;
pub mod prompt;
pub mod store;
