//! Stories enrichment pipeline
//!
//! An API-first service that partitions submitted text into logical segments
//! and enriches every segment with a narration script, a synthesized audio
//! clip, and an illustrative image. Jobs are executed asynchronously: the
//! intake service persists a job and enqueues a work message, a worker drives
//! the per-job pipeline, and a dispatcher delivers signed webhook callbacks.
//!
//! Crate layout:
//! - [`ai`] — capability adapters (segmentation, narration, TTS, image
//!   prompt, image generation, vision extraction, fact checking)
//! - [`database`] — Postgres repositories and embedded migrations
//! - [`segmentation`] — grapheme-aware boundary resolution with a
//!   content-addressed cache
//! - [`pipeline`] — the per-segment narration/TTS/image pipeline
//! - [`jobs`] — the job executor state machine and output markup
//! - [`messaging`] — Kafka producer/consumer glue for the `jobs` and
//!   `webhooks` topics
//! - [`storage`] — the object store abstraction and S3 implementation
//! - [`webhook`] — webhook payload signing, delivery, and the retry scanner

pub mod ai;
pub mod auth;
pub mod config;
pub mod database;
pub mod jobs;
pub mod messaging;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod shutdown;
pub mod storage;
pub mod webhook;
