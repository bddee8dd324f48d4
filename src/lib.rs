//! # nvd-sync
//!
//! Schema-tolerant incremental synchronization of the NVD vulnerability feed.
//!
//! nvd-sync pulls paginated records from the feed, normalizes the several
//! record shapes the feed has used over time into one canonical form, and
//! idempotently upserts them into SQLite keyed by CVE id. Transient feed
//! failures are retried at the same cursor position, so progress is never
//! lost and no page is applied twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐
//! │    Feed    │──▶│ Paginator  │──▶│ Normalizer │──▶│  SQLite  │
//! │ (NVD HTTP) │   │ retry/wait │   │ strategies │   │  upsert  │
//! └────────────┘   └────────────┘   └────────────┘   └────┬─────┘
//!                                                         │
//!                                  ┌──────────────────────┤
//!                                  ▼                      ▼
//!                             ┌──────────┐          ┌──────────┐
//!                             │   CLI    │          │   HTTP   │
//!                             │(nvd-sync)│          │ /api/cves│
//!                             └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nvd-sync init                 # create database
//! nvd-sync sync                 # full sync from the feed
//! nvd-sync list --year 2021     # browse stored records
//! nvd-sync serve                # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`normalize`] | Raw record → canonical record |
//! | [`feed`] | Feed access and response parsing |
//! | [`retry`] | Backoff policies |
//! | [`pipeline`] | Paginator |
//! | [`store`] | Storage trait |
//! | [`sqlite_store`] | SQLite storage |
//! | [`sync`] | Sync entry points |
//! | [`query`] | Read API |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod store;
pub mod sync;
