//! # Wetten Archive
//!
//! A content-addressed archive of historical versions of Dutch legislation.
//!
//! The source service only answers "document X as valid on date D" and has
//! no changelog. This crate discovers every distinct version of each catalog
//! document with as few requests as possible and stores each version once,
//! keyed by the SHA-256 of its bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ids    ┌─────────────────┐  N scans  ┌────────────────┐
//! │ Catalog  │────────▶│ SyncCoordinator  │─────────▶│ VersionScanner │
//! │ (SQLite) │          └─────────────────┘           └───┬────────┬───┘
//! └──────────┘                                    fetch   │        │ hash / insert
//!                                                         ▼        ▼
//!                                                   ┌─────────┐ ┌───────────────┐
//!                                                   │ Fetcher │ │ SnapshotStore │
//!                                                   └─────────┘ └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wetten init                   # create database
//! wetten catalog                # download and store the id list
//! wetten sync                   # discover new versions
//! wetten versions BWBR0001840   # list archived versions
//! wetten serve                  # start the JSON viewer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, snapshots and content hashes |
//! | [`fetch`] | As-of document retrieval |
//! | [`store`] | Snapshot archive trait and backends |
//! | [`scanner`] | Per-document version discovery |
//! | [`coordinator`] | Bounded-concurrency scanning |
//! | [`catalog`] | Catalog download, parsing and id stream |
//! | [`sync`] | The `sync` command |
//! | [`progress`] | Sync progress reporting |
//! | [`get`] | Snapshot lookup by date |
//! | [`status`] | Archive statistics |
//! | [`server`] | Read-only HTTP viewer |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and reset |

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod fetch;
pub mod get;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod scanner;
pub mod server;
pub mod status;
pub mod store;
pub mod sync;
