//! # trustd-revocation
//!
//! Locally-maintained certificate revocation/validity database for the
//! trustd platform trust daemon. Given a leaf certificate and its issuer,
//! answers "is this certificate known-revoked, known-allowed, or otherwise
//! constrained?" from a database that is periodically refreshed with signed
//! updates published by the trust authority.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RevocationDb                          │
//! │                                                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐        │
//! │  │ LookupCache │   │    Store    │   │ Nto1 filter  │        │
//! │  │ (LRU, 100)  │   │  (SQLite)   │   │  matcher     │        │
//! │  └─────────────┘   └─────────────┘   └──────────────┘        │
//! │         ▲                 ▲                                  │
//! │         │                 │ write transaction                │
//! │  ┌──────┴─────────────────┴───────────────────────────┐      │
//! │  │                     Updater                        │      │
//! │  │  fetch → verify → decode → ingest → notify         │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Safety Properties
//!
//! - **Atomic updates**: an update is applied inside a single immediate
//!   write transaction; partial application is never visible to readers.
//! - **Fail-soft lookups**: database or update failures degrade to "no
//!   revocation opinion", never to a fabricated answer or a crash in the
//!   calling chain-evaluation path.
//! - **No false negatives**: the probabilistic filter may report spurious
//!   matches but never misses an encoded serial.
//! - **Single writer**: one process instance owns write access; read-only
//!   instances invalidate their caches on a cross-process notification.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod store;
pub mod types;
pub mod update;
pub mod wire;

pub use cache::LookupCache;
pub use config::RevocationConfig;
pub use db::RevocationDb;
pub use error::RevocationError;
pub use types::{
    CertificateRef, FlagUpdates, GroupFlags, RevocationFormat, ValidInfo,
    MIN_SUPPORTED_SCHEMA_VERSION, MIN_WIRE_FORMAT_VERSION, SCHEMA_VERSION, WIRE_FORMAT_VERSION,
};
pub use update::{
    ChangeNotifier, CycleOutcome, FetchOutcome, LocalNotifier, SnapshotInfo, SnapshotProvider,
    UpdateFetcher, UpdateVerifier, Updater,
};
pub use wire::{FilterUpdate, GroupUpdate, UpdateDocument};
