//! # Studytrack Architecture
//!
//! Studytrack is a **UI-agnostic study-progress library**. The CLI in this
//! crate is one client of it; a web UI or a scheduled job would sit on the
//! same API.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (args.rs, wired by main.rs)                      │
//! │  - Parses arguments, formats output, owns the terminal      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Tracker Facade (tracker.rs)                                │
//! │  - In-memory dataset + every mutation entry point           │
//! │  - Wraps mutations with change snapshots and persistence    │
//! └─────────────────────────────────────────────────────────────┘
//!              │                               │
//!              ▼                               ▼
//! ┌───────────────────────────┐  ┌─────────────────────────────┐
//! │  Backup Layer (backup/)   │  │  Revision Logic (revision)  │
//! │  - Snapshot lifecycle     │  │  - Pure schedule arithmetic │
//! │  - Daily dedup, scheduler │  │                             │
//! └────────────┬──────────────┘  └─────────────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - Abstract DocumentStore trait                             │
//! │  - FileStore (local), InMemoryStore (testing)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: No I/O Assumptions in Core
//!
//! From `tracker.rs` inward, code takes regular arguments, returns
//! `Result`, and never touches stdout or the process exit code. Logging
//! goes through `tracing`; what becomes of it is the binary's choice.
//!
//! ## Module Overview
//!
//! - [`tracker`]: The facade collaborators call
//! - [`revision`]: Spaced-repetition date arithmetic
//! - [`backup`]: Snapshots, naming, daily scheduling
//! - [`store`]: Document store abstraction and implementations
//! - [`model`]: Core data types
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod backup;
pub mod config;
pub mod error;
pub mod model;
pub mod revision;
pub mod store;
pub mod tracker;
