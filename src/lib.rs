//! # Toolpress
//!
//! Build and publish pipeline for tool and agent packages.
//!
//! Toolpress scans a source tree for tool and agent directories, validates
//! their metadata, packs each one into a deterministic zip archive, registers
//! it with the local node and uploads it to the remote store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Scanner  │──▶│ Validate │──▶│ Archive  │──▶│   Node   │──▶│  Store   │
//! │ tools/   │   │ metadata │   │ zip+sha  │   │ register │   │  upload  │
//! │ agents/  │   │  .json   │   │          │   │          │   │          │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!        └──────────────── Pipeline (per collection) ─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! toolpress scan                      # list what would be published
//! toolpress publish --dry-run         # validate and pack, no network
//! toolpress publish                   # register and upload everything
//! toolpress pack tools/echo --out echo.zip
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Items, packaged and registered items, upload results |
//! | [`error`] | Error kinds per stage |
//! | [`scanner`] | Collection directory scanning |
//! | [`validate`] | Metadata validation and name collisions |
//! | [`archive`] | Deterministic archives and digests |
//! | [`node`] | Node registration client |
//! | [`store`] | Store upload client |
//! | [`retry`] | Backoff for transient remote failures |
//! | [`pipeline`] | Stage orchestration |
//! | [`progress`] | Progress events and reporters |
//! | [`report`] | Counts and the run summary |
//! | [`logging`] | `tracing` subscriber setup |

pub mod archive;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod node;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod store;
pub mod validate;
