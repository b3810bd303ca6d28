//! DJ assistant that suggests the best next track from an analyzed library.
//!
//! Core modules:
//! - [`vector`] - Distance primitives: Euclidean/Manhattan timbre distance,
//!   circle-of-fifths key distance, loudness distance
//! - [`track`] - Track model: analysis state, 64-dimensional timbre vectors
//! - [`selector`] - The selection engine: candidate filtering, adaptive
//!   tempo window, genre preference, ranked/median strategies
//!
//! ### Supporting Modules
//!
//! - [`config`] - Settings file and data directory management
//! - [`db`] - SQLite library persistence and ingest
//! - [`cli`] - Command-line interface definitions
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use selekta::selector::{Selector, SelectorConfig, TrackPool};
//! use selekta::{config, db};
//! use anyhow::Result;
//!
//! # fn run() -> Result<()> {
//! // Resolve settings once; invalid names fail here, not mid-selection.
//! let settings = config::Settings::load()?;
//! let selector_config = settings.resolve()?;
//!
//! // Load the library and run one atomic selection.
//! let conn = db::connect(&config::get_db_path()?)?;
//! let pool = TrackPool::new(db::load_tracks(&conn)?);
//! let mut selector = Selector::new(selector_config);
//! let next = pool.select_next(&mut selector, 1)?;
//! println!("Next up: {} - {}", next.artist, next.title);
//! # Ok(())
//! # }
//! ```
//!
//! ## Selection strategies
//!
//! All strategies first narrow candidates to an adaptively widening tempo
//! window (+/-3 BPM, widening by 3 until non-empty); the genre variants
//! prefer same-genre candidates first. Ranked variants pick the candidate
//! with the minimum timbre (or timbre + loudness) distance; median
//! variants pick the candidate whose distance is closest to the lower
//! median of all candidate distances, trading tightness for variety.

pub mod cli;
pub mod config;
pub mod db;
pub mod selector;
pub mod track;
pub mod vector;
