//! Command-line interface definitions.
//!
//! Clap derive macros generate parsing, help text, and validation. Each
//! subcommand maps to one operation over the track library.
//!
//! ## Examples
//!
//! ```bash
//! selekta init-db
//! selekta ingest analyzed-batch.json
//! selekta suggest "Blue Monday"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "selekta")]
#[command(about = "Selekta: DJ assistant - suggests the best next track from your analyzed library")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Initialize the library database
    ///
    /// Creates an empty track library in the platform data directory.
    /// Fails if a library already exists unless --force is given.
    InitDb {
        /// Overwrite an existing library database
        #[arg(long)]
        force: bool,
    },

    /// Ingest analyzed tracks from a JSON document
    ///
    /// The document is an array of track records produced by an external
    /// feature extractor: title, artist, optional genre/tempo/loudness/key,
    /// and the flat 64-dimensional timbre vector for analyzed tracks.
    /// Selekta never decodes audio or parses tags itself.
    Ingest {
        /// Path to the ingest JSON document
        file: PathBuf,
    },

    /// List all tracks in the library
    ///
    /// Shows tempo, key, genre, analysis state, and played status for
    /// every track, ordered by id.
    List,

    /// Suggest the best next track after the one given
    ///
    /// Resolves the query against the library (exact title first, then a
    /// substring match on title or artist), runs the configured selection
    /// algorithm, marks the current track as played, and prints the
    /// suggestion. Algorithm and distance formula come from settings.json.
    Suggest {
        /// Title (or title/artist substring) of the currently playing track
        query: String,

        /// Seed the random algorithm for reproducible picks
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Clear all played flags
    ///
    /// Starts a fresh set: every track becomes eligible for suggestion
    /// again.
    ResetPlayed,
}
