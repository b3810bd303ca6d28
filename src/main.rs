//! # Selekta - DJ assistant
//!
//! Selekta keeps a library of tracks analyzed by an external feature
//! extractor (timbre, tempo, key, loudness) and suggests the best next
//! track to play after the current one, using configurable
//! nearest-neighbor or median-matching strategies.
//!
//! ## Architecture
//!
//! - `cli`: Command-line interface definitions
//! - `config`: Settings file and data directory management
//! - `db`: SQLite library persistence and ingest
//! - `track`: Track data model and timbre vectors
//! - `vector`: Distance primitives (timbre, key, loudness)
//! - `selector`: The next-track selection engine

mod cli;
mod config;
mod db;
mod selector;
mod track;
mod vector;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use selector::{Algorithm, Selector, TrackPool};

/// Main entry point.
///
/// Initializes the environment logger (control with `RUST_LOG`, e.g.
/// `RUST_LOG=selekta::selector=debug selekta suggest ...`), parses
/// arguments, and routes commands. All operations return `anyhow::Result`
/// so errors surface with context.
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::InitDb { force } => {
            let db_path = config::get_db_path()?;
            db::init(&db_path, force)?;
            println!("Initialized library at {}", db_path.display());
        }
        cli::Command::Ingest { file } => {
            let db_path = config::get_db_path()?;
            let mut conn = db::connect(&db_path)?;
            let count = db::ingest_file(&mut conn, &file)?;
            println!("Ingested {count} tracks");
        }
        cli::Command::List => {
            let db_path = config::get_db_path()?;
            let conn = db::connect(&db_path)?;
            list_tracks(&conn)?;
        }
        cli::Command::Suggest { query, seed } => {
            suggest(&query, seed)?;
        }
        cli::Command::ResetPlayed => {
            let db_path = config::get_db_path()?;
            let conn = db::connect(&db_path)?;
            let cleared = db::reset_played(&conn)?;
            println!("Cleared played flag on {cleared} tracks");
        }
    }

    Ok(())
}

/// Print the library with analysis and played state.
fn list_tracks(conn: &rusqlite::Connection) -> Result<()> {
    let tracks = db::load_tracks(conn)?;
    if tracks.is_empty() {
        println!("Library is empty. Ingest analyzed tracks first.");
        return Ok(());
    }

    for track in &tracks {
        let tempo = track
            .usable_tempo()
            .map_or_else(|| "  ?".to_string(), |bpm| format!("{bpm:>3}"));
        let key = track.key.map_or("--", |k| k.name());
        let genre = track.genre.as_deref().unwrap_or("-");
        let state = match track.analyzed {
            track::AnalysisState::ToDo => "todo",
            track::AnalysisState::InProgress => "analyzing",
            track::AnalysisState::Complete => "analyzed",
        };
        let played = if track.played { " [played]" } else { "" };
        println!(
            "{:>4}  {} - {}  ({tempo} BPM, {key:>2}, {genre}, {state}){played}",
            track.id, track.artist, track.title
        );
    }
    println!("\n{} tracks total", tracks.len());
    Ok(())
}

/// Resolve the current track, run one selection, persist played flags,
/// and print the suggestion.
fn suggest(query: &str, seed: Option<u64>) -> Result<()> {
    // Resolve configuration before touching the library: an invalid
    // algorithm or formula must fail here, not mid-selection.
    let settings = config::Settings::load()?;
    let selector_config = settings.resolve()?;
    info!(
        "Using algorithm {} with {} distance",
        selector_config.algorithm, selector_config.formula
    );

    let db_path = config::get_db_path()?;
    let mut conn = db::connect(&db_path)?;

    let current = db::find_track(&conn, query)?
        .with_context(|| format!("No track matching '{query}' in the library"))?;
    let current_id = current.id;

    let pool = TrackPool::new(db::load_tracks(&conn)?);
    let mut selector = match seed {
        Some(seed) => Selector::with_seed(selector_config, seed),
        None => Selector::new(selector_config),
    };
    if seed.is_some() && selector_config.algorithm != Algorithm::Random {
        info!("--seed only affects the random algorithm");
    }

    let next = pool.select_next(&mut selector, current_id)?;

    if next.id == current_id {
        println!(
            "No playable candidates left after '{}'. Ingest more tracks or reset-played.",
            current.title
        );
        return Ok(());
    }

    db::update_played(&mut conn, &pool.snapshot()?)?;

    let tempo = next
        .usable_tempo()
        .map_or_else(|| "?".to_string(), |bpm| bpm.to_string());
    let key = next.key.map_or("--", |k| k.name());
    println!(
        "Next up after '{}': {} - {} ({tempo} BPM, {key})",
        current.title, next.artist, next.title
    );
    Ok(())
}
