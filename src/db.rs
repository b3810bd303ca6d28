//! SQLite persistence for the track library.
//!
//! The schema is one `track` table; the 64-dimensional timbre vector is
//! stored structured as JSON in a text column, so the database stays
//! human-inspectable with the stock sqlite3 CLI.
//!
//! Tracks enter the library through [`ingest_file`]: a JSON document of
//! records produced by an external feature extractor. Selekta never
//! decodes audio or parses tags itself.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::track::{AnalysisState, TimbreVector, Track};
use crate::vector::PitchClass;

/// Open a connection to the library database.
///
/// # Errors
///
/// Returns an error if the database file cannot be opened.
pub fn connect(db_path: &Path) -> Result<Connection> {
    Connection::open(db_path)
        .with_context(|| format!("Failed to open library database at {}", db_path.display()))
}

/// Create the library database, optionally replacing an existing one.
///
/// # Errors
///
/// Returns an error if the database already exists without `force`, or if
/// schema creation fails.
pub fn init(db_path: &Path, force: bool) -> Result<Connection> {
    if db_path.exists() {
        if !force {
            bail!(
                "Library database already exists at {}. Use --force to overwrite.",
                db_path.display()
            );
        }
        fs::remove_file(db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
    }

    let conn = connect(db_path)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS track (
            id       INTEGER PRIMARY KEY,
            title    TEXT    NOT NULL,
            artist   TEXT    NOT NULL,
            genre    TEXT,
            tempo    INTEGER,
            loudness REAL,
            key      TEXT,
            analyzed INTEGER NOT NULL DEFAULT 0,
            played   INTEGER NOT NULL DEFAULT 0,
            timbre   TEXT
        )",
        (),
    )
    .context("Failed to create track table")?;

    info!("Initialized library database at {}", db_path.display());
    Ok(conn)
}

/// One record in an ingest document, as emitted by the analysis pipeline.
/// The `timbre` field is the flat 64-value extractor layout.
#[derive(Debug, Deserialize)]
pub struct IngestRecord {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub tempo: Option<u32>,
    #[serde(default)]
    pub loudness: Option<f64>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub timbre: Option<Vec<f64>>,
}

impl IngestRecord {
    /// Convert to a library track. The analysis state is derived from the
    /// presence of the timbre vector: the extractor only writes a vector
    /// once analysis completed.
    fn into_track(self) -> Result<Track> {
        let timbre = match self.timbre {
            Some(values) => Some(
                TimbreVector::from_flat(&values)
                    .with_context(|| format!("Bad timbre vector for '{}'", self.title))?,
            ),
            None => None,
        };
        let analyzed = if timbre.is_some() {
            AnalysisState::Complete
        } else {
            AnalysisState::ToDo
        };
        let key = match self.key.as_deref() {
            Some(k) => Some(
                k.parse::<PitchClass>()
                    .with_context(|| format!("Bad key for '{}'", self.title))?,
            ),
            None => None,
        };

        Ok(Track {
            id: 0, // assigned by SQLite on insert
            title: self.title,
            artist: self.artist,
            genre: self.genre,
            // The extractor reports 0 when it could not estimate a tempo.
            tempo: self.tempo.filter(|&bpm| bpm > 0),
            loudness: self.loudness,
            key,
            analyzed,
            played: false,
            timbre,
        })
    }
}

/// Load an ingest JSON document and insert its tracks in one transaction.
/// Returns the number of tracks inserted.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a record is
/// malformed, or the insert fails.
pub fn ingest_file(conn: &mut Connection, path: &Path) -> Result<usize> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingest file {}", path.display()))?;
    let records: Vec<IngestRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed ingest document {}", path.display()))?;

    let tracks = records
        .into_iter()
        .map(IngestRecord::into_track)
        .collect::<Result<Vec<_>>>()?;

    insert_tracks(conn, &tracks)?;
    info!("Ingested {} tracks from {}", tracks.len(), path.display());
    Ok(tracks.len())
}

/// Insert tracks inside a single transaction.
///
/// # Errors
///
/// Returns an error if any insert fails; nothing is committed in that case.
pub fn insert_tracks(conn: &mut Connection, tracks: &[Track]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO track (title, artist, genre, tempo, loudness, key, analyzed, played, timbre)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for track in tracks {
            let timbre_json = track
                .timbre
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize timbre vector")?;

            stmt.execute((
                &track.title,
                &track.artist,
                &track.genre,
                track.tempo,
                track.loudness,
                track.key.map(|k| k.name()),
                track.analyzed.to_i64(),
                track.played,
                timbre_json,
            ))
            .with_context(|| format!("Failed to insert track '{}'", track.title))?;
        }
    }
    tx.commit().context("Failed to commit track inserts")?;
    Ok(())
}

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Track> {
    let key: Option<String> = row.get(6)?;
    let timbre_json: Option<String> = row.get(9)?;
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        genre: row.get(3)?,
        tempo: row.get(4)?,
        loudness: row.get(5)?,
        // A malformed key or timbre column degrades to None; the
        // completeness filter keeps such rows out of comparisons.
        key: key.and_then(|k| k.parse().ok()),
        analyzed: AnalysisState::from_i64(row.get(7)?),
        played: row.get(8)?,
        timbre: timbre_json.and_then(|j| serde_json::from_str(&j).ok()),
    })
}

/// Load the whole library.
///
/// # Errors
///
/// Returns an error if the query fails or a row cannot be decoded.
pub fn load_tracks(conn: &Connection) -> Result<Vec<Track>> {
    let mut stmt = conn
        .prepare("SELECT id, title, artist, genre, tempo, loudness, key, analyzed, played, timbre FROM track ORDER BY id")
        .context("Failed to prepare track query")?;

    let rows = stmt
        .query_map([], track_from_row)
        .context("Failed to query tracks")?;

    let mut tracks = Vec::new();
    for row in rows {
        tracks.push(row.context("Failed to decode track row")?);
    }
    debug!("Loaded {} tracks from the library", tracks.len());
    Ok(tracks)
}

/// Find a track by title, falling back to a substring match on title or
/// artist. Returns `None` when nothing matches.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn find_track(conn: &Connection, query: &str) -> Result<Option<Track>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, artist, genre, tempo, loudness, key, analyzed, played, timbre
         FROM track WHERE title = ?1 LIMIT 1",
    )?;
    if let Some(track) = stmt.query_row([query], track_from_row).optional()? {
        return Ok(Some(track));
    }

    let mut stmt = conn.prepare(
        "SELECT id, title, artist, genre, tempo, loudness, key, analyzed, played, timbre
         FROM track WHERE title LIKE ?1 OR artist LIKE ?1 ORDER BY id LIMIT 1",
    )?;
    let pattern = format!("%{query}%");
    Ok(stmt.query_row([&pattern], track_from_row).optional()?)
}

/// Write back the played flags for the given tracks in one transaction.
///
/// # Errors
///
/// Returns an error if any update fails; nothing is committed in that case.
pub fn update_played(conn: &mut Connection, tracks: &[Track]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("UPDATE track SET played = ?1 WHERE id = ?2")?;
        for track in tracks {
            stmt.execute((track.played, track.id))
                .with_context(|| format!("Failed to update played flag for '{}'", track.title))?;
        }
    }
    tx.commit().context("Failed to commit played-flag updates")?;
    Ok(())
}

/// Clear every played flag (start a fresh set). Returns the number of
/// tracks that were marked played.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn reset_played(conn: &Connection) -> Result<usize> {
    let cleared = conn
        .execute("UPDATE track SET played = 0 WHERE played = 1", ())
        .context("Failed to reset played flags")?;
    info!("Cleared played flag on {cleared} tracks");
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Connection) {
        let dir = TempDir::new().unwrap();
        let conn = init(&dir.path().join("test.db"), false).unwrap();
        (dir, conn)
    }

    fn sample_track(title: &str, tempo: Option<u32>) -> Track {
        Track {
            id: 0,
            title: title.to_string(),
            artist: "Artist".to_string(),
            genre: Some("techno".to_string()),
            tempo,
            loudness: Some(0.42),
            key: Some("Gb".parse().unwrap()),
            analyzed: AnalysisState::Complete,
            played: false,
            timbre: Some(TimbreVector::from_flat(&vec![0.5; 64]).unwrap()),
        }
    }

    #[test]
    fn test_insert_and_load_roundtrip() {
        let (_dir, mut conn) = test_db();
        insert_tracks(&mut conn, &[sample_track("One", Some(128))]).unwrap();

        let tracks = load_tracks(&conn).unwrap();
        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.title, "One");
        assert_eq!(track.tempo, Some(128));
        assert_eq!(track.key.unwrap().name(), "F#"); // Gb normalized
        assert_eq!(track.analyzed, AnalysisState::Complete);
        assert_eq!(track.timbre_64().unwrap().len(), 64);
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib.db");
        init(&path, false).unwrap();
        assert!(init(&path, false).is_err());
        assert!(init(&path, true).is_ok());
    }

    #[test]
    fn test_find_track_exact_then_fuzzy() {
        let (_dir, mut conn) = test_db();
        insert_tracks(
            &mut conn,
            &[sample_track("Phase Shift", Some(128)), sample_track("Shifter", Some(130))],
        )
        .unwrap();

        // Exact title match wins over the LIKE fallback.
        let exact = find_track(&conn, "Shifter").unwrap().unwrap();
        assert_eq!(exact.title, "Shifter");

        let fuzzy = find_track(&conn, "Phase").unwrap().unwrap();
        assert_eq!(fuzzy.title, "Phase Shift");

        assert!(find_track(&conn, "Nowhere").unwrap().is_none());
    }

    #[test]
    fn test_played_flag_writeback_and_reset() {
        let (_dir, mut conn) = test_db();
        insert_tracks(
            &mut conn,
            &[sample_track("One", Some(128)), sample_track("Two", Some(129))],
        )
        .unwrap();

        let mut tracks = load_tracks(&conn).unwrap();
        tracks[0].played = true;
        update_played(&mut conn, &tracks).unwrap();

        let reloaded = load_tracks(&conn).unwrap();
        assert!(reloaded[0].played);
        assert!(!reloaded[1].played);

        assert_eq!(reset_played(&conn).unwrap(), 1);
        let reloaded = load_tracks(&conn).unwrap();
        assert!(reloaded.iter().all(|t| !t.played));
    }

    #[test]
    fn test_ingest_file_end_to_end() {
        let (dir, mut conn) = test_db();
        let doc = serde_json::json!([
            {
                "title": "Analyzed",
                "artist": "A",
                "genre": "techno",
                "tempo": 132,
                "loudness": 0.5,
                "key": "Bb",
                "timbre": vec![0.25; 64],
            },
            {
                "title": "Pending",
                "artist": "B",
                "tempo": 0,
            }
        ]);
        let path = dir.path().join("batch.json");
        fs::write(&path, doc.to_string()).unwrap();

        assert_eq!(ingest_file(&mut conn, &path).unwrap(), 2);
        let tracks = load_tracks(&conn).unwrap();

        assert_eq!(tracks[0].analyzed, AnalysisState::Complete);
        assert_eq!(tracks[0].key.unwrap().name(), "A#");
        // Tempo 0 means "analyzer could not estimate" and becomes unknown.
        assert_eq!(tracks[1].tempo, None);
        assert_eq!(tracks[1].analyzed, AnalysisState::ToDo);
        assert!(tracks[1].timbre_64().is_none());
    }

    #[test]
    fn test_ingest_rejects_bad_timbre_length() {
        let (dir, mut conn) = test_db();
        let doc = serde_json::json!([
            { "title": "Short", "artist": "A", "timbre": vec![1.0; 16] }
        ]);
        let path = dir.path().join("bad.json");
        fs::write(&path, doc.to_string()).unwrap();

        assert!(ingest_file(&mut conn, &path).is_err());
        // The transaction never committed.
        assert!(load_tracks(&conn).unwrap().is_empty());
    }
}
