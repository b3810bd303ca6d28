//! Next-track selection engine.
//!
//! Given the currently playing track and the track pool, the selector
//! filters out unusable candidates (unanalyzed, already played, the current
//! track itself), narrows by tempo and optionally genre, and picks the next
//! track by timbre similarity under one of several strategies.
//!
//! Two families of strategies exist:
//!
//! - **Ranked**: pick the candidate with the minimum distance to the
//!   current track. Tightest transition, but biases toward near-duplicates.
//! - **Median**: pick the candidate whose distance is closest to the median
//!   of all candidate distances. Keeps the set varied while staying inside
//!   the tempo/genre window.

use anyhow::{bail, Context, Result};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::track::{AnalysisState, Track};
use crate::vector::{self, DistanceFormula};

/// Selection strategy. One exhaustive `match` dispatches these, so a
/// missing implementation is a compile error rather than a runtime lookup
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Uniform-random pick from the unfiltered candidates.
    Random,
    /// Tempo window, then minimum timbre distance.
    RankedBpm,
    /// Tempo window, then median-closest timbre distance.
    MedianBpm,
    /// Tempo window, then minimum timbre + loudness distance.
    RankedLoudness,
    /// Tempo window, then median-closest timbre + loudness distance.
    MedianLoudness,
    /// Genre filter, tempo window, then minimum timbre + loudness distance.
    RankedGenre,
    /// Genre filter, tempo window, then median-closest timbre + loudness
    /// distance.
    MedianGenre,
}

impl FromStr for Algorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "rankedbpm" => Ok(Self::RankedBpm),
            "medianbpm" => Ok(Self::MedianBpm),
            "rankedloudness" => Ok(Self::RankedLoudness),
            "medianloudness" => Ok(Self::MedianLoudness),
            "rankedgenre" => Ok(Self::RankedGenre),
            "mediangenre" => Ok(Self::MedianGenre),
            other => bail!(
                "Invalid algorithm '{other}': expected one of random, rankedBPM, \
                 medianBPM, rankedLoudness, medianLoudness, rankedGenre, medianGenre"
            ),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::RankedBpm => "rankedBPM",
            Self::MedianBpm => "medianBPM",
            Self::RankedLoudness => "rankedLoudness",
            Self::MedianLoudness => "medianLoudness",
            Self::RankedGenre => "rankedGenre",
            Self::MedianGenre => "medianGenre",
        };
        write!(f, "{name}")
    }
}

/// Validated engine configuration. Both fields are resolved from their
/// string spellings exactly once, at startup; selection never parses.
#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    pub algorithm: Algorithm,
    pub formula: DistanceFormula,
}

impl SelectorConfig {
    /// Resolve configuration strings. Any invalid name is fatal here.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is unrecognized.
    pub fn from_names(algorithm: &str, formula: &str) -> Result<Self> {
        Ok(Self {
            algorithm: algorithm
                .parse()
                .context("Failed to resolve selection algorithm")?,
            formula: formula
                .parse()
                .context("Failed to resolve distance formula")?,
        })
    }
}

/// Initial tempo window half-width, and the step it widens by.
const BPM_WINDOW_STEP: u32 = 3;

/// The track pool a selection runs against.
///
/// Selection reads the whole pool and writes one `played` flag, so the
/// entire read-filter-mark-dispatch sequence runs under this lock. Without
/// it, two concurrent calls could both observe a non-empty candidate set
/// and double-mark the current track.
#[derive(Debug)]
pub struct TrackPool {
    tracks: Mutex<Vec<Track>>,
}

impl TrackPool {
    #[must_use]
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks: Mutex::new(tracks),
        }
    }

    /// Run one atomic selection against the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the current track is missing from the pool or a
    /// distance computation fails.
    pub fn select_next(&self, selector: &mut Selector, current_id: i64) -> Result<Track> {
        let mut tracks = self
            .tracks
            .lock()
            .map_err(|_| anyhow::anyhow!("Track pool lock poisoned"))?;
        selector.select_next(&mut tracks, current_id)
    }

    /// Copy of the pool contents, e.g. for persisting played flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self) -> Result<Vec<Track>> {
        let tracks = self
            .tracks
            .lock()
            .map_err(|_| anyhow::anyhow!("Track pool lock poisoned"))?;
        Ok(tracks.clone())
    }
}

/// The selection engine. Holds the validated configuration and the RNG
/// used by the random strategy.
#[derive(Debug)]
pub struct Selector {
    config: SelectorConfig,
    rng: StdRng,
}

impl Selector {
    #[must_use]
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic selector for tests and reproducible sets.
    #[must_use]
    pub fn with_seed(config: SelectorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn config(&self) -> SelectorConfig {
        self.config
    }

    /// Select the next track to play after `current_id`.
    ///
    /// The caller must serialize access to `tracks`; [`TrackPool`] does so
    /// with its lock. Candidates are the tracks that are fully analyzed,
    /// not yet played, and not the current track. If none remain, the
    /// current track is returned unchanged and nothing is mutated.
    /// Otherwise the current track is marked played and the configured
    /// strategy picks from the candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if `current_id` is not in the pool, if the current
    /// track lacks a timbre vector while a distance-based strategy is
    /// configured, or if a distance computation fails.
    pub fn select_next(&mut self, tracks: &mut [Track], current_id: i64) -> Result<Track> {
        let current_idx = tracks
            .iter()
            .position(|t| t.id == current_id)
            .with_context(|| format!("Track id {current_id} is not in the pool"))?;

        let candidates: Vec<usize> = tracks
            .iter()
            .enumerate()
            .filter(|(i, t)| {
                *i != current_idx
                    && t.analyzed == AnalysisState::Complete
                    && t.timbre.is_some()
                    && !t.played
            })
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            // Degenerate library: nothing usable besides the current track.
            // Hand it back untouched; the caller surfaces this to the user.
            debug!("No eligible candidates; returning current track unchanged");
            return Ok(tracks[current_idx].clone());
        }

        let current = tracks[current_idx].clone();
        if self.config.algorithm != Algorithm::Random && current.timbre_64().is_none() {
            bail!(
                "Current track '{}' has no timbre vector; only 'random' can select from it",
                current.title
            );
        }

        tracks[current_idx].played = true;
        trace!(
            "Selecting after '{}' with {} candidates ({})",
            current.title,
            candidates.len(),
            self.config.algorithm
        );

        let chosen = match self.config.algorithm {
            Algorithm::Random => candidates[self.rng.gen_range(0..candidates.len())],
            Algorithm::RankedBpm => {
                let subset = similar_tempo(tracks, &current, &candidates);
                let distances = self.timbre_distances(tracks, &current, &subset)?;
                subset[pick_minimum(&distances)]
            }
            Algorithm::MedianBpm => {
                let subset = similar_tempo(tracks, &current, &candidates);
                let distances = self.timbre_distances(tracks, &current, &subset)?;
                subset[pick_median_closest(&distances)]
            }
            Algorithm::RankedLoudness => {
                let subset = similar_tempo(tracks, &current, &candidates);
                let distances = self.combined_distances(tracks, &current, &subset)?;
                subset[pick_minimum(&distances)]
            }
            Algorithm::MedianLoudness => {
                let subset = similar_tempo(tracks, &current, &candidates);
                let distances = self.combined_distances(tracks, &current, &subset)?;
                subset[pick_median_closest(&distances)]
            }
            Algorithm::RankedGenre => {
                let subset = same_genre(tracks, &current, &candidates);
                let subset = similar_tempo(tracks, &current, &subset);
                let distances = self.combined_distances(tracks, &current, &subset)?;
                subset[pick_minimum(&distances)]
            }
            Algorithm::MedianGenre => {
                let subset = same_genre(tracks, &current, &candidates);
                let subset = similar_tempo(tracks, &current, &subset);
                let distances = self.combined_distances(tracks, &current, &subset)?;
                subset[pick_median_closest(&distances)]
            }
        };

        let next = tracks[chosen].clone();
        debug!(
            "Suggested '{}' (tempo {:?}, key distance {:.1})",
            next.title,
            next.tempo,
            vector::circle_of_fifths_distance(current.key, next.key)
        );
        Ok(next)
    }

    /// Timbre distance from `current` to every track in `subset`, in
    /// subset order. Parallel, but order-preserving, so index tie-breaks
    /// stay deterministic.
    fn timbre_distances(
        &self,
        tracks: &[Track],
        current: &Track,
        subset: &[usize],
    ) -> Result<Vec<f64>> {
        let formula = self.config.formula;
        let current_timbre = current
            .timbre_64()
            .context("Current track has no timbre vector")?;

        subset
            .par_iter()
            .map(|&i| {
                let candidate = tracks[i]
                    .timbre_64()
                    .with_context(|| {
                        format!("Candidate '{}' has no timbre vector", tracks[i].title)
                    })?;
                vector::distance(&current_timbre, &candidate, formula)
            })
            .collect()
    }

    /// Timbre distance plus loudness distance for every track in `subset`.
    fn combined_distances(
        &self,
        tracks: &[Track],
        current: &Track,
        subset: &[usize],
    ) -> Result<Vec<f64>> {
        let timbre = self.timbre_distances(tracks, current, subset)?;
        Ok(subset
            .iter()
            .zip(timbre)
            .map(|(&i, t)| t + vector::loudness_distance(current.loudness, tracks[i].loudness))
            .collect())
    }
}

/// Narrow `candidates` to tracks with tempo near the current track's.
///
/// Starts at an inclusive +/-3 BPM window and widens by 3 until at least
/// one candidate qualifies. If the current track has no usable tempo, or
/// no candidate does, the set is returned unchanged - tempo is a soft
/// constraint and the search must terminate.
#[must_use]
pub fn similar_tempo(tracks: &[Track], current: &Track, candidates: &[usize]) -> Vec<usize> {
    let Some(current_bpm) = current.usable_tempo() else {
        return candidates.to_vec();
    };

    // Widest deviation we could ever need: past this, widening can't admit
    // anyone new and the loop must stop.
    let max_deviation = candidates
        .iter()
        .filter_map(|&i| tracks[i].usable_tempo())
        .map(|bpm| bpm.abs_diff(current_bpm))
        .max();
    let Some(max_deviation) = max_deviation else {
        return candidates.to_vec();
    };

    let mut offset = BPM_WINDOW_STEP;
    loop {
        let subset: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| {
                tracks[i]
                    .usable_tempo()
                    .is_some_and(|bpm| bpm.abs_diff(current_bpm) <= offset)
            })
            .collect();

        if !subset.is_empty() {
            trace!(
                "Tempo window +/-{offset} BPM around {current_bpm} matched {} of {} candidates",
                subset.len(),
                candidates.len()
            );
            return subset;
        }
        if offset >= max_deviation {
            // Should be unreachable: a window covering the full observed
            // range always matches. Kept so the loop provably terminates.
            return candidates.to_vec();
        }
        offset += BPM_WINDOW_STEP;
    }
}

/// Narrow `candidates` to the current track's genre.
///
/// Genre is a soft preference: no genre on the current track, or no
/// matching candidate, leaves the set unchanged.
#[must_use]
pub fn same_genre(tracks: &[Track], current: &Track, candidates: &[usize]) -> Vec<usize> {
    let Some(genre) = current.genre.as_deref() else {
        return candidates.to_vec();
    };

    let subset: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| tracks[i].genre.as_deref() == Some(genre))
        .collect();

    if subset.is_empty() {
        candidates.to_vec()
    } else {
        subset
    }
}

/// Index of the strict minimum; the first occurrence wins ties.
fn pick_minimum(distances: &[f64]) -> usize {
    let mut best = 0;
    for (i, &d) in distances.iter().enumerate() {
        if d < distances[best] {
            best = i;
        }
    }
    best
}

/// Index of the distance closest to the lower median; first occurrence
/// wins ties.
///
/// The lower median is the sorted element at `len / 2` - never the average
/// of the two middles on even-length lists. Matching the typical distance
/// instead of the minimum keeps the set varied.
fn pick_median_closest(distances: &[f64]) -> usize {
    let mut sorted = distances.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = sorted[sorted.len() / 2];

    let mut best = 0;
    let mut best_deviation = f64::INFINITY;
    for (i, &d) in distances.iter().enumerate() {
        let deviation = (d - median).abs();
        if deviation < best_deviation {
            best_deviation = deviation;
            best = i;
        }
    }
    best
}
