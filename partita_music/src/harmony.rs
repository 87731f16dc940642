// Markov model for harmonic guidance.
//
// A first-order chain over the seven scale degrees (0 = tonic, 4 = dominant,
// ...). Each profile carries its own 7x7 transition table; row `d` holds the
// probabilities of moving from degree `d` to each degree at the next bar.
// The built-in tables are hand-weighted towards functional progressions
// (ii→V, V→I, vii°→I) and every row sums to 1.
//
// Tables can also be loaded from JSON for experimentation. Loaded rows are
// renormalized so a file of raw counts works as well as probabilities.

use crate::error::{MusicError, Result};
use crate::style::StyleProfile;
use partita_prng::Prng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of diatonic degrees the chain moves over.
pub const DEGREES: usize = 7;

const BACH_ROWS: [[f64; DEGREES]; DEGREES] = [
    [0.05, 0.10, 0.05, 0.25, 0.35, 0.15, 0.05],
    [0.05, 0.05, 0.05, 0.10, 0.55, 0.10, 0.10],
    [0.05, 0.05, 0.05, 0.25, 0.10, 0.45, 0.05],
    [0.25, 0.15, 0.05, 0.05, 0.35, 0.05, 0.10],
    [0.55, 0.05, 0.05, 0.10, 0.05, 0.15, 0.05],
    [0.05, 0.30, 0.10, 0.25, 0.20, 0.05, 0.05],
    [0.70, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05],
];

const BEETHOVEN_ROWS: [[f64; DEGREES]; DEGREES] = [
    [0.10, 0.10, 0.05, 0.20, 0.35, 0.15, 0.05],
    [0.05, 0.05, 0.05, 0.05, 0.60, 0.05, 0.15],
    [0.10, 0.05, 0.05, 0.20, 0.15, 0.40, 0.05],
    [0.20, 0.10, 0.05, 0.05, 0.40, 0.05, 0.15],
    [0.60, 0.05, 0.05, 0.05, 0.05, 0.15, 0.05],
    [0.05, 0.25, 0.10, 0.20, 0.30, 0.05, 0.05],
    [0.65, 0.05, 0.05, 0.05, 0.10, 0.05, 0.05],
];

/// Degree-to-degree transition probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyTable {
    pub rows: [[f64; DEGREES]; DEGREES],
}

impl HarmonyTable {
    /// Built-in table for a profile.
    pub fn for_profile(profile: StyleProfile) -> Self {
        let rows = match profile {
            StyleProfile::Bach => BACH_ROWS,
            StyleProfile::Beethoven => BEETHOVEN_ROWS,
        };
        HarmonyTable { rows }
    }

    /// Load a table from a JSON file (`{ "rows": [[...], ...] }`).
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let table: HarmonyTable = serde_json::from_str(&data)?;
        table.normalized()
    }

    /// Scale every row to sum to 1. Negative or non-finite weights are an
    /// error, as is a row with no positive weight.
    pub fn normalized(mut self) -> Result<Self> {
        for (i, row) in self.rows.iter_mut().enumerate() {
            if row.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(MusicError::Config(format!(
                    "harmony row {i} has a negative or non-finite weight"
                )));
            }
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                return Err(MusicError::Config(format!("harmony row {i} is all zero")));
            }
            for w in row.iter_mut() {
                *w /= total;
            }
        }
        Ok(self)
    }

    /// Draw the degree that follows `current`. Always in `0..DEGREES`.
    pub fn weighted_next_degree(&self, current: usize, rng: &mut Prng) -> usize {
        let row = &self.rows[current.min(DEGREES - 1)];
        rng.weighted_index(row).unwrap_or(0).min(DEGREES - 1)
    }

    /// Walk the chain for `bars` steps starting on the tonic. The first
    /// entry is always degree 0.
    pub fn progression(&self, bars: usize, rng: &mut Prng) -> Vec<usize> {
        let mut degrees = Vec::with_capacity(bars);
        let mut current = 0;
        for bar in 0..bars {
            if bar > 0 {
                current = self.weighted_next_degree(current, rng);
            }
            degrees.push(current);
        }
        degrees
    }
}
