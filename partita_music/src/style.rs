// Style profiles: how a free-form style label becomes concrete parameters.
//
// Style labels come from users ("baroque dance", "Chopin nocturne", anything
// at all), so resolution is total: every label maps to exactly one
// `StyleProfile` and one `RubatoShape`, and unknown labels land on the
// Beethoven defaults rather than failing.
//
// A profile owns the raw material the generator draws from: an 8-pitch
// diatonic scale (degree 7 is the octave), a tempo range, the step-vs-leap
// balance of its melodic walk, and a dynamics palette. The harmonic Markov
// table for each profile lives in `harmony.rs`.

use crate::model::Dynamic;

/// Resolved generator profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleProfile {
    /// Bright major-mode counterpoint, brisk tempi, mostly stepwise.
    Bach,
    /// Harmonic minor, wider tempo range, more leaps. The default.
    Beethoven,
}

impl StyleProfile {
    /// Resolve a style label. Total: unknown labels map to `Beethoven`.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("bach") || label.contains("baroque") {
            StyleProfile::Bach
        } else {
            StyleProfile::Beethoven
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StyleProfile::Bach => "Bach",
            StyleProfile::Beethoven => "Beethoven",
        }
    }

    /// Eight absolute pitches, tonic to octave.
    pub fn scale(self) -> [u8; 8] {
        match self {
            StyleProfile::Bach => [60, 62, 64, 65, 67, 69, 71, 72],
            StyleProfile::Beethoven => [60, 62, 63, 65, 67, 68, 71, 72],
        }
    }

    /// Inclusive BPM range for derived tempi.
    pub fn tempo_range(self) -> (u32, u32) {
        match self {
            StyleProfile::Bach => (88, 126),
            StyleProfile::Beethoven => (60, 108),
        }
    }

    /// Probability that the melodic walk moves by step rather than leap.
    pub fn step_probability(self) -> f64 {
        match self {
            StyleProfile::Bach => 0.8,
            StyleProfile::Beethoven => 0.65,
        }
    }

    /// Dynamic markings cycled across section openings.
    pub fn dynamics(self) -> &'static [Dynamic] {
        match self {
            StyleProfile::Bach => &[Dynamic::Mf, Dynamic::F, Dynamic::Mp, Dynamic::F],
            StyleProfile::Beethoven => &[
                Dynamic::P,
                Dynamic::Mf,
                Dynamic::F,
                Dynamic::Ff,
                Dynamic::Pp,
            ],
        }
    }

    /// Subtitle shown under the title.
    pub fn subtitle(self) -> &'static str {
        match self {
            StyleProfile::Bach => "in the style of J. S. Bach",
            StyleProfile::Beethoven => "in the style of L. van Beethoven",
        }
    }
}

/// Timing curve applied to note onsets across each section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RubatoShape {
    /// Parabolic push then pull, centred on the section midpoint.
    PushPull,
    /// Flat, then a quadratic slowdown over the last quarter.
    LateRitardando,
    /// Flat, then a small linear drag over the last tenth.
    SteadyCadence,
}

impl RubatoShape {
    /// Resolve a rubato shape from the same label as the profile.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("chopin") || lower.contains("romantic") {
            return RubatoShape::PushPull;
        }
        match StyleProfile::from_label(label) {
            StyleProfile::Bach => RubatoShape::SteadyCadence,
            StyleProfile::Beethoven => RubatoShape::LateRitardando,
        }
    }

    /// Onset offset in beats at `fraction` (0..1) through a section.
    pub fn offset(self, fraction: f64) -> f64 {
        let f = fraction.clamp(0.0, 1.0);
        match self {
            RubatoShape::PushPull => 0.08 * ((2.0 * f - 1.0).powi(2) - 0.5),
            RubatoShape::LateRitardando => {
                if f > 0.75 {
                    0.25 * ((f - 0.75) / 0.25).powi(2)
                } else {
                    0.0
                }
            }
            RubatoShape::SteadyCadence => {
                if f > 0.9 {
                    0.06 * (f - 0.9) / 0.1
                } else {
                    0.0
                }
            }
        }
    }
}

/// Fixed rhythmic cells in beats. The melodic walk picks one uniformly at a
/// time until the motif is full.
pub const RHYTHM_CELLS: [&[f64]; 6] = [
    &[1.0],
    &[0.5, 0.5],
    &[0.5, 0.25, 0.25],
    &[0.25, 0.25, 0.5],
    &[0.75, 0.25],
    &[1.5, 0.5],
];

/// FNV-1a, 64-bit. Stable across platforms and compiler versions, unlike
/// `std::hash`.
fn fnv1a64(chunks: &[&[u8]]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for chunk in chunks {
        for &byte in *chunk {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

/// Deterministic tempo for a `(style, title)` pair, inside the resolved
/// profile's range.
pub fn derive_tempo(style: &str, title: &str) -> u32 {
    let (low, high) = StyleProfile::from_label(style).tempo_range();
    // The separator keeps ("ab", "c") and ("a", "bc") apart.
    let hash = fnv1a64(&[style.as_bytes(), &[0xff], title.as_bytes()]);
    low + (hash % (high - low + 1) as u64) as u32
}
