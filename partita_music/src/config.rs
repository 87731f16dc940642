// Data-driven configuration.
//
// Every tunable number in the pipeline lives here in `PartitaConfig`: grid
// resolution, page layout, generator form and ranges, transcriber window
// sizes and thresholds. Components read these values instead of hard-coding
// them, so a JSON file can retune the system without recompiling.
//
// Each struct carries `#[serde(default)]`, so a config file only needs the
// fields it overrides:
//
//     { "generator": { "bass_rest_probability": 0.25 } }
//
// See also: `quantize.rs` (GridConfig), `layout.rs` (NotationConfig),
// `generator.rs` (GeneratorConfig), `transcribe.rs` (TranscriberConfig).

use crate::error::{MusicError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Temporal grid and velocity domain used by the quantizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Smallest schedulable time step, in beats. Should be a power of two
    /// fraction so grid multiples stay exact in binary floating point.
    pub unit_beats: f64,
    /// Notes at or above this pitch go to the upper (treble) voice.
    pub split_pitch: u8,
    pub min_velocity: f64,
    pub max_velocity: f64,
    /// Imported pieces may not run past this beat. Layout allocates every
    /// measure up to the last note, so this bounds memory.
    pub max_beats: f64,
}

impl GridConfig {
    /// Grid steps per beat (16 for the default 1/16-beat grid).
    pub fn units_per_beat(&self) -> u32 {
        (1.0 / self.unit_beats).round() as u32
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            unit_beats: 1.0 / 16.0,
            split_pitch: 60,
            min_velocity: 0.05,
            max_velocity: 1.0,
            max_beats: 16384.0,
        }
    }
}

/// Measure and page layout shared by the ABC and MusicXML encoders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotationConfig {
    /// Beats (quarter notes) per measure. Meter is written as N/4.
    pub beats_per_measure: u32,
    /// Short pieces are padded with empty measures up to this count.
    pub minimum_page_measures: usize,
    pub measures_per_line: usize,
    /// A page break follows every this-many measure lines.
    pub lines_per_page: usize,
    /// MusicXML `<divisions>`: ticks per quarter note.
    pub divisions_per_quarter: u32,
}

impl Default for NotationConfig {
    fn default() -> Self {
        NotationConfig {
            beats_per_measure: 4,
            minimum_page_measures: 8,
            measures_per_line: 4,
            lines_per_page: 6,
            divisions_per_quarter: 16,
        }
    }
}

/// Stochastic generator parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Length of the seed motif in beats.
    pub seed_beats: f64,
    /// Number of formal sections, each one seed-motif long.
    pub sections: usize,
    /// Inversion axis for the inverted-motif sections.
    pub pivot_pitch: u8,
    /// Inclusive melody pitch range.
    pub melody_range: (u8, u8),
    /// Inclusive bass pitch range.
    pub bass_range: (u8, u8),
    /// Chance that a bar of the bass line is left silent instead of
    /// holding the bar's root/third dyad.
    pub bass_rest_probability: f64,
    pub melody_velocity: f64,
    /// Half-width of the random velocity spread around `melody_velocity`.
    pub velocity_jitter: f64,
    pub bass_velocity: f64,
    pub composer: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            seed_beats: 8.0,
            sections: 32,
            pivot_pitch: 67,
            melody_range: (60, 84),
            bass_range: (36, 59),
            bass_rest_probability: 0.4,
            melody_velocity: 0.7,
            velocity_jitter: 0.15,
            bass_velocity: 0.55,
            composer: "Partita".to_string(),
        }
    }
}

/// Audio transcriber parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Analysis window length in samples.
    pub window_size: usize,
    /// Distance between successive window starts, in samples.
    pub hop_size: usize,
    /// Windows with RMS below this are treated as silence.
    pub rms_threshold: f32,
    /// Lowest detectable fundamental (sets the longest lag searched).
    pub min_freq: f64,
    /// Highest detectable fundamental (sets the shortest lag searched).
    pub max_freq: f64,
    /// Segments shorter than this are discarded as noise.
    pub min_note_seconds: f64,
    /// Tempo used to convert seconds to beats. Not inferred from audio.
    pub tempo: u32,
    /// Frames analysed per `advance()` before control returns to the caller.
    pub frames_per_chunk: usize,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        TranscriberConfig {
            window_size: 2048,
            hop_size: 512,
            rms_threshold: 0.01,
            min_freq: 80.0,
            max_freq: 1000.0,
            min_note_seconds: 0.12,
            tempo: 100,
            frames_per_chunk: 64,
        }
    }
}

/// Top-level configuration: one section per pipeline stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitaConfig {
    pub grid: GridConfig,
    pub notation: NotationConfig,
    pub generator: GeneratorConfig,
    pub transcriber: TranscriberConfig,
}

impl PartitaConfig {
    /// Parse a config from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PartitaConfig =
            serde_json::from_str(json).map_err(|e| MusicError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| MusicError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&data)
    }

    /// Reject values that would make a stage loop forever or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(MusicError::Config(msg.to_string()));
        if !(self.grid.unit_beats > 0.0) {
            return bad("grid.unit_beats must be positive");
        }
        // The encoders count in whole grid steps: 16 ABC length units and
        // `divisions_per_quarter` MusicXML ticks must both divide evenly.
        let per_beat = 1.0 / self.grid.unit_beats;
        let units = self.grid.units_per_beat();
        if units == 0 || (per_beat - units as f64).abs() > 1e-9 || 16 % units != 0 {
            return bad("grid.unit_beats must be 1, 1/2, 1/4, 1/8 or 1/16");
        }
        if self.notation.divisions_per_quarter % units != 0 {
            return bad("notation.divisions_per_quarter must be a multiple of the grid steps per beat");
        }
        if !(self.grid.max_beats > 0.0) {
            return bad("grid.max_beats must be positive");
        }
        if self.grid.min_velocity > self.grid.max_velocity {
            return bad("grid.min_velocity exceeds grid.max_velocity");
        }
        if self.notation.beats_per_measure == 0
            || self.notation.measures_per_line == 0
            || self.notation.lines_per_page == 0
            || self.notation.divisions_per_quarter == 0
        {
            return bad("notation layout values must be non-zero");
        }
        if !(self.generator.seed_beats > 0.0) || self.generator.sections == 0 {
            return bad("generator needs a positive seed length and at least one section");
        }
        if self.generator.melody_range.0 > self.generator.melody_range.1
            || self.generator.bass_range.0 > self.generator.bass_range.1
        {
            return bad("generator pitch ranges must be low <= high");
        }
        let t = &self.transcriber;
        if t.window_size == 0 || t.hop_size == 0 || t.frames_per_chunk == 0 || t.tempo == 0 {
            return bad("transcriber sizes and tempo must be non-zero");
        }
        if !(t.min_freq > 0.0) || t.min_freq >= t.max_freq {
            return bad("transcriber needs 0 < min_freq < max_freq");
        }
        Ok(())
    }
}
