// Stochastic composition generator.
//
// Builds a two-track piece (melody over a sustained bass) from a style label
// and a title. The label resolves to a `StyleProfile` and a `RubatoShape`
// (see `style.rs`); the title only feeds the tempo hash.
//
// Pipeline:
// 1. Seed motif: a step/leap random walk over scale indices 0..=7, with
//    durations drawn from the fixed rhythm cells until the motif is full.
// 2. Form: `sections` copies of the motif's length. Section `s` takes the
//    motif through the transform picked by `s % 4`: identity, sequence one
//    degree up, inversion about the pivot, or a fresh walk.
// 3. Rubato: each onset is nudged by the shape's offset at its position
//    within the section.
// 4. Bass: a Markov walk over degrees (`harmony.rs`), one root+third dyad
//    per bar, some bars left silent.
// 5. Decoration and normalization: fingering, dynamics, slurs, then every
//    note goes through the quantizer.
//
// All randomness comes from the `&mut Prng` argument; the generator keeps no
// state between calls. `compose()` is the entropy-seeded convenience entry.

use crate::config::{GeneratorConfig, GridConfig, PartitaConfig};
use crate::harmony::{DEGREES, HarmonyTable};
use crate::model::{Composition, Instrument, Note, Track};
use crate::quantize::{quantize_note, sort_notes};
use crate::style::{RHYTHM_CELLS, RubatoShape, StyleProfile, derive_tempo};
use partita_prng::Prng;

/// What to compose.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeRequest {
    pub style: String,
    pub title: String,
    /// Overrides the profile's default subtitle.
    pub subtitle: Option<String>,
}

impl ComposeRequest {
    pub fn new(style: impl Into<String>, title: impl Into<String>) -> Self {
        ComposeRequest {
            style: style.into(),
            title: title.into(),
            subtitle: None,
        }
    }
}

/// One note of a motif, in scale indices relative to the motif start.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MotifNote {
    /// Index into the 8-pitch scale (7 is the upper tonic).
    index: usize,
    start: f64,
    duration: f64,
}

/// Melody note after transformation, before rubato and decoration.
#[derive(Debug, Clone, Copy)]
struct Placed {
    pitch: u8,
    degree: usize,
    start: f64,
    duration: f64,
}

/// The transform applied to a section, selected by `section % 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionForm {
    Identity,
    Sequence,
    Inversion,
    Fresh,
}

impl SectionForm {
    fn for_section(section: usize) -> Self {
        match section % 4 {
            0 => SectionForm::Identity,
            1 => SectionForm::Sequence,
            2 => SectionForm::Inversion,
            _ => SectionForm::Fresh,
        }
    }
}

pub struct Generator {
    config: GeneratorConfig,
    grid: GridConfig,
    bar_beats: f64,
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new(GeneratorConfig::default())
    }
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Generator {
            config,
            grid: GridConfig::default(),
            bar_beats: 4.0,
        }
    }

    /// Generator using every relevant section of a full config.
    pub fn from_config(config: &PartitaConfig) -> Self {
        Generator {
            config: config.generator.clone(),
            grid: config.grid.clone(),
            bar_beats: config.notation.beats_per_measure as f64,
        }
    }

    /// Compose a full piece. Deterministic for a given `rng` state.
    pub fn compose(&self, request: &ComposeRequest, rng: &mut Prng) -> Composition {
        let profile = StyleProfile::from_label(&request.style);
        let rubato = RubatoShape::from_label(&request.style);
        let tempo = derive_tempo(&request.style, &request.title);

        let seed = self.walk_motif(profile, rng);
        let melody = self.melody(profile, rubato, &seed, rng);
        let bass = self.bass(profile, rng);

        let title = if request.title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            request.title.clone()
        };
        let subtitle = request
            .subtitle
            .clone()
            .unwrap_or_else(|| profile.subtitle().to_string());

        Composition {
            title,
            subtitle: Some(subtitle),
            composer: self.config.composer.clone(),
            style: request.style.clone(),
            tempo,
            tracks: vec![
                Track {
                    instrument: Instrument::Piano,
                    volume: 0.8,
                    notes: melody,
                },
                Track {
                    instrument: Instrument::Piano,
                    volume: 0.7,
                    notes: bass,
                },
            ],
        }
    }

    /// Step/leap walk filling `seed_beats` with notes from the rhythm cells.
    fn walk_motif(&self, profile: StyleProfile, rng: &mut Prng) -> Vec<MotifNote> {
        let length = self.config.seed_beats;
        let top = profile.scale().len() - 1;
        let mut notes = Vec::new();
        let mut index = rng.range_usize(0, top + 1);
        let mut t = 0.0;

        while t < length {
            let cell = rng.choose(&RHYTHM_CELLS).copied().unwrap_or(&[1.0]);
            for &d in cell {
                if t >= length {
                    break;
                }
                let duration = d.min(length - t);
                notes.push(MotifNote {
                    index,
                    start: t,
                    duration,
                });
                t += duration;
                index = next_index(index, top, profile.step_probability(), rng);
            }
        }
        notes
    }

    fn melody(
        &self,
        profile: StyleProfile,
        rubato: RubatoShape,
        seed: &[MotifNote],
        rng: &mut Prng,
    ) -> Vec<Note> {
        let scale = profile.scale();
        let palette = profile.dynamics();
        let (lo, hi) = self.config.melody_range;
        let section_beats = self.config.seed_beats;
        let jitter = self.config.velocity_jitter;
        let mut out = Vec::new();

        for section in 0..self.config.sections {
            let placed: Vec<Placed> = match SectionForm::for_section(section) {
                SectionForm::Identity => seed.iter().map(|n| identity(n, &scale)).collect(),
                SectionForm::Sequence => seed.iter().map(|n| sequence_up(n, &scale)).collect(),
                SectionForm::Inversion => seed
                    .iter()
                    .map(|n| invert(n, &scale, self.config.pivot_pitch))
                    .collect(),
                SectionForm::Fresh => self
                    .walk_motif(profile, rng)
                    .iter()
                    .map(|n| identity(n, &scale))
                    .collect(),
            };

            let offset = section as f64 * section_beats;
            for (i, p) in placed.iter().enumerate() {
                let fraction = p.start / section_beats;
                let velocity = if jitter > 0.0 {
                    self.config.melody_velocity + rng.range_f64(-jitter, jitter)
                } else {
                    self.config.melody_velocity
                };
                // Rubato may delay an onset, but not past the note's own
                // slot, so line order and section downbeats are preserved.
                let latest_onset = offset + p.start + p.duration - self.grid.unit_beats;
                let onset = (offset + p.start + rubato.offset(fraction)).min(latest_onset);
                let index = out.len();
                let mut note = Note::new(fold_into(p.pitch as i32, lo, hi), onset, p.duration)
                    .with_velocity(velocity);
                note.fingering = Some((p.degree % 5) as u8 + 1);
                if i == 0 && !palette.is_empty() {
                    note.dynamic = Some(palette[section % palette.len()]);
                }
                note.slur_start = index % 3 == 0;
                note.slur_end = index % 3 == 2;
                out.push(quantize_note(&note, &self.grid));
            }
        }
        sort_notes(&mut out);
        clip_to_next_onset(&mut out, self.config.sections as f64 * section_beats);
        out
    }

    /// One root+third dyad per bar following the harmony chain, with some
    /// bars left silent.
    fn bass(&self, profile: StyleProfile, rng: &mut Prng) -> Vec<Note> {
        let scale = profile.scale();
        let table = HarmonyTable::for_profile(profile);
        let (lo, hi) = self.config.bass_range;
        let total_beats = self.config.sections as f64 * self.config.seed_beats;
        let bars = (total_beats / self.bar_beats).ceil() as usize;
        let mut out = Vec::new();

        for (bar, degree) in table.progression(bars, rng).into_iter().enumerate() {
            if rng.random_bool(self.config.bass_rest_probability) {
                continue;
            }
            let third_degree = degree + 2;
            let root = scale[degree] as i32;
            let third = scale[third_degree % DEGREES] as i32
                + if third_degree >= DEGREES { 12 } else { 0 };
            let start = bar as f64 * self.bar_beats;
            for (pitch, deg) in [(root, degree), (third, third_degree % DEGREES)] {
                let mut note = Note::new(fold_into(pitch, lo, hi), start, self.bar_beats)
                    .with_velocity(self.config.bass_velocity);
                note.fingering = Some((deg % 5) as u8 + 1);
                out.push(quantize_note(&note, &self.grid));
            }
        }
        sort_notes(&mut out);
        out
    }
}

/// Entropy-seeded composition with the default configuration.
pub fn compose(request: &ComposeRequest) -> Composition {
    Generator::default().compose(request, &mut Prng::from_entropy())
}

/// Shorten each note of a sorted single line so it releases at or before
/// the next onset, and the last one by `end`. Delayed onsets would otherwise
/// overlap their successor and swallow it in the measure layout.
fn clip_to_next_onset(notes: &mut [Note], end: f64) {
    for i in 0..notes.len() {
        let time = notes[i].time;
        let release = notes[i + 1..]
            .iter()
            .map(|n| n.time)
            .find(|&t| t > time)
            .unwrap_or(end);
        if notes[i].end() > release && release > time {
            notes[i].duration = release - time;
        }
    }
}

fn next_index(index: usize, top: usize, step_probability: f64, rng: &mut Prng) -> usize {
    if rng.random_bool(step_probability) {
        let up = rng.random_bool(0.5);
        // Reflect at the ends of the scale.
        match (up, index) {
            (true, i) if i >= top => top.saturating_sub(1),
            (true, i) => i + 1,
            (false, 0) => 1.min(top),
            (false, i) => i - 1,
        }
    } else {
        rng.range_usize(0, top + 1)
    }
}

fn identity(n: &MotifNote, scale: &[u8; 8]) -> Placed {
    Placed {
        pitch: scale[n.index],
        degree: n.index % DEGREES,
        start: n.start,
        duration: n.duration,
    }
}

/// Shift one degree up within the note's octave; degree 6 wraps to degree 0
/// of the same octave.
fn sequence_up(n: &MotifNote, scale: &[u8; 8]) -> Placed {
    let octave = n.index / DEGREES;
    let degree = (n.index % DEGREES + 1) % DEGREES;
    Placed {
        pitch: scale[degree] + 12 * octave as u8,
        degree,
        start: n.start,
        duration: n.duration,
    }
}

/// Mirror about `pivot`: `p' = 2 * pivot - p`.
fn invert(n: &MotifNote, scale: &[u8; 8], pivot: u8) -> Placed {
    let mirrored = (2 * pivot as i32 - scale[n.index] as i32).clamp(0, 127) as u8;
    Placed {
        pitch: mirrored,
        degree: degree_of(mirrored, scale),
        start: n.start,
        duration: n.duration,
    }
}

/// Scale degree whose pitch class matches, or the nearest one below.
fn degree_of(pitch: u8, scale: &[u8; 8]) -> usize {
    let pc = pitch % 12;
    (0..DEGREES)
        .filter(|&d| scale[d] % 12 <= pc)
        .max_by_key(|&d| scale[d] % 12)
        .unwrap_or(0)
}

/// Move `pitch` by octaves into `[lo, hi]`, clamping if the range is
/// narrower than an octave.
fn fold_into(pitch: i32, lo: u8, hi: u8) -> u8 {
    let (lo, hi) = (lo as i32, hi as i32);
    let mut p = pitch;
    while p < lo {
        p += 12;
    }
    while p > hi {
        p -= 12;
    }
    p.clamp(lo, hi).clamp(0, 127) as u8
}
