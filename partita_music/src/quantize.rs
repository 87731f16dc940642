// Quantizer and grand-staff splitter.
//
// Every encoder starts here. Raw notes (from the generator's rubato timing,
// the transcriber's frame boundaries, or an imported file) are snapped to the
// 1/16-beat grid, then the merged note set is split at middle C into an upper
// (treble) and lower (bass) voice.
//
// Quantization rules, per note:
// - `time` rounds to the nearest grid step and never goes below 0.
// - `duration` rounds to the nearest grid step and never drops below one step.
// - `velocity` clamps into [min_velocity, max_velocity]; `pitch` into 0..=127.
//
// Both `quantize_notes` and `split_grand_staff` are idempotent: feeding their
// output back in returns it unchanged. The grid steps are powers of two, so
// the rounded values are exact in f64 and a second rounding is a no-op.
//
// Ensembles with more than two distinct instruments are passed through
// unsplit: each track keeps its own staff and only gets quantized.

use crate::config::GridConfig;
use crate::model::{Instrument, Note, Track};
use std::collections::BTreeSet;

/// Staff clef for a rendered voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clef {
    Treble,
    Bass,
}

impl Clef {
    pub fn abc_name(self) -> &'static str {
        match self {
            Clef::Treble => "treble",
            Clef::Bass => "bass",
        }
    }

    /// MusicXML (sign, line).
    pub fn sign_line(self) -> (char, u8) {
        match self {
            Clef::Treble => ('G', 2),
            Clef::Bass => ('F', 4),
        }
    }
}

/// One quantized, sorted staff ready for layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub name: String,
    pub clef: Clef,
    pub instrument: Instrument,
    pub notes: Vec<Note>,
}

/// Snap a value to the nearest grid multiple. Non-finite input snaps to 0.
fn snap(value: f64, unit: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value / unit).round() * unit
}

/// Quantize one note onto the grid and clamp its pitch and velocity.
pub fn quantize_note(note: &Note, grid: &GridConfig) -> Note {
    let unit = grid.unit_beats;
    let velocity = if note.velocity.is_nan() {
        grid.min_velocity
    } else {
        note.velocity.clamp(grid.min_velocity, grid.max_velocity)
    };
    Note {
        pitch: note.pitch.min(127),
        time: snap(note.time, unit).max(0.0),
        duration: snap(note.duration, unit).max(unit),
        velocity,
        ..note.clone()
    }
}

/// Quantize a set of notes and sort them by `(time, pitch)`.
pub fn quantize_notes(notes: &[Note], grid: &GridConfig) -> Vec<Note> {
    let mut out: Vec<Note> = notes.iter().map(|n| quantize_note(n, grid)).collect();
    sort_notes(&mut out);
    out
}

/// Stable sort by `(time, pitch)`.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.pitch.cmp(&b.pitch)));
}

/// Number of distinct instrument labels across a track list.
pub fn distinct_instruments(tracks: &[Track]) -> usize {
    tracks
        .iter()
        .map(|t| t.instrument)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Merge every track's notes and partition them into an upper and a lower
/// track at `grid.split_pitch`.
///
/// Returns `[upper, lower]`, both quantized and sorted, sharing the first
/// track's instrument and the loudest track's volume. When the tracks use
/// more than two distinct instruments the input is returned unchanged.
pub fn split_grand_staff(tracks: &[Track], grid: &GridConfig) -> Vec<Track> {
    if distinct_instruments(tracks) > 2 {
        return tracks.to_vec();
    }

    let instrument = tracks
        .first()
        .map(|t| t.instrument)
        .unwrap_or(Instrument::Piano);
    let volume = tracks
        .iter()
        .map(|t| t.volume)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(0.8);

    let merged: Vec<Note> = tracks.iter().flat_map(|t| t.notes.iter().cloned()).collect();
    let (upper, lower): (Vec<Note>, Vec<Note>) = quantize_notes(&merged, grid)
        .into_iter()
        .partition(|n| n.pitch >= grid.split_pitch);

    vec![
        Track {
            instrument,
            volume,
            notes: upper,
        },
        Track {
            instrument,
            volume,
            notes: lower,
        },
    ]
}

/// Clef for an arbitrary note set: treble when the mean pitch sits at or
/// above the split point.
fn clef_for(notes: &[Note], grid: &GridConfig) -> Clef {
    if notes.is_empty() {
        return Clef::Treble;
    }
    let mean = notes.iter().map(|n| n.pitch as f64).sum::<f64>() / notes.len() as f64;
    if mean >= grid.split_pitch as f64 {
        Clef::Treble
    } else {
        Clef::Bass
    }
}

/// Build the staves an encoder renders: the split grand staff for solo and
/// duo pieces, or one quantized staff per track for larger ensembles.
pub fn prepare_voices(tracks: &[Track], grid: &GridConfig) -> Vec<Voice> {
    if distinct_instruments(tracks) <= 2 {
        let mut split = split_grand_staff(tracks, grid).into_iter();
        let upper = split.next().map(|t| t.notes).unwrap_or_default();
        let lower = split.next().map(|t| t.notes).unwrap_or_default();
        let instrument = tracks
            .first()
            .map(|t| t.instrument)
            .unwrap_or(Instrument::Piano);
        return vec![
            Voice {
                name: "Upper".to_string(),
                clef: Clef::Treble,
                instrument,
                notes: upper,
            },
            Voice {
                name: "Lower".to_string(),
                clef: Clef::Bass,
                instrument,
                notes: lower,
            },
        ];
    }

    tracks
        .iter()
        .map(|t| {
            let notes = quantize_notes(&t.notes, grid);
            Voice {
                name: t.instrument.display_name().to_string(),
                clef: clef_for(&notes, grid),
                instrument: t.instrument,
                notes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridConfig {
        GridConfig::default()
    }

    #[test]
    fn test_quantize_rounds_to_grid() {
        let n = Note::new(64, 1.03, 0.49).with_velocity(0.5);
        let q = quantize_note(&n, &grid());
        assert_eq!(q.time, 1.0);
        assert_eq!(q.duration, 0.5);
        assert_eq!(q.velocity, 0.5);
    }

    #[test]
    fn test_quantize_floors() {
        let n = Note::new(64, -0.4, 0.001).with_velocity(0.0);
        let q = quantize_note(&n, &grid());
        assert_eq!(q.time, 0.0);
        assert_eq!(q.duration, 0.0625);
        assert_eq!(q.velocity, 0.05);
    }

    #[test]
    fn test_quantize_non_finite() {
        let mut n = Note::new(64, f64::NAN, f64::INFINITY);
        n.velocity = f64::NAN;
        let q = quantize_note(&n, &grid());
        assert_eq!(q.time, 0.0);
        assert_eq!(q.duration, 0.0625);
        assert_eq!(q.velocity, 0.05);
    }

    #[test]
    fn test_quantize_keeps_decoration() {
        let mut n = Note::new(67, 0.0, 1.0);
        n.fingering = Some(3);
        n.slur_start = true;
        let q = quantize_note(&n, &grid());
        assert_eq!(q.fingering, Some(3));
        assert!(q.slur_start);
    }

    #[test]
    fn test_quantize_sorts_by_time_then_pitch() {
        let notes = vec![
            Note::new(67, 1.0, 1.0),
            Note::new(64, 0.0, 1.0),
            Note::new(60, 0.0, 1.0),
        ];
        let q = quantize_notes(&notes, &grid());
        let order: Vec<u8> = q.iter().map(|n| n.pitch).collect();
        assert_eq!(order, vec![60, 64, 67]);
    }

    #[test]
    fn test_split_at_middle_c() {
        let tracks = vec![Track::new(
            Instrument::Piano,
            vec![
                Note::new(59, 0.0, 1.0),
                Note::new(60, 0.0, 1.0),
                Note::new(72, 1.0, 1.0),
                Note::new(40, 2.0, 1.0),
            ],
        )];
        let split = split_grand_staff(&tracks, &grid());
        assert_eq!(split.len(), 2);
        let upper: Vec<u8> = split[0].notes.iter().map(|n| n.pitch).collect();
        let lower: Vec<u8> = split[1].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(upper, vec![60, 72]);
        assert_eq!(lower, vec![59, 40]);
    }

    #[test]
    fn test_split_is_idempotent() {
        let tracks = vec![
            Track::new(Instrument::Violin, vec![Note::new(76, 0.1, 0.9)]),
            Track {
                instrument: Instrument::Cello,
                volume: 0.95,
                notes: vec![Note::new(43, 0.0, 2.02), Note::new(62, 3.0, 1.0)],
            },
        ];
        let once = split_grand_staff(&tracks, &grid());
        let twice = split_grand_staff(&once, &grid());
        assert_eq!(once, twice);
        assert_eq!(once[0].instrument, Instrument::Violin);
        assert_eq!(once[0].volume, 0.95);
    }

    #[test]
    fn test_ensemble_passes_through() {
        let tracks = vec![
            Track::new(Instrument::Flute, vec![Note::new(79, 0.0, 1.0)]),
            Track::new(Instrument::Oboe, vec![Note::new(70, 0.0, 1.0)]),
            Track::new(Instrument::Cello, vec![Note::new(48, 0.0, 1.0)]),
        ];
        assert_eq!(split_grand_staff(&tracks, &grid()), tracks);

        let voices = prepare_voices(&tracks, &grid());
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "Flute");
        assert_eq!(voices[2].clef, Clef::Bass);
    }

    #[test]
    fn test_prepare_voices_grand_staff() {
        let tracks = vec![Track::new(
            Instrument::Piano,
            vec![Note::new(64, 0.0, 1.0), Note::new(48, 0.0, 1.0)],
        )];
        let voices = prepare_voices(&tracks, &grid());
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].clef, Clef::Treble);
        assert_eq!(voices[1].clef, Clef::Bass);
        assert_eq!(voices[0].notes[0].pitch, 64);
        assert_eq!(voices[1].notes[0].pitch, 48);
    }

    #[test]
    fn test_empty_input_yields_two_empty_voices() {
        let voices = prepare_voices(&[], &grid());
        assert_eq!(voices.len(), 2);
        assert!(voices.iter().all(|v| v.notes.is_empty()));
    }
}
