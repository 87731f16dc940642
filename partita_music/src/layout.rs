// Measure layout shared by the ABC and MusicXML encoders.
//
// Both encoders render the same `MeasureLayout`, which is how they agree on
// measure count, rest placement, and line/page breaks: there is only one
// measure-filling pass, and each encoder is a projection of its result.
//
// Everything here counts in whole grid steps (1/16 beat by default), so the
// layout is exact integer arithmetic once the quantizer has run.
//
// Filling a measure, per voice:
// - Notes starting exactly at the cursor form one simultaneity. Its length
//   is the longest of those notes, and the cursor jumps past it.
// - Notes starting inside an emitted simultaneity are absorbed by it.
// - Otherwise a rest fills the gap to the next onset or the barline.
// - A simultaneity that runs past the barline is cut there and continues,
//   tied, as the first event of the next measure. Rests never cross.
//
// The measure count is `max(minimum_page_measures, ceil(end / measure))`.

use crate::config::{GridConfig, NotationConfig};
use crate::model::Note;
use crate::quantize::{Clef, Voice};

/// One event in one voice of one measure. Offsets and lengths are in grid
/// steps, offsets relative to the measure start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEvent {
    Chord {
        /// Ascending, deduplicated.
        pitches: Vec<u8>,
        offset: u32,
        length: u32,
        /// Continues a simultaneity cut at the previous barline.
        tied_from_previous: bool,
        /// Cut at this measure's barline; continues in the next.
        tie_to_next: bool,
    },
    Rest {
        offset: u32,
        length: u32,
    },
}

impl LayoutEvent {
    pub fn length(&self) -> u32 {
        match self {
            LayoutEvent::Chord { length, .. } | LayoutEvent::Rest { length, .. } => *length,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, LayoutEvent::Rest { .. })
    }
}

/// Break placed before a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutBreak {
    /// New line of measures.
    System,
    /// New page (implies a new line).
    Page,
}

/// Per-voice staff metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StaffInfo {
    pub name: String,
    pub clef: Clef,
}

/// One measure across every voice.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub index: usize,
    /// `voices[v]` is the event list of voice `v`; its lengths sum to the
    /// measure length.
    pub voices: Vec<Vec<LayoutEvent>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureLayout {
    pub staves: Vec<StaffInfo>,
    pub measures: Vec<Measure>,
    /// Grid steps per beat.
    pub units_per_beat: u32,
    /// Grid steps per measure.
    pub measure_units: u32,
    pub beats_per_measure: u32,
    pub measures_per_line: usize,
    pub lines_per_page: usize,
}

impl MeasureLayout {
    /// Lay out prepared (quantized, split) voices.
    pub fn build(voices: &[Voice], grid: &GridConfig, notation: &NotationConfig) -> Self {
        let units_per_beat = grid.units_per_beat().max(1);
        let measure_units = (notation.beats_per_measure * units_per_beat).max(1);

        let steps: Vec<Vec<Step>> = voices
            .iter()
            .map(|v| to_steps(&v.notes, grid.unit_beats))
            .collect();
        let end = steps
            .iter()
            .flat_map(|s| s.iter().map(|n| n.start + n.length as u64))
            .max()
            .unwrap_or(0);
        let needed = end.div_ceil(measure_units as u64) as usize;
        let count = needed.max(notation.minimum_page_measures);

        let per_voice: Vec<Vec<Vec<LayoutEvent>>> = steps
            .iter()
            .map(|s| fill_voice(s, count, measure_units))
            .collect();

        let measures = (0..count)
            .map(|index| Measure {
                index,
                voices: per_voice.iter().map(|v| v[index].clone()).collect(),
            })
            .collect();

        MeasureLayout {
            staves: voices
                .iter()
                .map(|v| StaffInfo {
                    name: v.name.clone(),
                    clef: v.clef,
                })
                .collect(),
            measures,
            units_per_beat,
            measure_units,
            beats_per_measure: notation.beats_per_measure,
            measures_per_line: notation.measures_per_line.max(1),
            lines_per_page: notation.lines_per_page.max(1),
        }
    }

    /// Break that precedes measure `index`, if any. Measure 0 has none.
    pub fn break_before(&self, index: usize) -> Option<LayoutBreak> {
        if index == 0 || index % self.measures_per_line != 0 {
            return None;
        }
        let line = index / self.measures_per_line;
        if line % self.lines_per_page == 0 {
            Some(LayoutBreak::Page)
        } else {
            Some(LayoutBreak::System)
        }
    }

    /// Measures grouped into lines of `measures_per_line`.
    pub fn lines(&self) -> impl Iterator<Item = &[Measure]> {
        self.measures.chunks(self.measures_per_line)
    }
}

/// A quantized note in grid steps.
#[derive(Debug, Clone, Copy)]
struct Step {
    start: u64,
    length: u64,
    pitch: u8,
}

fn to_steps(notes: &[Note], unit: f64) -> Vec<Step> {
    let mut steps: Vec<Step> = notes
        .iter()
        .map(|n| Step {
            start: (n.time / unit).round().max(0.0) as u64,
            length: ((n.duration / unit).round() as u64).max(1),
            pitch: n.pitch,
        })
        .collect();
    steps.sort_by_key(|s| (s.start, s.pitch));
    steps
}

/// Greedy longest-note-wins fill of one voice across `count` measures.
fn fill_voice(steps: &[Step], count: usize, measure_units: u32) -> Vec<Vec<LayoutEvent>> {
    let ml = measure_units as u64;
    let mut measures = Vec::with_capacity(count);
    let mut next = 0usize;
    // (pitches, remaining length) of a simultaneity cut at the last barline.
    let mut carry: Option<(Vec<u8>, u64)> = None;

    for m in 0..count as u64 {
        let start = m * ml;
        let end = start + ml;
        let mut cursor = start;
        let mut events = Vec::new();

        if let Some((pitches, remaining)) = carry.take() {
            let length = remaining.min(ml);
            events.push(LayoutEvent::Chord {
                pitches: pitches.clone(),
                offset: 0,
                length: length as u32,
                tied_from_previous: true,
                tie_to_next: remaining > ml,
            });
            if remaining > ml {
                carry = Some((pitches, remaining - ml));
            }
            cursor += length;
        }

        while cursor < end {
            while next < steps.len() && steps[next].start < cursor {
                next += 1;
            }
            if next < steps.len() && steps[next].start == cursor {
                let mut pitches = Vec::new();
                let mut longest = 0;
                while next < steps.len() && steps[next].start == cursor {
                    pitches.push(steps[next].pitch);
                    longest = longest.max(steps[next].length);
                    next += 1;
                }
                pitches.sort_unstable();
                pitches.dedup();

                let stop = cursor + longest;
                let cut = stop > end;
                let length = if cut { end - cursor } else { longest };
                if cut {
                    carry = Some((pitches.clone(), stop - end));
                }
                events.push(LayoutEvent::Chord {
                    pitches,
                    offset: (cursor - start) as u32,
                    length: length as u32,
                    tied_from_previous: false,
                    tie_to_next: cut,
                });
                cursor += length;
            } else {
                let onset = steps.get(next).map_or(end, |s| s.start.min(end));
                events.push(LayoutEvent::Rest {
                    offset: (cursor - start) as u32,
                    length: (onset - cursor) as u32,
                });
                cursor = onset;
            }
        }
        measures.push(events);
    }
    measures
}
