// ABC notation output.
//
// Renders a composition as an ABC 2.1 tune: a header block (title, composer,
// meter, unit length, tempo, one `V:` declaration per staff, key), then the
// body as lines of `measures_per_line` measures, one `[V:n]` line per staff,
// with `%%newpage` between pages.
//
// The measure contents come from the shared `MeasureLayout` (layout.rs); this
// module only spells what the layout decided. With `L:1/16`, a length of four
// grid steps (one sixteenth note) has no suffix, and every other length is
// written as the reduced fraction of steps over four.
//
// The encoder reads note data only. Generator decoration (fingering, dynamics,
// slurs) is not written, so edited notes always render as they are.

use crate::config::{GridConfig, NotationConfig};
use crate::layout::{LayoutBreak, LayoutEvent, MeasureLayout};
use crate::model::{ScoreHeader, Track};
use crate::pitch::{format_length, midi_to_symbol};
use crate::quantize::prepare_voices;
use std::fmt::Write;

/// Render a full ABC tune.
pub fn render_abc(
    header: &ScoreHeader<'_>,
    tracks: &[Track],
    grid: &GridConfig,
    notation: &NotationConfig,
) -> String {
    let voices = prepare_voices(tracks, grid);
    let layout = MeasureLayout::build(&voices, grid, notation);
    render_layout(header, &layout)
}

/// Render an already-built layout. Used by callers that also emit MusicXML
/// from the same layout.
pub fn render_layout(header: &ScoreHeader<'_>, layout: &MeasureLayout) -> String {
    let mut abc = String::new();

    abc.push_str("X:1\n");
    let _ = writeln!(abc, "T:{}", one_line(header.title));
    if let Some(subtitle) = header.subtitle {
        let _ = writeln!(abc, "T:{}", one_line(subtitle));
    }
    let _ = writeln!(abc, "C:{}", one_line(header.composer));
    let _ = writeln!(abc, "M:{}/4", layout.beats_per_measure);
    abc.push_str("L:1/16\n");
    let _ = writeln!(abc, "Q:1/4={}", header.tempo);
    for (i, staff) in layout.staves.iter().enumerate() {
        let _ = writeln!(
            abc,
            "V:{} clef={} name=\"{}\"",
            i + 1,
            staff.clef.abc_name(),
            staff.name.replace('"', "'")
        );
    }
    abc.push_str("K:C\n");

    // Grid steps per 1/64 note: the unit `format_length` counts in.
    let scale = 16 / layout.units_per_beat.max(1);

    for (line_index, line) in layout.lines().enumerate() {
        let first = line_index * layout.measures_per_line;
        if layout.break_before(first) == Some(LayoutBreak::Page) {
            abc.push_str("%%newpage\n");
        }
        for v in 0..layout.staves.len() {
            let bars: Vec<String> = line
                .iter()
                .map(|m| render_measure(&m.voices[v], scale))
                .collect();
            let _ = writeln!(abc, "[V:{}] {} |", v + 1, bars.join(" | "));
        }
    }

    abc
}

fn render_measure(events: &[LayoutEvent], scale: u32) -> String {
    events
        .iter()
        .map(|e| render_event(e, scale))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_event(event: &LayoutEvent, scale: u32) -> String {
    match event {
        LayoutEvent::Rest { length, .. } => format!("z{}", format_length(length * scale)),
        LayoutEvent::Chord {
            pitches,
            length,
            tie_to_next,
            ..
        } => {
            let mut token = String::new();
            if pitches.len() == 1 {
                token.push_str(&midi_to_symbol(pitches[0]));
            } else {
                token.push('[');
                for &p in pitches {
                    token.push_str(&midi_to_symbol(p));
                }
                token.push(']');
            }
            token.push_str(&format_length(length * scale));
            if *tie_to_next {
                token.push('-');
            }
            token
        }
    }
}

/// Header fields are single ABC lines; fold any newlines away.
fn one_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
