// MusicXML 4.0 partwise output.
//
// One part, one staff per prepared voice (the grand staff for solo and duo
// pieces), built from the same `MeasureLayout` the ABC encoder renders.
// Durations are ticks at `divisions_per_quarter`, so with the defaults one
// grid step is one tick.
//
// Per measure: an optional `<print>` for the layout's line or page break,
// the attributes and tempo on measure 1, then each staff's events in turn
// with a `<backup>` of one full measure between staves. Chord members after
// the first carry `<chord/>`; barline-cut simultaneities carry tie/tied
// start and stop marks.

use crate::config::{GridConfig, NotationConfig};
use crate::layout::{LayoutBreak, LayoutEvent, MeasureLayout};
use crate::model::{ScoreHeader, Track};
use crate::pitch::pitch_parts;
use crate::quantize::{Voice, prepare_voices};
use std::fmt::Write;

/// Render a complete MusicXML document.
pub fn render_musicxml(
    header: &ScoreHeader<'_>,
    tracks: &[Track],
    grid: &GridConfig,
    notation: &NotationConfig,
) -> String {
    let voices = prepare_voices(tracks, grid);
    let layout = MeasureLayout::build(&voices, grid, notation);
    render_layout(
        header,
        &layout,
        notation.divisions_per_quarter,
        part_name(&voices),
    )
}

/// Part name: the instrument for a grand staff, "Ensemble" otherwise.
pub fn part_name(voices: &[Voice]) -> &'static str {
    if voices.len() <= 2 {
        voices
            .first()
            .map(|v| v.instrument.display_name())
            .unwrap_or("Piano")
    } else {
        "Ensemble"
    }
}

/// Render an already-built layout.
pub fn render_layout(
    header: &ScoreHeader<'_>,
    layout: &MeasureLayout,
    divisions: u32,
    part_name: &str,
) -> String {
    let ticks_per_unit = (divisions / layout.units_per_beat.max(1)).max(1);
    let mut xml = String::new();

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#);
    xml.push('\n');
    xml.push_str("<score-partwise version=\"4.0\">\n");

    xml.push_str("  <work>\n");
    let _ = writeln!(xml, "    <work-title>{}</work-title>", escape_xml(header.title));
    xml.push_str("  </work>\n");
    if let Some(subtitle) = header.subtitle {
        let _ = writeln!(xml, "  <movement-title>{}</movement-title>", escape_xml(subtitle));
    }
    xml.push_str("  <identification>\n");
    let _ = writeln!(
        xml,
        "    <creator type=\"composer\">{}</creator>",
        escape_xml(header.composer)
    );
    xml.push_str("  </identification>\n");

    xml.push_str("  <part-list>\n");
    xml.push_str("    <score-part id=\"P1\">\n");
    let _ = writeln!(xml, "      <part-name>{}</part-name>", escape_xml(part_name));
    xml.push_str("    </score-part>\n");
    xml.push_str("  </part-list>\n");

    xml.push_str("  <part id=\"P1\">\n");
    let measure_ticks = layout.measure_units * ticks_per_unit;
    for measure in &layout.measures {
        let _ = writeln!(xml, "    <measure number=\"{}\">", measure.index + 1);
        match layout.break_before(measure.index) {
            Some(LayoutBreak::Page) => xml.push_str("      <print new-page=\"yes\"/>\n"),
            Some(LayoutBreak::System) => xml.push_str("      <print new-system=\"yes\"/>\n"),
            None => {}
        }
        if measure.index == 0 {
            write_attributes(&mut xml, layout, divisions);
            write_tempo(&mut xml, header.tempo);
        }
        for (v, events) in measure.voices.iter().enumerate() {
            if v > 0 {
                xml.push_str("      <backup>\n");
                let _ = writeln!(xml, "        <duration>{measure_ticks}</duration>");
                xml.push_str("      </backup>\n");
            }
            for event in events {
                write_event(&mut xml, event, v + 1, ticks_per_unit);
            }
        }
        xml.push_str("    </measure>\n");
    }
    xml.push_str("  </part>\n");
    xml.push_str("</score-partwise>\n");

    xml
}

fn write_attributes(xml: &mut String, layout: &MeasureLayout, divisions: u32) {
    xml.push_str("      <attributes>\n");
    let _ = writeln!(xml, "        <divisions>{divisions}</divisions>");
    xml.push_str("        <key>\n          <fifths>0</fifths>\n        </key>\n");
    xml.push_str("        <time>\n");
    let _ = writeln!(xml, "          <beats>{}</beats>", layout.beats_per_measure);
    xml.push_str("          <beat-type>4</beat-type>\n");
    xml.push_str("        </time>\n");
    let _ = writeln!(xml, "        <staves>{}</staves>", layout.staves.len());
    for (i, staff) in layout.staves.iter().enumerate() {
        let (sign, line) = staff.clef.sign_line();
        let _ = writeln!(xml, "        <clef number=\"{}\">", i + 1);
        let _ = writeln!(xml, "          <sign>{sign}</sign>");
        let _ = writeln!(xml, "          <line>{line}</line>");
        xml.push_str("        </clef>\n");
    }
    xml.push_str("      </attributes>\n");
}

fn write_tempo(xml: &mut String, tempo: u32) {
    xml.push_str("      <direction placement=\"above\">\n");
    xml.push_str("        <direction-type>\n");
    xml.push_str("          <metronome>\n");
    xml.push_str("            <beat-unit>quarter</beat-unit>\n");
    let _ = writeln!(xml, "            <per-minute>{tempo}</per-minute>");
    xml.push_str("          </metronome>\n");
    xml.push_str("        </direction-type>\n");
    let _ = writeln!(xml, "        <sound tempo=\"{tempo}\"/>");
    xml.push_str("      </direction>\n");
}

fn write_event(xml: &mut String, event: &LayoutEvent, staff: usize, ticks_per_unit: u32) {
    match event {
        LayoutEvent::Rest { length, .. } => {
            xml.push_str("      <note>\n");
            xml.push_str("        <rest/>\n");
            let _ = writeln!(xml, "        <duration>{}</duration>", length * ticks_per_unit);
            let _ = writeln!(xml, "        <voice>{staff}</voice>");
            let _ = writeln!(xml, "        <staff>{staff}</staff>");
            xml.push_str("      </note>\n");
        }
        LayoutEvent::Chord {
            pitches,
            length,
            tied_from_previous,
            tie_to_next,
            ..
        } => {
            for (i, &pitch) in pitches.iter().enumerate() {
                let (step, alter, octave) = pitch_parts(pitch);
                xml.push_str("      <note>\n");
                if i > 0 {
                    xml.push_str("        <chord/>\n");
                }
                xml.push_str("        <pitch>\n");
                let _ = writeln!(xml, "          <step>{step}</step>");
                if alter != 0 {
                    let _ = writeln!(xml, "          <alter>{alter}</alter>");
                }
                let _ = writeln!(xml, "          <octave>{octave}</octave>");
                xml.push_str("        </pitch>\n");
                let _ = writeln!(xml, "        <duration>{}</duration>", length * ticks_per_unit);
                if *tied_from_previous {
                    xml.push_str("        <tie type=\"stop\"/>\n");
                }
                if *tie_to_next {
                    xml.push_str("        <tie type=\"start\"/>\n");
                }
                let _ = writeln!(xml, "        <voice>{staff}</voice>");
                if alter != 0 {
                    xml.push_str("        <accidental>sharp</accidental>\n");
                }
                let _ = writeln!(xml, "        <staff>{staff}</staff>");
                if *tied_from_previous || *tie_to_next {
                    xml.push_str("        <notations>\n");
                    if *tied_from_previous {
                        xml.push_str("          <tied type=\"stop\"/>\n");
                    }
                    if *tie_to_next {
                        xml.push_str("          <tied type=\"start\"/>\n");
                    }
                    xml.push_str("        </notations>\n");
                }
                xml.push_str("      </note>\n");
            }
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
