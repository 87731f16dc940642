// MIDI import and export.
//
// Export writes a Standard MIDI File, format 1: track 0 carries the title
// and tempo, then one track per composition track with its instrument's
// General MIDI program. Beats map to ticks at 480 per quarter note.
//
// Import reads any metrical SMF (format 0 or 1) back into a composition:
// note-on/note-off pairs become notes, program changes pick the instrument,
// the first tempo event sets the tempo. The result goes through the
// quantizer like every other source. A file that parses but holds no notes
// is an empty result, not a decode failure.
//
// Uses the `midly` crate for reading and writing.

use crate::config::GridConfig;
use crate::error::{MusicError, Result};
use crate::model::{Composition, Instrument, Note, Track};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::BTreeMap;
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Percussion channel, skipped when assigning track channels.
const DRUM_CHANNEL: u8 = 9;

/// Largest delta time an SMF event can carry (28-bit variable length).
const MAX_DELTA: u64 = 0x0fff_ffff;

/// Convert a composition to an in-memory SMF. Fails if two consecutive
/// events in a track lie further apart than a delta time can express.
pub fn composition_to_smf(comp: &Composition) -> Result<Smf<'_>> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let tempo = comp.tempo.max(1);
    let tempo_microseconds = (60_000_000 / tempo).min(0x00ff_ffff);
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(comp.title.as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    for (i, track) in comp.tracks.iter().enumerate() {
        smf.tracks.push(track_events(track, channel_for(i))?);
    }
    Ok(smf)
}

fn channel_for(track_index: usize) -> u8 {
    let ch = (track_index % 15) as u8;
    if ch >= DRUM_CHANNEL { ch + 1 } else { ch }
}

fn beats_to_ticks(beats: f64) -> u64 {
    (beats.max(0.0) * TICKS_PER_QUARTER as f64).round() as u64
}

fn track_events(track: &Track, channel: u8) -> Result<Vec<TrackEvent<'static>>> {
    let channel = u4::new(channel);
    let mut events = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(
                track.instrument.display_name().as_bytes(),
            )),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(track.instrument.gm_program()),
                },
            },
        },
    ];

    // (tick, is_on, key, velocity). Offs sort before ons at the same tick so
    // repeated pitches re-attack cleanly.
    let mut timeline: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(track.notes.len() * 2);
    for note in &track.notes {
        let start = beats_to_ticks(note.time);
        let end = beats_to_ticks(note.end()).max(start.saturating_add(1));
        let vel = (note.velocity * 127.0).round().clamp(1.0, 127.0) as u8;
        let key = note.pitch.min(127);
        timeline.push((start, true, key, vel));
        timeline.push((end, false, key, 0));
    }
    timeline.sort_by_key(|&(tick, is_on, key, _)| (tick, is_on, key));

    let mut last_tick = 0;
    for (tick, is_on, key, vel) in timeline {
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };
        let delta = tick - last_tick;
        if delta > MAX_DELTA {
            return Err(MusicError::Midi(format!(
                "{} track: gap of {delta} ticks before tick {tick} exceeds the MIDI delta limit",
                track.instrument.display_name()
            )));
        }
        events.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(events)
}

/// Encode a composition as SMF bytes.
pub fn to_midi_bytes(comp: &Composition) -> Result<Vec<u8>> {
    let smf = composition_to_smf(comp)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| MusicError::Midi(e.to_string()))?;
    Ok(buf)
}

/// Write a composition to a MIDI file.
pub fn write_midi(comp: &Composition, path: &Path) -> Result<()> {
    let buf = to_midi_bytes(comp)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Parse SMF bytes into a normalized composition.
pub fn parse_midi(data: &[u8], grid: &GridConfig) -> Result<Composition> {
    let smf = Smf::parse(data).map_err(|e| MusicError::Decode(format!("malformed MIDI: {e}")))?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int().max(1) as f64,
        Timing::Timecode(..) => {
            return Err(MusicError::Decode(
                "timecode-based MIDI timing is not supported".to_string(),
            ));
        }
    };

    let mut tempo = None;
    let mut title = None;
    let mut tracks = Vec::new();

    for (index, raw) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut program = None;
        // (channel, key) -> (start tick, velocity)
        let mut sounding: BTreeMap<(u8, u8), (u64, u8)> = BTreeMap::new();
        let mut notes = Vec::new();
        let close = |start: u64, end: u64, key: u8, vel: u8, notes: &mut Vec<Note>| {
            let time = start as f64 / ticks_per_quarter;
            let duration = (end.saturating_sub(start)) as f64 / ticks_per_quarter;
            notes.push(Note::new(key, time, duration).with_velocity(vel as f64 / 127.0));
        };

        for event in raw {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) if tempo.is_none() => {
                    tempo = Some(us.as_int());
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) if index == 0 => {
                    if let Ok(s) = std::str::from_utf8(name) {
                        let cleaned = s.trim_end_matches('\0').trim();
                        if !cleaned.is_empty() {
                            title = Some(cleaned.to_string());
                        }
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program: p } => {
                            program.get_or_insert(p.as_int());
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            let key = key.as_int();
                            if let Some((start, v)) = sounding.remove(&(ch, key)) {
                                close(start, tick, key, v, &mut notes);
                            }
                            sounding.insert((ch, key), (tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some((start, v)) = sounding.remove(&(ch, key)) {
                                close(start, tick, key, v, &mut notes);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        // Notes left hanging at end of track stop at the last event.
        for ((_, key), (start, v)) in sounding {
            close(start, tick, key, v, &mut notes);
        }

        if !notes.is_empty() {
            let instrument = program
                .map(Instrument::from_gm_program)
                .unwrap_or(Instrument::Piano);
            tracks.push(Track::new(instrument, notes));
        }
    }

    let comp = Composition {
        title: title.unwrap_or_else(|| "Imported MIDI".to_string()),
        subtitle: None,
        composer: String::new(),
        style: "imported".to_string(),
        tempo: tempo
            .map(|us| (60_000_000.0 / us.max(1) as f64).round().clamp(20.0, 300.0) as u32)
            .unwrap_or(120),
        tracks,
    };
    if comp.note_count() == 0 {
        return Err(MusicError::EmptyResult("MIDI file has no notes".to_string()));
    }
    let comp = comp.normalized(grid);
    comp.check_extent(grid)?;
    Ok(comp)
}

/// Read and parse a MIDI file.
pub fn load_midi(path: &Path, grid: &GridConfig) -> Result<Composition> {
    let data = std::fs::read(path)?;
    parse_midi(&data, grid)
}
