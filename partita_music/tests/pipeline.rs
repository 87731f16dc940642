// End-to-end checks across the generator, importers and both notation
// encoders. The ABC and MusicXML outputs are parsed back into per-measure
// event lists and compared: same measures, same rests, same lengths.

use partita_music::config::PartitaConfig;
use partita_music::export::Rendered;
use partita_music::generator::{ComposeRequest, Generator};
use partita_music::midi::{parse_midi, to_midi_bytes};
use partita_music::{Composition, Instrument, MusicError, Note, Track};
use partita_prng::Prng;

/// `(is_rest, length in MusicXML ticks at 16 divisions)` for one event.
type Event = (bool, u32);

/// Per voice, per measure, the events of an ABC tune.
fn abc_events(abc: &str, voices: usize) -> Vec<Vec<Vec<Event>>> {
    (1..=voices)
        .map(|v| {
            let prefix = format!("[V:{v}] ");
            let body: Vec<&str> = abc
                .lines()
                .filter_map(|l| l.strip_prefix(prefix.as_str()))
                .collect();
            body.iter()
                .flat_map(|line| line.trim_end_matches(" |").split(" | "))
                .map(|measure| measure.split(' ').map(abc_token).collect())
                .collect()
        })
        .collect()
}

fn abc_token(token: &str) -> Event {
    let token = token.trim_end_matches('-');
    let split = token
        .rfind(|c: char| !(c.is_ascii_digit() || c == '/'))
        .map_or(0, |i| i + 1);
    let (head, len) = token.split_at(split);
    let (num, den) = match len.split_once('/') {
        Some((n, d)) => (n.parse().unwrap_or(1), d.parse().unwrap_or(2)),
        None => (len.parse().unwrap_or(1), 1),
    };
    // One ABC unit is a sixteenth note: 4 ticks.
    (head == "z", 4 * num / den)
}

/// Per staff, per measure, the events of a MusicXML score. Chord members
/// after the first are skipped, like ABC's single chord token.
fn xml_events(xml: &str, staves: usize) -> Vec<Vec<Vec<Event>>> {
    let measures: Vec<&str> = xml.split("<measure number=").skip(1).collect();
    (1..=staves)
        .map(|staff| {
            let tag = format!("<staff>{staff}</staff>");
            measures
                .iter()
                .map(|m| {
                    m.split("<note>")
                        .skip(1)
                        .filter(|n| n.contains(&tag) && !n.contains("<chord/>"))
                        .map(|n| (n.contains("<rest/>"), xml_duration(n)))
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn xml_duration(note: &str) -> u32 {
    let start = note.find("<duration>").unwrap() + "<duration>".len();
    let end = note[start..].find("</duration>").unwrap() + start;
    note[start..end].parse().unwrap()
}

fn generated(seed: u64) -> Composition {
    let config = PartitaConfig::default();
    Generator::from_config(&config).compose(
        &ComposeRequest::new("bach", "Pipeline Test"),
        &mut Prng::new(seed),
    )
}

#[test]
fn test_encoders_agree_on_generated_piece() {
    let config = PartitaConfig::default();
    for seed in [1, 7, 42] {
        let comp = generated(seed);
        let out = Rendered::render(&comp, &config).unwrap();

        let abc = abc_events(&out.abc, 2);
        let xml = xml_events(&out.musicxml, 2);
        assert_eq!(abc[0].len(), out.musicxml.matches("<measure number=").count());
        assert_eq!(abc[0].len(), abc[1].len());
        assert_eq!(abc, xml, "seed {seed}");

        // Every measure is full.
        for voice in &abc {
            for measure in voice {
                assert_eq!(measure.iter().map(|e| e.1).sum::<u32>(), 64);
            }
        }
    }
}

#[test]
fn test_encoders_agree_across_barlines() {
    let comp = Composition {
        title: "Ties".into(),
        subtitle: None,
        composer: String::new(),
        style: String::new(),
        tempo: 100,
        tracks: vec![Track::new(
            Instrument::Piano,
            vec![
                Note::new(72, 3.5, 1.0),
                Note::new(76, 3.5, 1.5),
                Note::new(40, 2.0, 9.0),
                Note::new(65, 6.25, 0.125),
            ],
        )],
    };
    let out = Rendered::render(&comp, &PartitaConfig::default()).unwrap();
    assert_eq!(abc_events(&out.abc, 2), xml_events(&out.musicxml, 2));
    assert!(out.abc.contains("[ce]2-"));
    assert_eq!(out.musicxml.matches("<tie type=\"start\"/>").count(), 4);
}

#[test]
fn test_chord_tie_break_in_both_encoders() {
    let comp = Composition {
        title: "Tie Break".into(),
        subtitle: None,
        composer: String::new(),
        style: String::new(),
        tempo: 100,
        tracks: vec![Track::new(
            Instrument::Piano,
            vec![Note::new(60, 0.0, 1.0), Note::new(64, 0.0, 2.0)],
        )],
    };
    let out = Rendered::render(&comp, &PartitaConfig::default()).unwrap();

    let upper: Vec<&str> = out.abc.lines().filter(|l| l.starts_with("[V:1]")).collect();
    assert!(upper[0].starts_with("[V:1] [CE]8 z8 |"), "{}", upper[0]);

    let xml = xml_events(&out.musicxml, 1);
    assert_eq!(xml[0][0], vec![(false, 32), (true, 32)]);
    let first_measure = out.musicxml.split("</measure>").next().unwrap();
    assert_eq!(first_measure.matches("<chord/>").count(), 1);
}

#[test]
fn test_json_import_is_normalized() {
    let json = r#"{
        "composer": "Somebody",
        "style": "baroque",
        "tempo": 500,
        "tracks": [
            {
                "instrument": "Grand Piano",
                "notes": [
                    {"pitch": 60.4, "time": 0.03, "duration": 0.49, "velocity": 1.5},
                    {"pitch": 200, "time": 1, "duration": 1, "dynamic": "sforzando"},
                    {"pitch": 48, "time": 0, "duration": 2, "fingering": 3}
                ]
            }
        ]
    }"#;
    let comp = Composition::from_json(json, &PartitaConfig::default().grid).unwrap();
    assert_eq!(comp.title, "Untitled");
    assert_eq!(comp.tempo, 300);
    assert_eq!(comp.tracks[0].instrument, Instrument::Piano);

    let notes = &comp.tracks[0].notes;
    assert_eq!(
        notes
            .iter()
            .map(|n| (n.pitch, n.time, n.duration))
            .collect::<Vec<_>>(),
        vec![(48, 0.0, 2.0), (60, 0.0, 0.5), (127, 1.0, 1.0)]
    );
    assert_eq!(notes[1].velocity, 1.0);
    assert_eq!(notes[2].dynamic, None);
    assert_eq!(notes[0].fingering, Some(3));
}

#[test]
fn test_json_import_without_notes_is_empty_result() {
    let json = r#"{"title": "Nothing", "tracks": [{"instrument": "violin", "notes": []}]}"#;
    let err = Composition::from_json(json, &PartitaConfig::default().grid).unwrap_err();
    assert!(matches!(err, MusicError::EmptyResult(_)));
}

#[test]
fn test_malformed_json_is_an_error() {
    let err = Composition::from_json("{\"tracks\": [", &PartitaConfig::default().grid).unwrap_err();
    assert!(matches!(err, MusicError::Json(_)));
}

#[test]
fn test_exported_record_reimports() {
    let comp = generated(3);
    let config = PartitaConfig::default();
    let out = Rendered::render(&comp, &config).unwrap();
    let back = Composition::from_json(&out.json, &config.grid).unwrap();
    assert_eq!(back, comp);
    assert_eq!(back.notation_text(), out.abc);
}

#[test]
fn test_midi_reimport_keeps_notation() {
    let comp = Composition {
        title: "Through MIDI".into(),
        subtitle: None,
        composer: String::new(),
        style: "bach".into(),
        tempo: 112,
        tracks: vec![
            Track::new(
                Instrument::Piano,
                vec![
                    Note::new(72, 0.0, 1.0),
                    Note::new(74, 1.0, 0.5),
                    Note::new(76, 1.5, 2.5),
                    Note::new(77, 4.0, 1.0),
                ],
            ),
            Track::new(
                Instrument::Piano,
                vec![
                    Note::new(48, 0.0, 4.0),
                    Note::new(52, 0.0, 4.0),
                    Note::new(43, 4.0, 2.0),
                ],
            ),
        ],
    };
    let config = PartitaConfig::default();
    let back = parse_midi(&to_midi_bytes(&comp).unwrap(), &config.grid).unwrap();
    assert_eq!(back.title, "Through MIDI");
    assert_eq!(back.tempo, 112);
    assert_eq!(back.note_count(), comp.note_count());
    assert_eq!(back.notation_text(), comp.notation_text());
}

#[test]
fn test_edits_show_up_in_notation() {
    let comp = generated(5);
    let mut tracks = comp.tracks.clone();
    tracks[0].notes.clear();
    let edited = comp.with_tracks(tracks);
    assert_ne!(edited.notation_text(), comp.notation_text());
    assert_eq!(comp.notation_text(), generated(5).notation_text());
}
