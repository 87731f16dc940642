// The shared note model.
//
// `Note` → `Track` → `Composition` is the one representation every stage
// reads and writes: the generator and transcriber produce it, the quantizer
// normalizes it, and the ABC, MusicXML, and MIDI writers consume it. Times
// and durations are in beats (quarter notes) from the start of the piece.
//
// A composition's notation text is derived, never stored. It is computed on
// read from the current fields (`Composition::notation_text`), so an edited
// composition can never carry stale notation. `CompositionRecord` is the
// serializable snapshot that pairs the two for export.
//
// Deserialization is lenient because compositions also arrive as JSON from
// outside the crate (e.g. a hosted model's reply): numeric pitches are
// rounded and clamped into 0..=127, unknown instruments fall back to piano,
// and unknown dynamic markings are dropped. The quantizer (`quantize.rs`)
// then applies the grid and velocity invariants.

use crate::abc::render_abc;
use crate::config::{GridConfig, NotationConfig};
use crate::error::{MusicError, Result};
use crate::quantize::quantize_notes;
use serde::{Deserialize, Deserializer, Serialize};

/// Dynamic marking attached to a note (generator decoration only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dynamic {
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
}

impl Dynamic {
    pub fn as_str(self) -> &'static str {
        match self {
            Dynamic::Pp => "pp",
            Dynamic::P => "p",
            Dynamic::Mp => "mp",
            Dynamic::Mf => "mf",
            Dynamic::F => "f",
            Dynamic::Ff => "ff",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pp" => Some(Dynamic::Pp),
            "p" => Some(Dynamic::P),
            "mp" => Some(Dynamic::Mp),
            "mf" => Some(Dynamic::Mf),
            "f" => Some(Dynamic::F),
            "ff" => Some(Dynamic::Ff),
            _ => None,
        }
    }
}

/// A single sounding note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// MIDI note number, 0–127. 60 is middle C.
    #[serde(deserialize_with = "lenient_pitch")]
    pub pitch: u8,
    /// Start offset in beats.
    pub time: f64,
    /// Length in beats.
    pub duration: f64,
    /// Loudness, 0–1.
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingering: Option<u8>,
    #[serde(
        default,
        deserialize_with = "lenient_dynamic",
        skip_serializing_if = "Option::is_none"
    )]
    pub dynamic: Option<Dynamic>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub slur_start: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub slur_end: bool,
}

impl Note {
    /// A plain note with default velocity and no decoration.
    pub fn new(pitch: u8, time: f64, duration: f64) -> Self {
        Note {
            pitch: pitch.min(127),
            time,
            duration,
            velocity: default_velocity(),
            fingering: None,
            dynamic: None,
            slur_start: false,
            slur_end: false,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    /// Beat at which the note stops sounding.
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

fn default_velocity() -> f64 {
    0.8
}

/// The fixed set of instruments a track can be labelled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Piano,
    Violin,
    Viola,
    Cello,
    Flute,
    Clarinet,
    Oboe,
    Trumpet,
    Horn,
    Harp,
    Guitar,
    Organ,
    Choir,
}

impl Instrument {
    pub const ALL: [Instrument; 13] = [
        Instrument::Piano,
        Instrument::Violin,
        Instrument::Viola,
        Instrument::Cello,
        Instrument::Flute,
        Instrument::Clarinet,
        Instrument::Oboe,
        Instrument::Trumpet,
        Instrument::Horn,
        Instrument::Harp,
        Instrument::Guitar,
        Instrument::Organ,
        Instrument::Choir,
    ];

    /// Lowercase label, as used in JSON.
    pub fn label(self) -> &'static str {
        match self {
            Instrument::Piano => "piano",
            Instrument::Violin => "violin",
            Instrument::Viola => "viola",
            Instrument::Cello => "cello",
            Instrument::Flute => "flute",
            Instrument::Clarinet => "clarinet",
            Instrument::Oboe => "oboe",
            Instrument::Trumpet => "trumpet",
            Instrument::Horn => "horn",
            Instrument::Harp => "harp",
            Instrument::Guitar => "guitar",
            Instrument::Organ => "organ",
            Instrument::Choir => "choir",
        }
    }

    /// Display name for score part lists.
    pub fn display_name(self) -> &'static str {
        match self {
            Instrument::Piano => "Piano",
            Instrument::Violin => "Violin",
            Instrument::Viola => "Viola",
            Instrument::Cello => "Cello",
            Instrument::Flute => "Flute",
            Instrument::Clarinet => "Clarinet",
            Instrument::Oboe => "Oboe",
            Instrument::Trumpet => "Trumpet",
            Instrument::Horn => "French Horn",
            Instrument::Harp => "Harp",
            Instrument::Guitar => "Guitar",
            Instrument::Organ => "Organ",
            Instrument::Choir => "Choir",
        }
    }

    /// Case-insensitive label lookup. An exact label wins; otherwise any
    /// whole word of the label may name the instrument ("Grand Piano").
    /// Unknown labels map to piano.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        if let Some(exact) = Instrument::ALL.into_iter().find(|i| label == i.label()) {
            return exact;
        }
        let words: Vec<&str> = label
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Instrument::ALL
            .into_iter()
            .find(|i| words.contains(&i.label()))
            .unwrap_or(Instrument::Piano)
    }

    /// General MIDI program number (0-based).
    pub fn gm_program(self) -> u8 {
        match self {
            Instrument::Piano => 0,
            Instrument::Violin => 40,
            Instrument::Viola => 41,
            Instrument::Cello => 42,
            Instrument::Flute => 73,
            Instrument::Clarinet => 71,
            Instrument::Oboe => 68,
            Instrument::Trumpet => 56,
            Instrument::Horn => 60,
            Instrument::Harp => 46,
            Instrument::Guitar => 24,
            Instrument::Organ => 19,
            Instrument::Choir => 52,
        }
    }

    /// Closest instrument for a General MIDI program number.
    pub fn from_gm_program(program: u8) -> Self {
        match program {
            0..=7 => Instrument::Piano,
            16..=23 => Instrument::Organ,
            24..=31 => Instrument::Guitar,
            40 => Instrument::Violin,
            41 => Instrument::Viola,
            42 | 43 => Instrument::Cello,
            46 => Instrument::Harp,
            52..=54 => Instrument::Choir,
            56..=59 => Instrument::Trumpet,
            60..=63 => Instrument::Horn,
            68..=70 => Instrument::Oboe,
            71 | 72 => Instrument::Clarinet,
            73..=79 => Instrument::Flute,
            _ => Instrument::Piano,
        }
    }
}

impl<'de> Deserialize<'de> for Instrument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Instrument::from_label(&label))
    }
}

/// One instrument's line of notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub instrument: Instrument,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Track {
    pub fn new(instrument: Instrument, notes: Vec<Note>) -> Self {
        Track {
            instrument,
            volume: default_volume(),
            notes,
        }
    }
}

fn default_volume() -> f64 {
    0.8
}

/// Header fields shared by every notation encoder.
#[derive(Debug, Clone, Copy)]
pub struct ScoreHeader<'a> {
    pub title: &'a str,
    pub subtitle: Option<&'a str>,
    pub composer: &'a str,
    pub tempo: u32,
}

/// A complete piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub composer: String,
    #[serde(default)]
    pub style: String,
    #[serde(default = "default_tempo", deserialize_with = "lenient_tempo")]
    pub tempo: u32,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_tempo() -> u32 {
    100
}

impl Composition {
    pub fn header(&self) -> ScoreHeader<'_> {
        ScoreHeader {
            title: &self.title,
            subtitle: self.subtitle.as_deref(),
            composer: &self.composer,
            tempo: self.tempo,
        }
    }

    /// The same piece with a different set of tracks. Compositions are
    /// replaced wholesale; this is the edit path.
    pub fn with_tracks(&self, tracks: Vec<Track>) -> Composition {
        Composition {
            tracks,
            ..self.clone()
        }
    }

    /// Total number of notes across all tracks.
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// Beat at which the last note stops sounding (0 for an empty piece).
    pub fn end_beat(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(Note::end)
            .fold(0.0, f64::max)
    }

    /// Reject a piece that runs past `grid.max_beats`.
    pub fn check_extent(&self, grid: &GridConfig) -> Result<()> {
        let end = self.end_beat();
        if end <= grid.max_beats {
            return Ok(());
        }
        Err(MusicError::Decode(format!(
            "piece runs to beat {end}, past the limit of {} beats",
            grid.max_beats
        )))
    }

    /// A copy with every track's notes quantized and sorted.
    pub fn normalized(&self, grid: &GridConfig) -> Composition {
        let tracks = self
            .tracks
            .iter()
            .map(|t| Track {
                instrument: t.instrument,
                volume: t.volume.clamp(0.0, 1.0),
                notes: quantize_notes(&t.notes, grid),
            })
            .collect();
        self.with_tracks(tracks)
    }

    /// ABC notation for the current state of the piece, with default layout.
    pub fn notation_text(&self) -> String {
        self.notation_text_with(&GridConfig::default(), &NotationConfig::default())
    }

    /// ABC notation for the current state of the piece.
    pub fn notation_text_with(&self, grid: &GridConfig, notation: &NotationConfig) -> String {
        render_abc(&self.header(), &self.tracks, grid, notation)
    }

    /// Parse a composition arriving as JSON from outside the crate, then
    /// normalize it. A composition with no notes is an empty result.
    pub fn from_json(json: &str, grid: &GridConfig) -> Result<Composition> {
        let raw: Composition = serde_json::from_str(json)?;
        if raw.note_count() == 0 {
            return Err(MusicError::EmptyResult(
                "imported composition has no notes".to_string(),
            ));
        }
        let comp = raw.normalized(grid);
        comp.check_extent(grid)?;
        Ok(comp)
    }

    /// Snapshot pairing this composition with its freshly rendered notation.
    pub fn to_record(&self, grid: &GridConfig, notation: &NotationConfig) -> CompositionRecord {
        CompositionRecord {
            composition: self.clone(),
            notation: self.notation_text_with(grid, notation),
        }
    }
}

/// Serializable export view: a composition plus its notation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    #[serde(flatten)]
    pub composition: Composition,
    pub notation: String,
}

fn lenient_pitch<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u8, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Ok(60);
    }
    Ok(value.round().clamp(0.0, 127.0) as u8)
}

fn lenient_tempo<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Ok(default_tempo());
    }
    Ok(value.round().clamp(20.0, 300.0) as u32)
}

fn lenient_dynamic<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Dynamic>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(Dynamic::from_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_end() {
        let note = Note::new(60, 1.5, 0.75);
        assert_eq!(note.end(), 2.25);
    }

    #[test]
    fn instrument_label_lookup() {
        assert_eq!(Instrument::from_label("Violin"), Instrument::Violin);
        assert_eq!(Instrument::from_label(" CELLO "), Instrument::Cello);
        assert_eq!(Instrument::from_label("grand piano"), Instrument::Piano);
        assert_eq!(Instrument::from_label("theremin"), Instrument::Piano);
        assert_eq!(Instrument::from_label("French Horn"), Instrument::Horn);
        assert_eq!(Instrument::from_label("solo-violin"), Instrument::Violin);
        // Whole words only: these merely contain an instrument label.
        assert_eq!(Instrument::from_label("Harpsichord"), Instrument::Piano);
        assert_eq!(Instrument::from_label("violoncello"), Instrument::Piano);
        for inst in Instrument::ALL {
            assert_eq!(Instrument::from_label(inst.label()), inst);
        }
    }

    #[test]
    fn gm_program_roundtrips_for_every_instrument() {
        for inst in Instrument::ALL {
            assert_eq!(Instrument::from_gm_program(inst.gm_program()), inst);
        }
    }

    #[test]
    fn lenient_json_clamps_fields() {
        let json = r#"{
            "title": "Edge",
            "tempo": 96.6,
            "tracks": [{
                "instrument": "Harpsichord",
                "notes": [
                    { "pitch": 131.2, "time": 0, "duration": 1, "dynamic": "sfz" },
                    { "pitch": -4, "time": 1, "duration": 1, "slurStart": true }
                ]
            }]
        }"#;
        let comp: Composition = serde_json::from_str(json).unwrap();
        assert_eq!(comp.tempo, 97);
        assert_eq!(comp.tracks[0].instrument, Instrument::Piano);
        assert_eq!(comp.tracks[0].notes[0].pitch, 127);
        assert_eq!(comp.tracks[0].notes[0].dynamic, None);
        assert_eq!(comp.tracks[0].notes[1].pitch, 0);
        assert!(comp.tracks[0].notes[1].slur_start);
        assert_eq!(comp.tracks[0].notes[1].velocity, 0.8);
    }

    #[test]
    fn from_json_rejects_empty_pieces() {
        let json = r#"{ "title": "Silence", "tracks": [{ "instrument": "piano", "notes": [] }] }"#;
        let err = Composition::from_json(json, &GridConfig::default()).unwrap_err();
        assert!(matches!(err, MusicError::EmptyResult(_)));
    }

    #[test]
    fn from_json_normalizes_timing() {
        let json = r#"{
            "title": "Loose",
            "tracks": [{ "instrument": "piano",
                "notes": [{ "pitch": 64, "time": 0.51, "duration": 0.01, "velocity": 2.0 }] }]
        }"#;
        let comp = Composition::from_json(json, &GridConfig::default()).unwrap();
        let note = &comp.tracks[0].notes[0];
        assert_eq!(note.time, 0.5);
        assert_eq!(note.duration, 0.0625);
        assert_eq!(note.velocity, 1.0);
    }

    #[test]
    fn from_json_rejects_runaway_timing() {
        let json = r#"{
            "tracks": [{ "instrument": "piano",
                "notes": [
                    { "pitch": 60, "time": 0, "duration": 1 },
                    { "pitch": 62, "time": 1e12, "duration": 1 }
                ] }]
        }"#;
        let err = Composition::from_json(json, &GridConfig::default()).unwrap_err();
        assert!(matches!(err, MusicError::Decode(_)), "{err}");

        let long = r#"{ "tracks": [{ "instrument": "piano", "notes": [{ "pitch": 60, "time": 0, "duration": 1e9 }] }] }"#;
        assert!(Composition::from_json(long, &GridConfig::default()).is_err());

        let edge = r#"{ "tracks": [{ "instrument": "piano", "notes": [{ "pitch": 60, "time": 16383, "duration": 1 }] }] }"#;
        assert!(Composition::from_json(edge, &GridConfig::default()).is_ok());
    }

    #[test]
    fn notation_tracks_edits() {
        let comp = Composition {
            title: "Edit".into(),
            subtitle: None,
            composer: "Test".into(),
            style: "bach".into(),
            tempo: 90,
            tracks: vec![Track::new(Instrument::Piano, vec![Note::new(60, 0.0, 1.0)])],
        };
        let before = comp.notation_text();
        let edited = comp.with_tracks(vec![Track::new(
            Instrument::Piano,
            vec![Note::new(62, 0.0, 1.0)],
        )]);
        let after = edited.notation_text();
        assert_ne!(before, after);
        assert!(after.contains('D'));
    }

    #[test]
    fn record_roundtrips_through_json() {
        let comp = Composition {
            title: "Record".into(),
            subtitle: Some("Op. 1".into()),
            composer: "Test".into(),
            style: "beethoven".into(),
            tempo: 72,
            tracks: vec![Track::new(Instrument::Cello, vec![Note::new(48, 0.0, 2.0)])],
        };
        let record = comp.to_record(&GridConfig::default(), &NotationConfig::default());
        let json = serde_json::to_string(&record).unwrap();
        let back: CompositionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.notation, comp.notation_text());
    }
}
