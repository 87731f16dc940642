// Output bundle for one composition.
//
// Renders every file format from a single `MeasureLayout`, so the ABC and
// MusicXML outputs can never disagree about measures or rests. Also owns the
// on-disk naming: all four files share a stem derived from the title.

use crate::config::PartitaConfig;
use crate::error::Result;
use crate::layout::MeasureLayout;
use crate::model::{Composition, CompositionRecord};
use crate::quantize::prepare_voices;
use crate::{abc, midi, musicxml};
use std::path::{Path, PathBuf};

/// Every output format for one composition, held in memory.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub abc: String,
    pub musicxml: String,
    pub midi: Vec<u8>,
    /// Pretty-printed `CompositionRecord`.
    pub json: String,
}

impl Rendered {
    /// Render every format. A piece running past `grid.max_beats` is refused
    /// before any measure is laid out.
    pub fn render(comp: &Composition, config: &PartitaConfig) -> Result<Rendered> {
        comp.check_extent(&config.grid)?;
        let header = comp.header();
        let voices = prepare_voices(&comp.tracks, &config.grid);
        let layout = MeasureLayout::build(&voices, &config.grid, &config.notation);

        let abc = abc::render_layout(&header, &layout);
        let musicxml = musicxml::render_layout(
            &header,
            &layout,
            config.notation.divisions_per_quarter,
            musicxml::part_name(&voices),
        );
        let midi = midi::to_midi_bytes(comp)?;
        let record = CompositionRecord {
            composition: comp.clone(),
            notation: abc.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        Ok(Rendered {
            abc,
            musicxml,
            midi,
            json,
        })
    }

    /// Write `<stem>.abc`, `<stem>.musicxml`, `<stem>.mid` and `<stem>.json`
    /// into `dir`, creating it if needed. Returns the paths written.
    pub fn write_all(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let files: [(&str, &[u8]); 4] = [
            ("abc", self.abc.as_bytes()),
            ("musicxml", self.musicxml.as_bytes()),
            ("mid", &self.midi),
            ("json", self.json.as_bytes()),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (ext, bytes) in files {
            let path = dir.join(format!("{stem}.{ext}"));
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Filesystem-safe lowercase stem for a title: alphanumerics kept, runs of
/// anything else collapsed to one `-`.
pub fn file_stem(title: &str) -> String {
    let mut stem = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('-') {
            stem.push('-');
        }
    }
    while stem.ends_with('-') {
        stem.pop();
    }
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}
