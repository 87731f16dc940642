// Partita music core.
//
// Turns a composition, whether generated, transcribed from audio or imported,
// into engraving-ready notation. Every source produces the same
// `Composition` value and every output is a pure function of it.
//
// Architecture:
// - model.rs: Note / Track / Composition records, lenient JSON import
// - config.rs: PartitaConfig tree (grid, notation, generator, transcriber)
// - error.rs: MusicError taxonomy shared by every fallible operation
// - pitch.rs: MIDI pitch <-> ABC symbol, letter/alter/octave, frequency
// - quantize.rs: grid quantization and the grand-staff splitter
// - style.rs: style profiles, rubato shapes, FNV-1a tempo derivation
// - harmony.rs: weighted scale-degree transition tables
// - generator.rs: stochastic composer (seed motif, transformations, bass)
// - layout.rs: measure filling shared by both notation encoders
// - abc.rs: ABC text output
// - musicxml.rs: MusicXML partwise output
// - midi.rs: SMF import and export
// - audio.rs: symphonia decoding to a mono waveform
// - transcribe.rs: chunked autocorrelation pitch tracking with progress
// - export.rs: renders every output format from one layout and writes files
//
// All randomness flows through `partita_prng::Prng`, so generation is
// deterministic given a seed.

pub mod abc;
pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod harmony;
pub mod layout;
pub mod midi;
pub mod model;
pub mod musicxml;
pub mod pitch;
pub mod quantize;
pub mod style;
pub mod transcribe;

pub use config::PartitaConfig;
pub use error::{MusicError, Result};
pub use model::{Composition, Instrument, Note, Track};
