// Error type for the music crate.
//
// Mirrors the failure taxonomy of the pipeline: decode failures (bad audio,
// MIDI, or JSON input) are kept apart from empty results (an input that
// decoded fine but held no notes), so callers can tell "this file is broken"
// from "this file is silent". The generator and encoders are total and never
// produce an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MusicError {
    /// Input could not be decoded (corrupt audio, malformed MIDI).
    #[error("Failed to decode input: {0}")]
    Decode(String),

    /// Input decoded but contained no notes.
    #[error("No notes found: {0}")]
    EmptyResult(String),

    /// A long-running scan was cancelled by its caller.
    #[error("Transcription cancelled")]
    Cancelled,

    /// Configuration file was unreadable or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// MIDI encoding failed.
    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MusicError>;
