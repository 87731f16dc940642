// Audio file decoding for the transcriber.
//
// Uses symphonia's format probe and codec registry, so WAV, MP3, FLAC, and
// OGG/Vorbis all decode through one path. Output is a mono f32 waveform:
// multi-channel audio is averaged across channels frame by frame.
//
// Any failure to probe, find a track, or decode surfaces as
// `MusicError::Decode` with the underlying reason. A corrupt packet fails
// the whole decode, and so does a stream that ends short of the frame count
// its header declares: a transcription of partial audio would place every
// later note at the wrong time.

use crate::error::{MusicError, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded mono waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before downmixing.
    pub source_channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an in-memory audio file. `extension_hint` (e.g. `"wav"`) helps the
/// probe but is not required.
pub fn decode_audio(data: &[u8], extension_hint: Option<&str>) -> Result<DecodedAudio> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(&ext.trim_start_matches('.').to_ascii_lowercase());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MusicError::Decode(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MusicError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let declared_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MusicError::Decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut channels = 0;
    let mut frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(MusicError::Decode(
                    "stream parameters changed mid-file".to_string(),
                ));
            }
            Err(e) => return Err(MusicError::Decode(format!("format error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| MusicError::Decode(format!("corrupt audio packet: {e}")))?;
        frames += decoded.frames() as u64;

        let signal = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = signal.rate;
        }
        channels = signal.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, signal);
        buffer.copy_interleaved_ref(decoded);
        downmix_into(buffer.samples(), channels, &mut samples);
    }

    if let Some(declared) = declared_frames.filter(|&declared| frames < declared) {
        return Err(MusicError::Decode(format!(
            "audio stream truncated: {frames} of {declared} frames"
        )));
    }
    if samples.is_empty() {
        return Err(MusicError::Decode("audio stream held no samples".to_string()));
    }
    if sample_rate == 0 {
        return Err(MusicError::Decode("audio stream has no sample rate".to_string()));
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
        source_channels: channels,
    })
}

/// Decode an audio file from disk, using its extension as the probe hint.
pub fn load_audio(path: &std::path::Path) -> Result<DecodedAudio> {
    let data = std::fs::read(path)?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_audio(&data, ext)
}

/// Average interleaved frames down to one channel.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
