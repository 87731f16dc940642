// Audio-to-notes transcription.
//
// Monophonic pitch tracking by autocorrelation. A window slides across the
// waveform; each window is either silent (RMS below threshold) or gets one
// pitch from the lag with the strongest autocorrelation inside the
// `[min_freq, max_freq]` band. Runs of frames with the same pitch become
// notes, and runs shorter than `min_note_seconds` are dropped as noise.
//
// Seconds convert to beats at the configured fixed tempo; no tempo is read
// from the audio.
//
// The scan is a resumable state machine so a caller can keep a UI or a
// runtime responsive: `TranscriptionScan::advance` does at most
// `frames_per_chunk` frames and returns a `Progress`. The `transcribe`
// driver loops over it, reports progress through a callback that can cancel
// the scan, and yields the thread between chunks.

use crate::config::{GridConfig, TranscriberConfig};
use crate::error::{MusicError, Result};
use crate::model::{Composition, Instrument, Note, Track};
use crate::pitch::frequency_to_midi;
use crate::quantize::quantize_notes;
use std::ops::ControlFlow;
use std::time::Instant;

/// Scan progress after a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Fraction of frames analysed, in [0, 1]. Never decreases.
    pub fraction: f64,
    /// Estimated seconds remaining; `None` until the first frame is done.
    pub eta_seconds: Option<f64>,
}

/// Analysis result for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    pitch: Option<u8>,
    rms: f32,
}

/// Root mean square of a window.
pub fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum / window.len() as f64).sqrt() as f32
}

/// Dominant pitch of a window, or `None` when the window is silent or has
/// no positive correlation in the search band.
pub fn estimate_pitch(window: &[f32], sample_rate: u32, config: &TranscriberConfig) -> Option<u8> {
    if rms(window) < config.rms_threshold {
        return None;
    }
    let rate = sample_rate as f64;
    let min_lag = ((rate / config.max_freq).floor() as usize).max(1);
    let max_lag = ((rate / config.min_freq).ceil() as usize).min(window.len().saturating_sub(1));
    if min_lag > max_lag {
        return None;
    }

    let mut best_lag = 0;
    let mut best = 0.0f64;
    for lag in min_lag..=max_lag {
        let corr: f64 = window[..window.len() - lag]
            .iter()
            .zip(&window[lag..])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        if corr > best {
            best = corr;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        return None;
    }
    Some(frequency_to_midi(rate / best_lag as f64))
}

/// Resumable frame-by-frame scan over a waveform.
pub struct TranscriptionScan<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    config: TranscriberConfig,
    grid: GridConfig,
    total_frames: usize,
    frames: Vec<Frame>,
    started: Instant,
}

impl<'a> TranscriptionScan<'a> {
    /// Start a scan. A zero sample rate is a decode error.
    pub fn new(samples: &'a [f32], sample_rate: u32, config: &TranscriberConfig) -> Result<Self> {
        if sample_rate == 0 {
            return Err(MusicError::Decode("sample rate is zero".to_string()));
        }
        let window = config.window_size.max(1);
        let hop = config.hop_size.max(1);
        let total_frames = if samples.is_empty() {
            0
        } else if samples.len() <= window {
            1
        } else {
            (samples.len() - window) / hop + 1
        };
        Ok(TranscriptionScan {
            samples,
            sample_rate,
            config: config.clone(),
            grid: GridConfig::default(),
            total_frames,
            frames: Vec::with_capacity(total_frames),
            started: Instant::now(),
        })
    }

    /// Quantize the result on a non-default grid.
    pub fn with_grid(mut self, grid: &GridConfig) -> Self {
        self.grid = grid.clone();
        self
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn is_done(&self) -> bool {
        self.frames.len() >= self.total_frames
    }

    pub fn progress(&self) -> Progress {
        if self.total_frames == 0 {
            return Progress {
                fraction: 1.0,
                eta_seconds: Some(0.0),
            };
        }
        let fraction = (self.frames.len() as f64 / self.total_frames as f64).min(1.0);
        let eta_seconds = (fraction > 0.0).then(|| {
            let elapsed = self.started.elapsed().as_secs_f64();
            elapsed * (1.0 - fraction) / fraction
        });
        Progress {
            fraction,
            eta_seconds,
        }
    }

    /// Analyse up to `frames_per_chunk` more frames.
    pub fn advance(&mut self) -> Progress {
        let chunk = self.config.frames_per_chunk.max(1);
        let window = self.config.window_size.max(1);
        let hop = self.config.hop_size.max(1);
        let stop = (self.frames.len() + chunk).min(self.total_frames);
        for index in self.frames.len()..stop {
            let start = index * hop;
            let end = (start + window).min(self.samples.len());
            let slice = &self.samples[start..end];
            self.frames.push(Frame {
                pitch: estimate_pitch(slice, self.sample_rate, &self.config),
                rms: rms(slice),
            });
        }
        self.progress()
    }

    /// Complete any remaining frames and fold them into a composition.
    ///
    /// Fails with `EmptyResult` when no note survives segmentation.
    pub fn finish(mut self) -> Result<Composition> {
        while !self.is_done() {
            self.advance();
        }
        let notes = self.segment();
        if notes.is_empty() {
            return Err(MusicError::EmptyResult(
                "no pitched notes detected in the audio".to_string(),
            ));
        }
        Ok(Composition {
            title: "Transcription".to_string(),
            subtitle: None,
            composer: String::new(),
            style: "transcription".to_string(),
            tempo: self.config.tempo,
            tracks: vec![Track::new(
                Instrument::Piano,
                quantize_notes(&notes, &self.grid),
            )],
        })
    }

    /// Merge runs of equal-pitch frames into notes.
    fn segment(&self) -> Vec<Note> {
        let hop_seconds = self.config.hop_size.max(1) as f64 / self.sample_rate as f64;
        let beats_per_second = self.config.tempo as f64 / 60.0;
        let mut notes = Vec::new();
        let mut i = 0;

        while i < self.frames.len() {
            let Some(pitch) = self.frames[i].pitch else {
                i += 1;
                continue;
            };
            let run_start = i;
            let mut energy = 0.0f64;
            while i < self.frames.len() && self.frames[i].pitch == Some(pitch) {
                energy += self.frames[i].rms as f64;
                i += 1;
            }
            let count = i - run_start;
            let seconds = count as f64 * hop_seconds;
            if seconds < self.config.min_note_seconds {
                continue;
            }
            let start_seconds = run_start as f64 * hop_seconds;
            let mean_rms = energy / count as f64;
            notes.push(
                Note::new(
                    pitch,
                    start_seconds * beats_per_second,
                    seconds * beats_per_second,
                )
                .with_velocity(mean_rms * 4.0),
            );
        }
        notes
    }
}

/// Run a full scan, reporting progress after every chunk.
///
/// Returning `ControlFlow::Break` from `on_progress` cancels the scan with
/// `MusicError::Cancelled`.
pub fn transcribe<F>(
    samples: &[f32],
    sample_rate: u32,
    config: &TranscriberConfig,
    mut on_progress: F,
) -> Result<Composition>
where
    F: FnMut(Progress) -> ControlFlow<()>,
{
    let mut scan = TranscriptionScan::new(samples, sample_rate, config)?;
    while !scan.is_done() {
        let progress = scan.advance();
        if on_progress(progress).is_break() {
            return Err(MusicError::Cancelled);
        }
        std::thread::yield_now();
    }
    scan.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, seconds: f32, rate: u32) -> Vec<f32> {
        let n = (seconds * rate as f32) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_pitch_sine() {
        let config = TranscriberConfig::default();
        let samples = tone(440.0, 0.1, 22050);
        assert_eq!(estimate_pitch(&samples[..2048], 22050, &config), Some(69));
        let samples = tone(261.63, 0.1, 22050);
        assert_eq!(estimate_pitch(&samples[..2048], 22050, &config), Some(60));
    }

    #[test]
    fn test_estimate_pitch_silence() {
        let config = TranscriberConfig::default();
        assert_eq!(estimate_pitch(&[0.0; 2048], 22050, &config), None);
        assert_eq!(estimate_pitch(&[0.001; 2048], 22050, &config), None);
    }

    #[test]
    fn test_zero_rate_is_decode_error() {
        let err = TranscriptionScan::new(&[0.0; 10], 0, &TranscriberConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, MusicError::Decode(_)));
    }

    #[test]
    fn test_silence_is_empty_result() {
        let silence = vec![0.0f32; 22050];
        let result = transcribe(&silence, 22050, &TranscriberConfig::default(), |_| {
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(MusicError::EmptyResult(_))));
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let samples = tone(330.0, 0.6, 22050);
        let config = TranscriberConfig {
            frames_per_chunk: 4,
            ..TranscriberConfig::default()
        };
        let mut seen = Vec::new();
        let comp = transcribe(&samples, 22050, &config, |p| {
            seen.push(p);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert!(seen.len() > 1);
        assert!(seen.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(&p.fraction)));
        assert_eq!(seen.last().map(|p| p.fraction), Some(1.0));
        assert_eq!(comp.tracks[0].notes[0].pitch, 64);
    }

    #[test]
    fn test_cancel() {
        let samples = tone(440.0, 1.0, 22050);
        let config = TranscriberConfig {
            frames_per_chunk: 2,
            ..TranscriberConfig::default()
        };
        let mut calls = 0;
        let result = transcribe(&samples, 22050, &config, |_| {
            calls += 1;
            if calls == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(matches!(result, Err(MusicError::Cancelled)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_short_blips_dropped() {
        // 0.05 s of tone is under the 0.12 s minimum.
        let mut samples = tone(440.0, 0.05, 22050);
        samples.extend(std::iter::repeat_n(0.0, 22050));
        let result = transcribe(&samples, 22050, &TranscriberConfig::default(), |_| {
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(MusicError::EmptyResult(_))));
    }

    #[test]
    fn test_manual_scan_matches_driver() {
        let samples = tone(523.25, 0.5, 22050);
        let config = TranscriberConfig::default();
        let mut scan = TranscriptionScan::new(&samples, 22050, &config).unwrap();
        assert!(!scan.is_done());
        let first = scan.advance();
        assert!(first.fraction > 0.0);
        let manual = scan.finish().unwrap();
        let driven = transcribe(&samples, 22050, &config, |_| ControlFlow::Continue(())).unwrap();
        assert_eq!(manual, driven);
        assert_eq!(manual.style, "transcription");
        assert_eq!(manual.tempo, 100);
    }
}
