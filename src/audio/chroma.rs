// Chroma features
// Pitch-class energy per STFT frame, and note onsets picked from it

use std::sync::Arc;

use ndarray::Array2;
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use super::ingest::{AudioData, AudioError};
use crate::align::FeatureMatrix;
use crate::events::{Category, RawObservation};

/// Pitch classes per octave
pub const PITCH_CLASSES: usize = 12;

/// A pitch class turns on once its chroma value rises above this
pub const ONSET_THRESHOLD: f32 = 0.7;

/// ...and turns off again once it drops below this
pub const RELEASE_THRESHOLD: f32 = 0.5;

/// Lowest frequency folded into the chroma (A0)
const MIN_FREQUENCY_HZ: f64 = 27.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// FFT window in samples
    pub n_fft: usize,

    /// Advance between frames in samples
    pub hop_length: usize,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        ChromaConfig {
            n_fft: 2048,
            hop_length: 1024,
        }
    }
}

/// Chroma of one recording with the facts needed to place its bins in time
#[derive(Debug, Clone)]
pub struct SpectralFeatures {
    /// `12 x frames`, each column scaled so its largest class is 1.0
    pub matrix: FeatureMatrix,
    pub sampling_rate: u32,
    pub duration: f64,
    pub total_samples: usize,
}

/// Compute the chroma of a recording
///
/// Frames are centered on multiples of `hop_length` with zero padding at
/// both ends, so bin `k` starts at `k * hop_length / sample_rate` seconds.
pub fn extract_chroma(audio: &AudioData, config: &ChromaConfig) -> Result<SpectralFeatures, AudioError> {
    if config.n_fft < 2 || config.hop_length == 0 {
        return Err(AudioError::InvalidParameter(format!(
            "n_fft {} and hop_length {} must be positive",
            config.n_fft, config.hop_length
        )));
    }

    let mono = audio.to_mono();
    if mono.is_empty() {
        return Err(AudioError::Empty);
    }

    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let frames = 1 + mono.len() / hop;

    log::info!(
        "Computing chroma: {} samples, {} frames (n_fft {}, hop {})",
        mono.len(),
        frames,
        n_fft,
        hop
    );

    let mut planner = RealFftPlanner::<f32>::new();
    let fft: Arc<dyn RealToComplex<f32>> = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let window = hann(n_fft);
    let classes = bin_classes(n_fft, audio.sample_rate);
    let pad = n_fft / 2;
    let mut chroma = Array2::<f32>::zeros((PITCH_CLASSES, frames));

    for frame in 0..frames {
        let center = frame * hop;
        for (i, slot) in input.iter_mut().enumerate() {
            // Position in the unpadded signal
            let sample = (center + i).checked_sub(pad).and_then(|p| mono.get(p));
            *slot = sample.copied().unwrap_or(0.0) * window[i];
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| AudioError::InvalidParameter(e.to_string()))?;

        for (bin, value) in spectrum.iter().enumerate() {
            if let Some(class) = classes[bin] {
                chroma[[class, frame]] += value.norm_sqr();
            }
        }

        let mut column = chroma.column_mut(frame);
        let peak = column.fold(0.0f32, |m, &v| m.max(v));
        if peak > 0.0 {
            column.mapv_inplace(|v| v / peak);
        }
    }

    let bin_duration = hop as f64 / audio.sample_rate as f64;
    let matrix = FeatureMatrix::new(chroma, bin_duration)
        .map_err(|e| AudioError::InvalidParameter(e.to_string()))?;

    Ok(SpectralFeatures {
        matrix,
        sampling_rate: audio.sample_rate,
        duration: audio.duration_secs(),
        total_samples: mono.len(),
    })
}

/// Periodic Hann window
fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .map(|w| w as f32)
        .collect()
}

/// Pitch class of each FFT bin, with C = 0; `None` below the folding range
fn bin_classes(n_fft: usize, sample_rate: u32) -> Vec<Option<usize>> {
    let bin_hz = sample_rate as f64 / n_fft as f64;
    (0..=n_fft / 2)
        .map(|bin| {
            let freq = bin as f64 * bin_hz;
            if freq < MIN_FREQUENCY_HZ {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(PITCH_CLASSES as i64) as usize)
        })
        .collect()
}

/// Pick note onsets from a chroma matrix
///
/// Each pitch class is tracked with hysteresis: an onset is emitted when
/// an inactive class rises above `ONSET_THRESHOLD`, and the class can fire
/// again only after it has dropped below `RELEASE_THRESHOLD`. Ticks are bin
/// indices, or bin start times scaled by `ticks_per_second` when given.
/// Scaled ticks stay strictly increasing from bin to bin: a bin that would
/// land on its predecessor's tick takes the next tick instead.
pub fn chroma_events(features: &FeatureMatrix, ticks_per_second: Option<f64>) -> Vec<RawObservation> {
    let channels = features.channels();
    let mut active = vec![false; channels];
    let mut events = Vec::new();
    let mut last_tick: Option<u64> = None;
    let mut bumped = 0usize;

    for bin in 0..features.total_bins() {
        let time = features.bin_time(bin);
        let scaled = match ticks_per_second {
            Some(tps) => (time * tps).floor() as u64,
            None => bin as u64,
        };
        let tick = match last_tick {
            Some(previous) if scaled <= previous => {
                bumped += 1;
                previous + 1
            }
            _ => scaled,
        };
        last_tick = Some(tick);

        for (class, &value) in features.column(bin).iter().enumerate() {
            if !active[class] && value > ONSET_THRESHOLD {
                active[class] = true;
                events.push(RawObservation::new(class as Category, tick, time));
            } else if active[class] && value < RELEASE_THRESHOLD {
                active[class] = false;
            }
        }
    }

    log::info!(
        "Picked {} chroma onsets from {} bins",
        events.len(),
        features.total_bins()
    );
    if bumped > 0 {
        log::warn!(
            "{} chroma bins shorter than one tick were moved to the next tick",
            bumped
        );
    }

    events
}
