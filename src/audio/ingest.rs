// Audio ingestion
// Decodes WAV recordings into normalized mono-capable sample buffers

use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV data: {0}")]
    WavRead(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Recording contains no samples")]
    Empty,

    #[error("Invalid analysis parameter: {0}")]
    InvalidParameter(String),
}

/// Decoded recording
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,

    pub sample_rate: u32,
    pub channels: u16,

    /// Bit depth of the source encoding
    pub bit_depth: u16,

    /// Samples per channel
    pub frame_count: usize,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        if channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Decode a WAV recording held in memory
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    decode(WavReader::new(Cursor::new(data))?)
}

/// Decode a WAV recording from disk
pub fn read_wav(path: &Path) -> Result<AudioData, AudioError> {
    log::info!("Reading audio from {}", path.display());
    decode(WavReader::open(path)?)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<AudioData, AudioError> {
    let spec = reader.spec();
    let format = spec.sample_format;
    let bits = spec.bits_per_sample;

    let samples: Vec<f32> = match (format, bits) {
        // 8-bit PCM is unsigned in the file; hound recenters it on zero
        (SampleFormat::Int, 8) => scaled::<i8, _>(&mut reader, 128.0)?,
        (SampleFormat::Int, 16) => scaled::<i16, _>(&mut reader, 32768.0)?,
        (SampleFormat::Int, 24) => scaled::<i32, _>(&mut reader, 8388608.0)?,
        (SampleFormat::Int, 32) => scaled::<i32, _>(&mut reader, 2147483648.0)?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, bits
            )));
        }
    };

    if samples.is_empty() || spec.channels == 0 {
        return Err(AudioError::Empty);
    }

    let frame_count = samples.len() / spec.channels as usize;
    log::info!(
        "Decoded {} frames at {} Hz, {} channel(s), {}-bit",
        frame_count,
        spec.sample_rate,
        spec.channels,
        bits
    );

    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: bits,
        frame_count,
    })
}

fn scaled<S, R>(reader: &mut WavReader<R>, full_scale: f32) -> Result<Vec<f32>, AudioError>
where
    S: hound::Sample + Into<i32>,
    R: Read,
{
    reader
        .samples::<S>()
        .map(|s| {
            s.map(|v| Into::<i32>::into(v) as f32 / full_scale)
                .map_err(AudioError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(channels: u16, frames: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in frames {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decodes_and_normalizes_16_bit() {
        let audio = ingest_wav(&wav_bytes(1, &[0, 16384, -32768, 32767])).unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frame_count, 4);
        assert_eq!(audio.samples[1], 0.5);
        assert_eq!(audio.samples[2], -1.0);
        assert!((audio.duration_secs() - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_stereo_to_mono_averages_frames() {
        let audio = ingest_wav(&wav_bytes(2, &[16384, 0, -16384, -16384])).unwrap();

        assert_eq!(audio.frame_count, 2);
        let mono = audio.to_mono();
        assert_eq!(mono, vec![0.25, -0.5]);
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        std::fs::write(&path, wav_bytes(1, &[1, 2, 3])).unwrap();

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.frame_count, 3);
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(matches!(ingest_wav(&wav_bytes(1, &[])), Err(AudioError::Empty)));
        assert!(matches!(ingest_wav(b"not a wav"), Err(AudioError::WavRead(_))));
    }
}
