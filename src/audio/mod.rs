// Audio processing module
// WAV ingestion and chroma feature extraction for time-warp alignment

pub mod chroma;
pub mod ingest;

pub use chroma::{chroma_events, extract_chroma, ChromaConfig, SpectralFeatures};
pub use ingest::{ingest_wav, read_wav, AudioData, AudioError};
