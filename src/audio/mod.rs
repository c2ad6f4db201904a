//! Audio devices, data units and the PCM codec.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod output;
pub mod pcm;
pub mod recorder;
#[cfg(feature = "cpal-audio")]
pub mod speaker;
pub mod wav;

pub use frame::{AudioFormat, AudioFrame, EncodedChunk, PcmBuffer};
pub use output::{AudioOutput, MockAudioOutput, SegmentId};
pub use recorder::{AudioSource, MockAudioSource};
