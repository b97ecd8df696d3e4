//! Toymix Core - Sample allocation and mixing engine for synthetic
//! machine-sound datasets
//!
//! The engine takes a catalog of recorded machine sounds and environmental
//! noise, hands out recordings to typed requests without reuse, mixes each
//! signal with a noise recording at a target SNR and writes numbered PCM16
//! files into the destination dataset.

pub mod allocator;
pub mod audio_file;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mixer;
pub mod sequencer;
pub mod shuffle;
pub mod types;

pub use error::{MixError, MixResult};
pub use types::*;
