pub mod alignment;
#[cfg(feature = "cpal-capture")]
pub mod capture_cpal;
pub mod config;
pub mod constants;
pub mod error;
pub mod playback;
pub mod segmenter;
pub mod services;
pub mod studio;
pub mod task_worker;
pub mod text_assembler;
pub mod text_diff;
pub mod tokenizer;
pub mod voice_samples;

pub use error::{ComposerError, Result};
pub use studio::{Collaborators, OutputOwner, Studio, StudioEvent, StudioUpdate};
