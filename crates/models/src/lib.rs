pub mod config;
pub mod error;
pub mod telegram;
pub mod transcription;

pub use config::*;
pub use error::*;
pub use telegram::*;
pub use transcription::*;
