pub mod commands;
pub mod jobs;
pub mod poller;
pub mod service;
pub mod telegram;
pub mod transkriptor;

pub use commands::*;
pub use jobs::*;
pub use poller::*;
pub use service::*;
pub use telegram::*;
pub use transkriptor::*;
