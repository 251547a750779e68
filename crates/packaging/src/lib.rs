pub mod cache;
pub mod context;
pub mod docker;
pub mod dockerfile;
pub mod error;
pub mod image_builder;
pub mod image_ref;
pub mod plan;
pub mod runtimes;
pub mod service;
pub mod store;

pub use cache::*;
pub use context::*;
pub use docker::*;
pub use dockerfile::*;
pub use error::*;
pub use image_builder::*;
pub use image_ref::*;
pub use plan::*;
pub use runtimes::*;
pub use service::*;
pub use store::*;
