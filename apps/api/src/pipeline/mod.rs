//! Task orchestration: stage contracts, the single-flight orchestrator and
//! the progress tracker it drives.

pub mod contracts;
pub mod handlers;
pub mod orchestrator;
pub mod tracker;
pub mod types;

pub use orchestrator::{InvokeStatus, Orchestrator};
