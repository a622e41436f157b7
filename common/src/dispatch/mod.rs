// Dispatch engine module

pub mod engine;

pub use engine::{DispatchConfig, DispatchEngine, Dispatcher};
