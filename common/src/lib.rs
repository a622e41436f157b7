// Common library shared by the dispatcher binary and embedders

pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod lock;
pub mod models;
pub mod push;
pub mod telemetry;
