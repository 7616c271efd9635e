pub mod alert;
pub mod api;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod logs;
pub mod models;
pub mod probe;
pub mod rotator;
pub mod store;
pub mod utils;

pub use config::WorkerConfig;
pub use engine::{GatherReport, Worker, WorkerHandle};
