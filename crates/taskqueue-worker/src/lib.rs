mod config;
mod handler;
mod worker;

pub use config::WorkerConfig;
pub use handler::{EchoHandler, HandlerRegistry, HandlerResult, TaskHandler};
pub use worker::WorkerRuntime;
