//! Worker module for polling and processing reconstruction tasks
//!
//! This module provides:
//! - TaskRunner: Main poll loop over the shared task list
//! - TaskProcessor: Processes individual tasks (stage, reconstruct, upload)
//! - WorkerConfig: Configuration for the worker

pub mod config;
pub mod processor;
pub mod runner;

pub use config::WorkerConfig;
pub use processor::TaskProcessor;
pub use runner::{setup_signal_handler, CycleReport, TaskRunner};
