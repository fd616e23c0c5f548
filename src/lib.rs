pub mod atomic;
pub mod batch;
pub mod builder;
pub mod config;
pub mod courses;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod report;
pub mod types;
