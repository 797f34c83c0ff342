pub mod api;
pub mod app;
pub mod artifact;
pub mod client;
pub mod config;
pub mod metrics;
pub mod recording;
pub mod runtimes;
pub mod util;
