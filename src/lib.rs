pub mod analysis;
pub mod config;
pub mod dataset;
pub mod departure;
pub mod error;
pub mod fetch;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod providers;
pub mod report;
