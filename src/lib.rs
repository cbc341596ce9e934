pub mod audit;
pub mod config;
pub mod dag;
pub mod errors;
pub mod orchestrator;
pub mod plan;
pub mod worker;
