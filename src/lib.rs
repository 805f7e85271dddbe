pub mod config;
pub mod errors;
pub mod planner;
pub mod seed;
pub mod server;
