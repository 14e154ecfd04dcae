pub mod chart;
pub mod config;
pub mod fetcher;
pub mod logging;
pub mod node_client;
pub mod retry;
pub mod run;
pub mod stats;
pub mod stopper;
pub mod store;
pub mod test_utils;
