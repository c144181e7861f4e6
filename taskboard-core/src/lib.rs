pub mod broadcast;
pub mod client;
pub mod config;
pub mod events;
pub mod gateway;
pub mod planner;
pub mod position;
pub mod storage;
pub mod types;
