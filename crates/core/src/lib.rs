pub mod alerting;
pub mod capture;
pub mod config;
pub mod detection;
pub mod pipeline;
pub mod shared;
