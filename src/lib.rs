pub mod adapter;
pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod jobs;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod providers;
pub mod store;
