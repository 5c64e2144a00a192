pub mod app;
pub mod archive;
pub mod cache;
pub mod config;
pub mod domain;
pub mod downloads;
pub mod error;
pub mod events;
pub mod github;
pub mod output;
pub mod preferences;
pub mod repository;
pub mod search;
pub mod store;
pub mod tasks;
pub mod tui;
