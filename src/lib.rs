pub mod app;
pub mod comparison;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod products;
pub mod state;
pub mod storage;
