pub mod backends;
pub mod catalog;
pub mod config;
pub mod datagen;
pub mod engine;
pub mod errors;
pub mod model;
pub mod report;
pub mod storage;
