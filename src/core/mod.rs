// src/core/mod.rs
pub mod actor;
pub mod context;
pub mod engine;
pub mod error;
pub mod market;
pub mod pipeline;
pub mod position;
pub mod registry;
pub mod sink;
pub mod wallet;
