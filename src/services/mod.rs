// src/services/mod.rs
pub mod batch;
pub mod collectors;
pub mod delivery;
pub mod indicators;
pub mod news_dedup;
pub mod orchestrator;
pub mod report;
pub mod signals;
