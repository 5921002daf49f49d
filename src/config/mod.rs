// src/config/mod.rs
pub mod ai;
pub mod scan;

pub use ai::AiConfig;
pub use scan::ScanConfig;
