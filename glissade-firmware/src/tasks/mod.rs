//! Embassy tasks

pub mod motion;
pub mod telemetry;
