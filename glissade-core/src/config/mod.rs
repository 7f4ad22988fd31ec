//! Configuration types and platform constants

pub mod hardware;
pub mod types;

pub use types::{
    ChaosRuntimeConfig, CyclePauseConfig, CyclePauseState, MotionConfig, OscillationConfig,
    PendingMotionConfig, SpeedCurve, SpeedEffect, SystemConfig, Waveform, ZoneEffectConfig,
    ZoneEffectState,
};
