//! Command set consumed by the motion engine
//!
//! Each socket message decodes into one of these records. The engine applies
//! them under the motion mutex; rejections travel back as typed errors
//! formatted by the service core.

use glissade_core::config::hardware::MAX_SEQUENCE_LINES;
use glissade_core::config::{
    ChaosRuntimeConfig, CyclePauseConfig, OscillationConfig, ZoneEffectConfig,
};
use glissade_core::sequence::SequenceLine;

use serde::{Deserialize, Serialize};

/// Which mode a cycle-pause update applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CyclePauseTarget {
    Vaet,
    Oscillation,
}

/// Sequence program operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceCommand {
    Add(SequenceLine),
    Update { index: u8, line: SequenceLine },
    Delete { index: u8 },
    Move { from: u8, to: u8 },
    Duplicate { index: u8 },
    Clear,
    /// Replace the whole program
    Import(heapless::Vec<SequenceLine, MAX_SEQUENCE_LINES>),
    /// Request the program back as telemetry
    Export,
    Start { loop_mode: bool },
    Stop,
}

/// Commands accepted by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Forward the client's epoch time to the platform clock
    SyncTime { epoch_ms: u64 },
    /// Trigger one immediate telemetry snapshot
    GetStatus,

    // Back-and-forth parameters and control
    SetDistance { mm: f32 },
    SetStartPosition { mm: f32 },
    SetSpeedForward { level: f32 },
    SetSpeedBackward { level: f32 },
    Start { distance_mm: f32, level: f32 },
    Stop,
    Pause,

    // Oscillation
    SetOscillation(OscillationConfig),
    StartOscillation,
    StopOscillation,

    // Chaos
    SetChaos(ChaosRuntimeConfig),
    StartChaos,
    StopChaos,

    // Shared motion options
    SetCyclePause {
        target: CyclePauseTarget,
        config: CyclePauseConfig,
    },
    SetZoneEffect(ZoneEffectConfig),

    // Sequencer
    Sequence(SequenceCommand),

    // Pursuit
    PursuitMove { target_mm: f32, max_level: f32 },

    // Supervisor actions
    ReturnToStart,
    Calibrate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glissade_core::config::Waveform;

    #[test]
    fn command_json_round_trip() {
        let commands = [
            Command::SyncTime { epoch_ms: 1_700_000_000_000 },
            Command::SetDistance { mm: 120.5 },
            Command::Start {
                distance_mm: 100.0,
                level: 5.0,
            },
            Command::Pause,
            Command::PursuitMove {
                target_mm: 42.0,
                max_level: 10.0,
            },
            Command::ReturnToStart,
        ];

        for command in &commands {
            let json = serde_json::to_string(command).unwrap();
            let back: Command = serde_json::from_str(&json).unwrap();
            // Compare through re-encoding; Command holds f32 fields.
            assert_eq!(json, serde_json::to_string(&back).unwrap());
        }
    }

    #[test]
    fn oscillation_config_round_trip() {
        let mut config = OscillationConfig::default();
        config.center_mm = 100.0;
        config.amplitude_mm = 25.0;
        config.waveform = Waveform::Triangle;
        config.frequency_hz = 1.5;
        config.cycle_count = 10;

        let json = serde_json::to_string(&Command::SetOscillation(config)).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        match back {
            Command::SetOscillation(c) => {
                assert_eq!(c.waveform, Waveform::Triangle);
                assert_eq!(c.cycle_count, 10);
                assert!((c.amplitude_mm - 25.0).abs() < 1e-6);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn sequence_line_round_trip() {
        let mut line = SequenceLine::default();
        line.distance_mm = 75.0;
        line.cycle_count = 4;

        let json = serde_json::to_string(&Command::Sequence(SequenceCommand::Add(line))).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        match back {
            Command::Sequence(SequenceCommand::Add(l)) => {
                assert!((l.distance_mm - 75.0).abs() < 1e-6);
                assert_eq!(l.cycle_count, 4);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        // Forward compatibility: decoding tolerates extra fields.
        let json = r#"{"SetDistance":{"mm":50.0,"future_field":true}}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(command, Command::SetDistance { .. }));
    }
}
