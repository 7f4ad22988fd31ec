//! Telemetry envelope
//!
//! The engine assembles a [`StatusSnapshot`] under the motion mutex; the
//! service core wraps it with platform data (device IP) and broadcasts it
//! periodically and on demand.

use glissade_core::status::StatusSnapshot;

use heapless::String;
use serde::{Deserialize, Serialize};

/// Maximum length of the device IP string ("255.255.255.255")
pub const MAX_IP_LEN: usize = 15;

/// One telemetry broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    /// Engine status captured under the motion mutex
    pub status: StatusSnapshot,
    /// Device IP as reported by the platform (opaque string)
    pub device_ip: String<MAX_IP_LEN>,
    /// Milliseconds since boot at capture time
    pub uptime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glissade_core::config::MotionConfig;
    use glissade_core::state::{ExecutionContext, MovementType, SystemState};
    use glissade_core::status::{ChaosStatus, OscillationStatus, SequenceStatus};

    fn sample_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            system_state: SystemState::Running,
            movement_type: MovementType::Vaet,
            execution_context: ExecutionContext::Standalone,
            current_position_mm: 42.5,
            current_step: 3400,
            total_distance_mm: 200.0,
            effective_max_distance_mm: 190.0,
            motion: MotionConfig::default(),
            oscillation: OscillationStatus::default(),
            chaos: ChaosStatus::default(),
            sequence: SequenceStatus::default(),
            stats_total_steps: 123_456,
        }
    }

    #[test]
    fn telemetry_json_round_trip() {
        let mut ip = String::new();
        ip.push_str("192.168.4.1").unwrap();
        let telemetry = Telemetry {
            status: sample_snapshot(),
            device_ip: ip,
            uptime_ms: 98_765,
        };

        let json = serde_json::to_string(&telemetry).unwrap();
        let back: Telemetry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status.system_state, SystemState::Running);
        assert_eq!(back.status.current_step, 3400);
        assert_eq!(back.device_ip.as_str(), "192.168.4.1");
        assert_eq!(back.uptime_ms, 98_765);
    }

    #[test]
    fn snapshot_serializes_state_names() {
        let json = serde_json::to_string(&sample_snapshot()).unwrap();
        // State enums serialize by variant name for the browser client.
        assert!(json.contains("\"Running\""));
        assert!(json.contains("\"Vaet\""));
    }
}
