//! Service-core boundary tasks
//!
//! These tasks sit where the external collaborators (socket broadcaster,
//! persistence writer) plug in. The broadcaster consumes status snapshots;
//! the event task forwards persistence triggers and fault notifications.
//! Network framing itself is handled outside the motion firmware.

use defmt::*;

use glissade_core::state::EngineEvent;

use crate::channels::{EVENT_CHANNEL, STATUS_SIGNAL};

#[embassy_executor::task]
pub async fn telemetry_task() {
    info!("telemetry task up");

    loop {
        let snapshot = STATUS_SIGNAL.wait().await;
        // Hand-off point for the socket broadcaster.
        debug!(
            "status: {:?} pos={}mm steps={}",
            snapshot.system_state, snapshot.current_position_mm, snapshot.stats_total_steps
        );
    }
}

#[embassy_executor::task]
pub async fn event_task() {
    loop {
        let event = EVENT_CHANNEL.receive().await;
        match event {
            EngineEvent::PersistStats => {
                // Hand-off point for the filesystem persistence writer.
                debug!("persist stats requested");
            }
            EngineEvent::SafetyFault(kind) => {
                error!("safety fault: {:?}", kind);
            }
            other => {
                debug!("engine event: {:?}", other);
            }
        }
    }
}
