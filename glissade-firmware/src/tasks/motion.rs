//! Motion-core loop
//!
//! Owns the engine. Each iteration drains pending commands, runs one engine
//! tick, fans out engine events to the service core, and publishes a status
//! snapshot periodically. The loop yields between iterations so the embassy
//! time driver stays serviced, but never awaits anything slow.

use defmt::*;
use embassy_futures::yield_now;
use embassy_time::Instant;

use glissade_core::engine::{CommandError, MotionEngine};
use glissade_core::state::MovementType;
use glissade_protocol::{Command, CyclePauseTarget, SequenceCommand};

use crate::channels::{COMMAND_CHANNEL, EPOCH_OFFSET_MS, EVENT_CHANNEL, SEQUENCE_EXPORT, STATUS_SIGNAL};
use crate::hw::clock::UptimeClock;
use crate::hw::contacts::GpioContacts;
use crate::hw::motor::GpioMotor;

/// Periodic telemetry interval (ms)
const STATUS_INTERVAL_MS: u64 = 250;

type Engine = MotionEngine<GpioMotor, GpioContacts, UptimeClock>;

#[embassy_executor::task]
pub async fn motion_task(mut engine: Engine) {
    info!("motion core up");

    let mut last_status = Instant::now();

    loop {
        // Drain the command backlog before the tick so state-changing
        // commands (stop, pause) apply at the next dispatch.
        while let Ok(command) = COMMAND_CHANNEL.try_receive() {
            apply_command(&mut engine, command);
        }

        let events = engine.process();
        for event in events {
            if EVENT_CHANNEL.try_send(event).is_err() {
                warn!("event channel full, dropping {:?}", event);
            }
        }

        let now = Instant::now();
        if (now - last_status).as_millis() >= STATUS_INTERVAL_MS {
            last_status = now;
            STATUS_SIGNAL.signal(engine.snapshot());
        }

        yield_now().await;
    }
}

/// Apply one decoded command to the engine, logging rejections.
fn apply_command(engine: &mut Engine, command: Command) {
    let result: Result<(), CommandError> = match command {
        Command::SyncTime { epoch_ms } => {
            EPOCH_OFFSET_MS.signal(epoch_ms.saturating_sub(Instant::now().as_millis()));
            Ok(())
        }
        Command::GetStatus => {
            STATUS_SIGNAL.signal(engine.snapshot());
            Ok(())
        }

        Command::SetDistance { mm } => {
            if engine.cmd_set_distance(mm) {
                warn!("distance clamped to fit travel");
            }
            Ok(())
        }
        Command::SetStartPosition { mm } => {
            if engine.cmd_set_start_position(mm) {
                warn!("start position adjusted to fit travel");
            }
            Ok(())
        }
        Command::SetSpeedForward { level } => {
            engine.cmd_set_speed_forward(level);
            Ok(())
        }
        Command::SetSpeedBackward { level } => {
            engine.cmd_set_speed_backward(level);
            Ok(())
        }
        Command::Start { distance_mm, level } => engine.cmd_start(distance_mm, level),
        Command::Stop => {
            drain_events(engine.cmd_stop());
            Ok(())
        }
        Command::Pause => {
            if let Some(event) = engine.cmd_toggle_pause() {
                let _ = EVENT_CHANNEL.try_send(event);
            }
            Ok(())
        }

        Command::SetOscillation(config) => engine.cmd_set_oscillation(config),
        Command::StartOscillation => engine.cmd_start_oscillation(),
        Command::StopOscillation => {
            drain_events(engine.cmd_stop());
            Ok(())
        }

        Command::SetChaos(config) => {
            engine.cmd_set_chaos(config);
            Ok(())
        }
        Command::StartChaos => engine.cmd_start_chaos(),
        Command::StopChaos => {
            drain_events(engine.cmd_stop());
            Ok(())
        }

        Command::SetCyclePause { target, config } => {
            let mode = match target {
                CyclePauseTarget::Vaet => MovementType::Vaet,
                CyclePauseTarget::Oscillation => MovementType::Oscillation,
            };
            engine.cmd_set_cycle_pause(mode, config);
            Ok(())
        }
        Command::SetZoneEffect(config) => {
            if engine.cmd_set_zone_effect(config) {
                warn!("zone effect adjusted to fit travel");
            }
            Ok(())
        }

        Command::Sequence(seq) => apply_sequence_command(engine, seq),

        Command::PursuitMove {
            target_mm,
            max_level,
        } => engine.cmd_pursuit_move(target_mm, max_level),

        Command::ReturnToStart => {
            drain_events(engine.cmd_return_to_start());
            Ok(())
        }
        Command::Calibrate => {
            drain_events(engine.cmd_calibrate());
            Ok(())
        }
    };

    if let Err(error) = result {
        warn!("command rejected: {:?}", error);
    }
}

fn apply_sequence_command(engine: &mut Engine, command: SequenceCommand) -> Result<(), CommandError> {
    match command {
        SequenceCommand::Add(line) => engine.sequence.add_line(line).map(|_| ()),
        SequenceCommand::Update { index, line } => {
            engine.sequence.update_line(index as usize, line)
        }
        SequenceCommand::Delete { index } => engine.sequence.delete_line(index as usize),
        SequenceCommand::Move { from, to } => {
            engine.sequence.move_line(from as usize, to as usize)
        }
        SequenceCommand::Duplicate { index } => {
            engine.sequence.duplicate_line(index as usize).map(|_| ())
        }
        SequenceCommand::Clear => {
            engine.sequence.clear();
            Ok(())
        }
        SequenceCommand::Import(lines) => engine.sequence.import(&lines),
        SequenceCommand::Export => {
            let mut program = heapless::Vec::new();
            for line in engine.sequence.lines() {
                let _ = program.push(line.clone());
            }
            SEQUENCE_EXPORT.signal(program);
            Ok(())
        }
        SequenceCommand::Start { loop_mode } => engine.cmd_sequence_start(loop_mode),
        SequenceCommand::Stop => {
            drain_events(engine.cmd_sequence_stop());
            Ok(())
        }
    }
}

/// Forward events produced synchronously by a command.
fn drain_events(events: glissade_core::engine::Events) {
    for event in events {
        let _ = EVENT_CHANNEL.try_send(event);
    }
}
