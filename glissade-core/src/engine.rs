//! The motion engine aggregate
//!
//! Owns every subsystem by value: hardware capabilities, shared state, the
//! five controllers and the sequence executor. `process()` is the only entry
//! point from the motion loop; command methods are called by the platform's
//! command task under the motion mutex. Controllers return typed events and
//! the engine dispatches them (sequencer advancement, persistence triggers),
//! so no controller ever calls into another.

use heapless::Vec;
use rand::{rngs::SmallRng, SeedableRng};

use crate::calibration::CalibrationManager;
use crate::config::hardware::SEQUENCE_POSITIONING_SPEED_LEVEL;
use crate::config::{
    ChaosRuntimeConfig, CyclePauseConfig, OscillationConfig, SystemConfig, ZoneEffectConfig,
};
use crate::motion::chaos::ChaosController;
use crate::motion::math::steps_to_mm;
use crate::motion::oscillation::OscillationController;
use crate::motion::pursuit::PursuitController;
use crate::motion::vaet::VaetController;
use crate::sequence::{SeqAction, SequenceExecutor, SequenceLine};
use crate::state::{EngineEvent, ExecutionContext, MovementType, SystemState};
use crate::stats::StatsTracking;
use crate::status::{ChaosStatus, OscillationStatus, SequenceStatus, StatusSnapshot};
use crate::traits::{Clock, ContactProbe, StepPulser};

/// Events produced by one engine tick
pub type Events = Vec<EngineEvent, 4>;

/// Typed command rejection, formatted into a user message by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Travel not discovered yet; calibration was triggered instead
    NotCalibrated,
    /// Sticky error state; return-to-start or recalibration required
    SystemInError,
    /// System state does not accept a start
    NotReady,
    /// Start position at or beyond the maximum travel
    StartPositionTooFar,
    /// center ± amplitude leaves the usable travel
    AmplitudeOutOfRange,
    /// Chaos cannot start with every pattern disabled
    NoPatternsEnabled,
    /// Sequence has no enabled lines
    SequenceEmpty,
    /// Sequence program capacity exhausted
    SequenceFull,
    /// Line index outside the program
    LineOutOfRange,
}

/// The engine's hardware capabilities, owned by value
#[derive(Debug)]
pub struct Hardware<M, C, K> {
    pub motor: M,
    pub contacts: C,
    pub clock: K,
}

/// State shared by all controllers: system config, position, stats, RNG
#[derive(Debug)]
pub struct Shared {
    pub config: SystemConfig,
    /// Signed step counter, mutated only on the motion core
    pub current_step: i32,
    pub stats: StatsTracking,
    pub rng: SmallRng,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            config: SystemConfig::default(),
            current_step: 0,
            stats: StatsTracking::default(),
            rng: SmallRng::seed_from_u64(0x5EED_1A7E),
        }
    }
}

impl Shared {
    pub fn position_mm(&self) -> f32 {
        steps_to_mm(self.current_step)
    }
}

/// A movement start deferred behind an auto-triggered calibration
#[derive(Debug, Clone, Copy)]
enum PendingStart {
    Vaet { distance_mm: f32, level: f32 },
    Oscillation,
    Chaos,
}

/// The motion engine
pub struct MotionEngine<M, C, K> {
    pub hw: Hardware<M, C, K>,
    pub shared: Shared,
    pub vaet: VaetController,
    pub oscillation: OscillationController,
    pub chaos: ChaosController,
    pub pursuit: PursuitController,
    pub calibration: CalibrationManager,
    pub sequence: SequenceExecutor,
    movement: MovementType,
    /// Sequencer line-positioning preamble in progress
    seq_positioning: bool,
    pending_start: Option<PendingStart>,
}

impl<M: StepPulser, C: ContactProbe, K: Clock> MotionEngine<M, C, K> {
    pub fn new(motor: M, contacts: C, clock: K) -> Self {
        Self {
            hw: Hardware {
                motor,
                contacts,
                clock,
            },
            shared: Shared::default(),
            vaet: VaetController::default(),
            oscillation: OscillationController::default(),
            chaos: ChaosController::default(),
            pursuit: PursuitController::default(),
            calibration: CalibrationManager::default(),
            sequence: SequenceExecutor::default(),
            movement: MovementType::Vaet,
            seq_positioning: false,
            pending_start: None,
        }
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement
    }

    // ------------------------------------------------------------------
    // Per-tick dispatch
    // ------------------------------------------------------------------

    /// One motion-core tick: dispatch to the active controller, route its
    /// event, and let the sequencer advance.
    pub fn process(&mut self) -> Events {
        let mut events = Events::new();

        let event = match self.movement {
            MovementType::Vaet => self.vaet.process(&mut self.hw, &mut self.shared),
            MovementType::Oscillation => self.oscillation.process(&mut self.hw, &mut self.shared),
            MovementType::Chaos => self.chaos.process(&mut self.hw, &mut self.shared),
            MovementType::Pursuit => self.pursuit.process(&mut self.hw, &mut self.shared),
            MovementType::Calibration => self.calibration.process(&mut self.hw, &mut self.shared),
        };

        if let Some(e) = event {
            self.handle_event(e, &mut events);
        }

        if self.shared.config.context == ExecutionContext::Sequencer {
            self.advance_sequencer(event, &mut events);
        }

        events
    }

    fn handle_event(&mut self, event: EngineEvent, out: &mut Events) {
        let _ = out.push(event);

        match event {
            EngineEvent::CalibrationFinished { .. } => {
                self.movement = MovementType::Vaet;
                if let Some(pending) = self.pending_start.take() {
                    self.run_pending_start(pending);
                }
            }
            EngineEvent::OscillationFinished | EngineEvent::ChaosFinished => {
                if self.shared.config.context == ExecutionContext::Standalone {
                    self.oscillation.on_stop();
                    self.chaos.on_stop();
                    if matches!(
                        self.shared.config.state,
                        SystemState::Running | SystemState::Paused
                    ) {
                        self.shared.config.state = SystemState::Ready;
                    }
                    self.movement = MovementType::Vaet;
                    let _ = out.push(EngineEvent::PersistStats);
                }
            }
            EngineEvent::SafetyFault(_) => {
                // The faulting controller already latched the error state; a
                // running sequence cannot continue past it.
                self.sequence.stop();
                self.seq_positioning = false;
                self.shared.config.context = ExecutionContext::Standalone;
                self.pending_start = None;
            }
            _ => {}
        }
    }

    fn run_pending_start(&mut self, pending: PendingStart) {
        match pending {
            PendingStart::Vaet { distance_mm, level } => {
                let _ = self.cmd_start(distance_mm, level);
            }
            PendingStart::Oscillation => {
                let _ = self.cmd_start_oscillation();
            }
            PendingStart::Chaos => {
                let _ = self.cmd_start_chaos();
            }
        }
    }

    // ------------------------------------------------------------------
    // Sequencer wiring
    // ------------------------------------------------------------------

    fn advance_sequencer(&mut self, dispatch_event: Option<EngineEvent>, out: &mut Events) {
        if !self.sequence.is_running() {
            return;
        }
        let now_ms = self.hw.clock.now_ms();

        let mut action = None;
        if self.seq_positioning && self.pursuit.at_target(&self.shared) {
            self.seq_positioning = false;
            action = self.sequence.on_position_reached();
        }

        if action.is_none() {
            if let Some(e) = dispatch_event {
                if e.completes_movement() {
                    // Oscillation and chaos completions stop their controller;
                    // plain cycle completions keep it running.
                    let stopped = !matches!(e, EngineEvent::MovementComplete);
                    action = self.sequence.on_movement_complete(now_ms, stopped);
                }
            }
        }

        if action.is_none() {
            action = self.sequence.tick(now_ms);
        }

        if let Some(a) = action {
            self.execute_seq_action(a, out);
        }
    }

    fn execute_seq_action(&mut self, action: SeqAction, out: &mut Events) {
        match action {
            SeqAction::PositionTo { target_mm } => {
                self.stop_active_controller();
                self.movement = MovementType::Pursuit;
                self.shared.config.state = SystemState::Running;
                if self
                    .pursuit
                    .set_target(
                        &mut self.shared,
                        target_mm,
                        SEQUENCE_POSITIONING_SPEED_LEVEL,
                    )
                    .is_ok()
                {
                    self.seq_positioning = true;
                } else {
                    self.abort_sequence(out);
                }
            }
            SeqAction::StartLine { index } => {
                let line = self.sequence.lines().get(index).cloned();
                match line {
                    Some(line) if self.start_line(&line).is_ok() => {}
                    _ => self.abort_sequence(out),
                }
            }
            SeqAction::LineDone => {
                self.stop_active_controller();
            }
            SeqAction::Finished => {
                self.stop_active_controller();
                self.shared.config.context = ExecutionContext::Standalone;
                if self.shared.config.state == SystemState::Running {
                    self.shared.config.state = SystemState::Ready;
                }
                self.movement = MovementType::Vaet;
                let _ = out.push(EngineEvent::SequenceFinished);
                let _ = out.push(EngineEvent::PersistStats);
            }
        }
    }

    /// Configure and start the controller for a sequence line.
    fn start_line(&mut self, line: &SequenceLine) -> Result<(), CommandError> {
        match line.movement_type {
            MovementType::Vaet => {
                self.vaet.motion.start_position_mm = line.start_position_mm;
                self.vaet.motion.cycle_pause = line.vaet_cycle_pause;
                self.vaet.set_zone_effect(line.vaet_zone_effect);
                self.movement = MovementType::Vaet;
                self.vaet.start(
                    &mut self.hw,
                    &mut self.shared,
                    line.distance_mm,
                    line.speed_forward,
                    line.speed_backward,
                )
            }
            MovementType::Oscillation => {
                let mut config = line.oscillation.clone();
                // The sequencer counts cycles; the controller runs freely.
                config.cycle_count = 0;
                config.return_to_center = false;
                let now_ms = self.hw.clock.now_ms();
                self.oscillation
                    .set_config(&self.shared, config, now_ms, false)?;
                self.movement = MovementType::Oscillation;
                self.oscillation.start(&mut self.hw, &mut self.shared)
            }
            MovementType::Chaos => {
                self.chaos.config = line.chaos.clone();
                self.movement = MovementType::Chaos;
                self.chaos.start(&mut self.hw, &mut self.shared)
            }
            _ => Err(CommandError::LineOutOfRange),
        }
    }

    fn abort_sequence(&mut self, out: &mut Events) {
        self.sequence.stop();
        self.seq_positioning = false;
        self.stop_active_controller();
        self.shared.config.context = ExecutionContext::Standalone;
        if self.shared.config.state == SystemState::Running {
            self.shared.config.state = SystemState::Ready;
        }
        self.movement = MovementType::Vaet;
        let _ = out.push(EngineEvent::SequenceFinished);
    }

    // ------------------------------------------------------------------
    // Movement selection helpers
    // ------------------------------------------------------------------

    fn stop_active_controller(&mut self) {
        self.vaet.on_stop();
        self.oscillation.on_stop();
        self.chaos.on_stop();
        self.pursuit.on_stop();
    }

    /// Supervised movement switch: the previous mode's transient state is
    /// dropped before the new one starts.
    fn select_movement(&mut self, movement: MovementType) {
        if self.movement != movement {
            self.stop_active_controller();
            self.movement = movement;
        }
    }

    /// A standalone start from the user preempts any running sequence.
    fn user_preempts_sequence(&mut self) {
        if self.sequence.is_running() {
            self.sequence.stop();
            self.seq_positioning = false;
            self.stop_active_controller();
        }
        self.shared.config.context = ExecutionContext::Standalone;
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Start the back-and-forth movement. Auto-triggers calibration when the
    /// travel is unknown and replays the start once it completes.
    pub fn cmd_start(&mut self, distance_mm: f32, level: f32) -> Result<(), CommandError> {
        self.user_preempts_sequence();

        if !self.shared.config.is_calibrated() {
            self.pending_start = Some(PendingStart::Vaet { distance_mm, level });
            self.begin_calibration();
            return Err(CommandError::NotCalibrated);
        }

        self.select_movement(MovementType::Vaet);
        self.vaet
            .start(&mut self.hw, &mut self.shared, distance_mm, level, level)
    }

    /// Supervisor stop: controllers observe the state change on their next
    /// tick; the motor stays enabled so the closed-loop driver keeps sync.
    pub fn cmd_stop(&mut self) -> Events {
        let mut events = Events::new();
        self.sequence.stop();
        self.seq_positioning = false;
        self.pending_start = None;
        self.stop_active_controller();
        self.shared.config.context = ExecutionContext::Standalone;

        if matches!(
            self.shared.config.state,
            SystemState::Running | SystemState::Paused
        ) {
            self.shared.config.state = SystemState::Ready;
            let _ = events.push(EngineEvent::PersistStats);
        }
        self.movement = MovementType::Vaet;
        events
    }

    /// Toggle between running and paused. Entering pause persists stats;
    /// leaving it freezes the oscillation phase clock to avoid a jerk.
    pub fn cmd_toggle_pause(&mut self) -> Option<EngineEvent> {
        match self.shared.config.state {
            SystemState::Running => {
                self.shared.config.state = SystemState::Paused;
                Some(EngineEvent::PersistStats)
            }
            SystemState::Paused => {
                self.shared.config.state = SystemState::Running;
                if self.movement == MovementType::Oscillation {
                    let now_ms = self.hw.clock.now_ms();
                    self.oscillation.freeze_phase(now_ms);
                }
                None
            }
            _ => None,
        }
    }

    pub fn cmd_set_distance(&mut self, distance_mm: f32) -> bool {
        self.vaet.set_distance(&self.shared, distance_mm)
    }

    pub fn cmd_set_start_position(&mut self, start_mm: f32) -> bool {
        self.vaet.set_start_position(&self.shared, start_mm)
    }

    pub fn cmd_set_speed_forward(&mut self, level: f32) {
        self.vaet.set_speed_forward(&self.shared, level);
    }

    pub fn cmd_set_speed_backward(&mut self, level: f32) {
        self.vaet.set_speed_backward(&self.shared, level);
    }

    /// Update the cycle pause for the given mode.
    pub fn cmd_set_cycle_pause(&mut self, mode: MovementType, config: CyclePauseConfig) {
        match mode {
            MovementType::Oscillation => self.oscillation.set_cycle_pause(config),
            _ => self.vaet.set_cycle_pause(config),
        }
    }

    pub fn cmd_set_zone_effect(&mut self, config: ZoneEffectConfig) -> bool {
        self.vaet.set_zone_effect(config)
    }

    /// Stage the oscillation configuration. Applies smoothly when
    /// oscillation is live.
    pub fn cmd_set_oscillation(&mut self, config: OscillationConfig) -> Result<(), CommandError> {
        let live = self.movement == MovementType::Oscillation
            && matches!(
                self.shared.config.state,
                SystemState::Running | SystemState::Paused
            );
        let now_ms = self.hw.clock.now_ms();
        self.oscillation
            .set_config(&self.shared, config, now_ms, live)
    }

    pub fn cmd_start_oscillation(&mut self) -> Result<(), CommandError> {
        self.user_preempts_sequence();

        if !self.shared.config.is_calibrated() {
            self.pending_start = Some(PendingStart::Oscillation);
            self.begin_calibration();
            return Err(CommandError::NotCalibrated);
        }

        self.select_movement(MovementType::Oscillation);
        self.oscillation.start(&mut self.hw, &mut self.shared)
    }

    pub fn cmd_set_chaos(&mut self, config: ChaosRuntimeConfig) {
        self.chaos.config = config;
    }

    pub fn cmd_start_chaos(&mut self) -> Result<(), CommandError> {
        self.user_preempts_sequence();

        if !self.shared.config.is_calibrated() {
            self.pending_start = Some(PendingStart::Chaos);
            self.begin_calibration();
            return Err(CommandError::NotCalibrated);
        }

        self.select_movement(MovementType::Chaos);
        self.chaos.start(&mut self.hw, &mut self.shared)
    }

    /// Real-time pursuit target from the command stream.
    pub fn cmd_pursuit_move(
        &mut self,
        target_mm: f32,
        max_level: f32,
    ) -> Result<(), CommandError> {
        self.user_preempts_sequence();

        if !self.shared.config.state.accepts_start() {
            return Err(if self.shared.config.state.is_error() {
                CommandError::SystemInError
            } else {
                CommandError::NotReady
            });
        }

        self.select_movement(MovementType::Pursuit);
        self.pursuit
            .set_target(&mut self.shared, target_mm, max_level)?;
        self.hw.motor.enable();
        self.shared.config.state = SystemState::Running;
        Ok(())
    }

    /// Full travel discovery.
    pub fn cmd_calibrate(&mut self) -> Events {
        let events = self.cmd_stop();
        self.begin_calibration();
        events
    }

    /// Home to position 0. Recovers from the error state.
    pub fn cmd_return_to_start(&mut self) -> Events {
        let events = self.cmd_stop();
        self.select_movement(MovementType::Calibration);
        self.calibration
            .start_return_to_start(&mut self.hw, &mut self.shared);
        events
    }

    fn begin_calibration(&mut self) {
        self.select_movement(MovementType::Calibration);
        self.calibration.start_full(&mut self.hw, &mut self.shared);
    }

    /// Start the sequence program.
    pub fn cmd_sequence_start(&mut self, loop_mode: bool) -> Result<(), CommandError> {
        if !self.shared.config.is_calibrated() {
            return Err(CommandError::NotCalibrated);
        }
        if self.shared.config.state.is_error() {
            return Err(CommandError::SystemInError);
        }

        let action = self.sequence.start(loop_mode)?;
        self.shared.config.context = ExecutionContext::Sequencer;
        self.shared.config.state = SystemState::Running;
        self.hw.motor.enable();

        let mut events = Events::new();
        self.execute_seq_action(action, &mut events);
        Ok(())
    }

    pub fn cmd_sequence_stop(&mut self) -> Events {
        self.cmd_stop()
    }

    // ------------------------------------------------------------------
    // Telemetry
    // ------------------------------------------------------------------

    /// Assemble a status snapshot. Called under the motion mutex.
    pub fn snapshot(&self) -> StatusSnapshot {
        let seq_state = self.sequence.state();
        StatusSnapshot {
            system_state: self.shared.config.state,
            movement_type: self.movement,
            execution_context: self.shared.config.context,
            current_position_mm: self.shared.position_mm(),
            current_step: self.shared.current_step,
            total_distance_mm: self.shared.config.total_distance_mm,
            effective_max_distance_mm: self.shared.config.effective_max_distance_mm(),
            motion: self.vaet.motion.clone(),
            oscillation: OscillationStatus {
                completed_cycles: self.oscillation.completed_cycles(),
                is_ramping_in: self.oscillation.is_ramping_in(),
                is_ramping_out: self.oscillation.is_ramping_out(),
                is_pausing: self.oscillation.is_pausing(),
            },
            chaos: ChaosStatus {
                current_pattern: self.chaos.current_pattern(),
                patterns_executed: self.chaos.patterns_executed(),
                min_reached_mm: self.chaos.min_reached_mm(),
                max_reached_mm: self.chaos.max_reached_mm(),
            },
            sequence: SequenceStatus {
                is_running: seq_state.is_running,
                is_loop_mode: seq_state.is_loop_mode,
                current_line_index: seq_state.current_line_index,
                loop_count: seq_state.loop_count,
            },
            stats_total_steps: self.shared.stats.total_distance_steps,
        }
    }
}

// ----------------------------------------------------------------------
// Test support: a simulated axis behind the hardware traits
// ----------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testkit {
    use core::cell::Cell;
    use std::rc::Rc;

    use super::Hardware;
    use crate::state::EngineEvent;
    use crate::traits::{Clock, ContactProbe, StepPulser};

    /// Simulated axis: physical step position plus contact-free travel span.
    /// Contacts sit just beyond [0, travel]: start active below 0, end
    /// active above `travel`.
    #[derive(Debug)]
    pub struct AxisSim {
        pub physical: Cell<i32>,
        pub travel: i32,
    }

    pub struct FakeMotor {
        axis: Rc<AxisSim>,
        forward: bool,
        enabled: bool,
        pub steps_emitted: u64,
    }

    impl StepPulser for FakeMotor {
        fn step(&mut self) {
            let delta = if self.forward { 1 } else { -1 };
            self.axis.physical.set(self.axis.physical.get() + delta);
            self.steps_emitted += 1;
        }

        fn set_direction(&mut self, forward: bool) {
            self.forward = forward;
        }

        fn direction(&self) -> bool {
            self.forward
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    pub struct FakeContacts {
        axis: Rc<AxisSim>,
        forced_start: Option<bool>,
        forced_end: Option<bool>,
    }

    impl FakeContacts {
        /// Short-circuit (true) or release (false → back to simulation) the
        /// end contact.
        pub fn force_end(&mut self, pressed: bool) {
            self.forced_end = pressed.then_some(true);
        }

        pub fn force_start(&mut self, pressed: bool) {
            self.forced_start = pressed.then_some(true);
        }
    }

    impl ContactProbe for FakeContacts {
        fn start_raw(&mut self) -> bool {
            self.forced_start
                .unwrap_or(self.axis.physical.get() < 0)
        }

        fn end_raw(&mut self) -> bool {
            self.forced_end
                .unwrap_or(self.axis.physical.get() > self.axis.travel)
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    /// Manually advanced microsecond clock.
    pub struct FakeClock {
        now_us: Cell<u64>,
    }

    impl Clock for FakeClock {
        fn now_us(&self) -> u64 {
            self.now_us.get()
        }
    }

    pub type FakeHardware = Hardware<FakeMotor, FakeContacts, FakeClock>;

    impl FakeHardware {
        /// Build a simulated axis with `travel` contact-free steps, the
        /// carriage starting at `physical` steps.
        pub fn with_travel(travel: i32, physical: i32) -> Self {
            let axis = Rc::new(AxisSim {
                physical: Cell::new(physical),
                travel,
            });
            Hardware {
                motor: FakeMotor {
                    axis: Rc::clone(&axis),
                    forward: true,
                    enabled: false,
                    steps_emitted: 0,
                },
                contacts: FakeContacts {
                    axis,
                    forced_start: None,
                    forced_end: None,
                },
                clock: FakeClock {
                    now_us: Cell::new(1),
                },
            }
        }

        pub fn advance_us(&mut self, us: u64) {
            self.clock.now_us.set(self.clock.now_us.get() + us);
        }

        pub fn physical_step(&self) -> i32 {
            self.motor.axis.physical.get()
        }
    }

    /// Drive a closure until it yields an event or the budget runs out.
    pub fn run_until<F>(max_iterations: usize, mut f: F) -> Option<EngineEvent>
    where
        F: FnMut() -> Option<EngineEvent>,
    {
        for _ in 0..max_iterations {
            if let Some(event) = f() {
                return Some(event);
            }
        }
        None
    }
}
