//! Glissade - belt-driven linear actuator firmware
//!
//! Main firmware binary for the dual-core RP2040 controller. Core 1 is
//! dedicated to the motion engine (step generation, controller state
//! machines); core 0 runs the service side (command intake, telemetry,
//! persistence hand-off). The two sides talk exclusively through the static
//! channels in [`channels`], so the motion loop never blocks on the network.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Executor;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::multicore::{spawn_core1, Stack};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use glissade_core::engine::MotionEngine;

use crate::hw::clock::UptimeClock;
use crate::hw::contacts::GpioContacts;
use crate::hw::motor::GpioMotor;

mod channels;
mod hw;
mod tasks;

static mut CORE1_STACK: Stack<8192> = Stack::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("glissade firmware starting");

    let p = embassy_rp::init(Default::default());

    // Motor driver: STEP, DIR, ENABLE (active low, start disabled).
    let motor = GpioMotor::new(
        Output::new(p.PIN_2, Level::Low),
        Output::new(p.PIN_3, Level::High),
        Output::new(p.PIN_4, Level::High),
    );

    // Limit contacts: normally open, active low with internal pull-ups.
    let contacts = GpioContacts::new(
        Input::new(p.PIN_5, Pull::Up),
        Input::new(p.PIN_6, Pull::Up),
    );

    let engine = MotionEngine::new(motor, contacts, UptimeClock);

    // Motion core: a single non-preemptive loop owning the engine.
    #[allow(static_mut_refs)]
    spawn_core1(p.CORE1, unsafe { &mut CORE1_STACK }, move || {
        let executor1 = EXECUTOR1.init(Executor::new());
        executor1.run(|spawner| {
            unwrap!(spawner.spawn(tasks::motion::motion_task(engine)));
        });
    });

    // Service core: telemetry broadcast and command intake boundary.
    let executor0 = EXECUTOR0.init(Executor::new());
    executor0.run(|spawner| {
        unwrap!(spawner.spawn(tasks::telemetry::telemetry_task()));
        unwrap!(spawner.spawn(tasks::telemetry::event_task()));
    });
}
