//! Traffic Light
//!
//! This example drives a pedestrian-aware traffic light on simulated time.
//!
//! Key concepts:
//! - Delayed (`after`) transitions
//! - A nested compound state that completes through a final child
//! - Tags and state values on snapshots
//! - Deterministic time with `SimulatedClock`
//!
//! Run with: cargo run --example traffic_light

use harel::actor::SimulatedClock;
use harel::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
use harel::effects::Action;
use harel::interpreter::{Interpreter, InterpreterOptions, Snapshot};
use std::time::Duration;

#[derive(Clone, Debug, Default)]
struct Light {
    cycles: u32,
}

fn main() {
    println!("=== Traffic Light ===\n");

    let machine = MachineBuilder::new("light")
        .context(Light::default())
        .initial("green")
        .state(
            StateBuilder::new("green")
                .tag("go")
                .after(Duration::from_secs(30), "yellow"),
        )
        .state(
            StateBuilder::new("yellow")
                .tag("go")
                .after(Duration::from_secs(5), "red"),
        )
        .state(
            StateBuilder::new("red")
                .tag("stop")
                .state(StateBuilder::new("walk").after(Duration::from_secs(10), "wait"))
                .state(StateBuilder::new("wait").after(Duration::from_secs(5), "stop"))
                .state(StateBuilder::new("stop").final_state())
                .on_done(
                    TransitionBuilder::to("green").action(Action::assign(|light: &Light, _| Light {
                        cycles: light.cycles + 1,
                    })),
                ),
        )
        .build()
        .expect("traffic light definition is valid");

    let clock = SimulatedClock::new();
    let mut light = Interpreter::with_options(
        machine,
        InterpreterOptions::default().with_clock(clock.clone()),
    );
    light.subscribe(|snapshot: &Snapshot<Light>| {
        let signal = if snapshot.has_tag("go") { "go" } else { "stop" };
        println!("  {:<10} ({signal})", snapshot.value().to_string());
    });
    light.start().expect("light starts");

    for _ in 0..2 {
        for step in [30, 5, 10, 5] {
            clock.advance(Duration::from_secs(step));
            light.flush().expect("timers are processed");
        }
    }

    println!("\nCompleted {} cycles", light.context().cycles);
}
