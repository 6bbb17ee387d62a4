//! Fetch Actor
//!
//! This example loads data through an invoked promise actor and retries on
//! failure.
//!
//! Key concepts:
//! - Invoking a promise actor on state entry
//! - `on_done` / `on_error` transitions with data from the actor
//! - Guards that read the context
//! - Running an interpreter in a tokio task via `spawn`
//!
//! Run with: cargo run --example fetch_actor

use harel::actor::ActorLogic;
use harel::builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
use harel::core::Event;
use harel::effects::Action;
use harel::interpreter::Interpreter;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
struct Fetch {
    attempts: u32,
    user: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Fetch Actor ===\n");

    // The first two calls fail, the third succeeds.
    let calls = Arc::new(AtomicU32::new(0));
    let api = ActorLogic::promise(move |input: Value| {
        let calls = Arc::clone(&calls);
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < 3 {
                Err(format!("call {call} timed out"))
            } else {
                Ok(json!({ "name": format!("user-{}", input["id"]) }))
            }
        }
    });

    let machine = MachineBuilder::new("fetch")
        .context(Fetch::default())
        .initial("loading")
        .state(
            StateBuilder::new("loading")
                .entry(Action::assign(|fetch: &Fetch, _| Fetch {
                    attempts: fetch.attempts + 1,
                    ..fetch.clone()
                }))
                .invoke(
                    InvokeBuilder::new(api)
                        .id("api")
                        .input(|_: &Fetch, _: &Event| json!({ "id": 42 }))
                        .on_done(TransitionBuilder::to("success").action(Action::assign(
                            |fetch: &Fetch, event: &Event| Fetch {
                                user: event.get("name").and_then(Value::as_str).map(str::to_string),
                                ..fetch.clone()
                            },
                        )))
                        .on_error(
                            TransitionBuilder::to("loading")
                                .reenter()
                                .when(|fetch: &Fetch, _| fetch.attempts < 5)
                                .action(Action::log_with(|_: &Fetch, event: &Event| {
                                    format!("retrying after: {}", event.data())
                                })),
                        )
                        .on_error("failure"),
                ),
        )
        .state(StateBuilder::new("success").final_state())
        .state(StateBuilder::new("failure").final_state())
        .output(|fetch: &Fetch, _| json!({ "user": fetch.user, "attempts": fetch.attempts }))
        .build()
        .expect("fetch definition is valid");

    let (handle, task) = Interpreter::new(machine).spawn();
    let done = handle
        .wait_for(|snapshot| snapshot.is_done())
        .await
        .expect("fetch finishes");

    println!("Output: {}", done.output().cloned().unwrap_or(Value::Null));
    let last = task.await.expect("task ends cleanly");
    println!("Final status: {:?}", last.status());
}
