#![allow(
    unfulfilled_lint_expectations,
    reason = "test lint expectations may not all trigger"
)]
#![expect(clippy::expect_used, reason = "test assertions")]
#![expect(clippy::let_underscore_must_use, reason = "scenario fixtures")]

//! Behaviour-driven tests for the interaction cool-down.

use render_stream::interaction::{DEFAULT_COOLDOWN, InteractionState, InteractionTracker};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::{
    runtime::{Builder, Runtime},
    time::{Duration, advance},
};

struct InteractionWorld {
    runtime: Runtime,
    tracker: InteractionTracker,
}

impl InteractionWorld {
    fn new() -> Self {
        Self {
            runtime: Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .expect("runtime"),
            tracker: InteractionTracker::new(DEFAULT_COOLDOWN),
        }
    }

    fn pass(&self, millis: u64) {
        self.runtime.block_on(async {
            advance(Duration::from_millis(millis)).await;
            tokio::task::yield_now().await;
        });
    }
}

#[fixture]
fn world() -> InteractionWorld { InteractionWorld::new() }

#[given("an idle interaction tracker")]
fn idle_tracker(world: &InteractionWorld) {
    assert_eq!(world.tracker.state(), InteractionState::Idle);
}

#[when("an interaction begins")]
fn begins(world: &InteractionWorld) { world.tracker.begin(); }

#[when("the interaction ends")]
fn ends(world: &InteractionWorld) { world.runtime.block_on(async { world.tracker.end() }); }

#[when("{millis:u64} milliseconds pass")]
fn time_passes(world: &InteractionWorld, millis: u64) { world.pass(millis); }

#[then("the tracker is cooling down")]
fn cooling_down(world: &InteractionWorld) {
    assert_eq!(world.tracker.state(), InteractionState::CoolingDown);
}

#[then("after {millis:u64} milliseconds the tracker is idle")]
fn idle_after(world: &InteractionWorld, millis: u64) {
    world.pass(millis.saturating_sub(1));
    assert_eq!(world.tracker.state(), InteractionState::CoolingDown);
    world.pass(1);
    assert_eq!(world.tracker.state(), InteractionState::Idle);
}

#[then("the tracker is interacting")]
fn interacting(world: &InteractionWorld) {
    assert_eq!(world.tracker.state(), InteractionState::Interacting);
}

#[scenario(path = "tests/features/interaction.feature", index = 0)]
fn cooldown_settles(world: InteractionWorld) { let _ = world; }

#[scenario(path = "tests/features/interaction.feature", index = 1)]
fn new_gesture_cancels_cooldown(world: InteractionWorld) { let _ = world; }
