//! Function-pointer state machine for subsystem bring-up.
//!
//! Classic embedded FSM pattern, one row per bring-up step:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StepTable                                                   │
//! │  ┌──────────────────────┬───────────┬───────────────────────┐ │
//! │  │ InitStep             │ on_enter  │ on_update             │ │
//! │  ├──────────────────────┼───────────┼───────────────────────┤ │
//! │  │ Start                │ fn(ctx)   │ fn(ctx) -> Transition │ │
//! │  │ InitQueuesCommands   │ fn(ctx)   │ fn(ctx) -> Transition │ │
//! │  │ ...                  │           │                       │ │
//! │  │ Error                │ fn(ctx)   │ fn(ctx) -> Transition │ │
//! │  └──────────────────────┴───────────┴───────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the current step and acts
//! on the returned [`Transition`]:
//!
//! - `Stay`: remain, try again next tick.
//! - `Next(step)`: move to `step`; it first runs on the next tick.
//! - `Immediate(step)`: move to `step` and run it in this same tick.
//!   Only returned after work that did not block.
//! - `Done(outcome)`: the sequence is over.  Further ticks are no-ops.

pub mod context;
pub mod states;

use context::InitContext;
use log::info;

// ---------------------------------------------------------------------------
// Step identity
// ---------------------------------------------------------------------------

/// Position in the bring-up sequence.
/// Must stay in sync with the table built in [`states::build_step_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InitStep {
    Start = 0,
    InitQueuesCommands = 1,
    StartNetworkInterface = 2,
    CreateDefaultEventLoop = 3,
    CreateIndication = 4,
    WaitOnIndication = 5,
    CreateWifi = 6,
    WaitOnWifi = 7,
    Finished = 8,
    Error = 9,
}

impl InitStep {
    /// Total number of steps, used to size the table array.
    pub const COUNT: usize = 10;
}

/// How the sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Every subsystem is up and the background timer is running.
    Succeeded,
    /// A step failed; the message is in the boot state.
    Failed,
}

/// Result of one `on_update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Next(InitStep),
    Immediate(InitStep),
    Done(BootOutcome),
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter`, run once each time a step is entered.
pub type StepActionFn<P> = fn(&mut InitContext<'_, P>);

/// Signature for the per-tick update handler.
pub type StepUpdateFn<P> = fn(&mut InitContext<'_, P>) -> Transition;

// ---------------------------------------------------------------------------
// Step descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single bring-up step.
pub struct StepDescriptor<P> {
    pub id: InitStep,
    pub name: &'static str,
    pub on_enter: Option<StepActionFn<P>>,
    pub on_update: StepUpdateFn<P>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The bring-up sequencer.
pub struct BootSequence<P> {
    /// Fixed-size table indexed by `InitStep as usize`.
    table: [StepDescriptor<P>; InitStep::COUNT],
    /// Index of the current step.
    current: usize,
    outcome: Option<BootOutcome>,
}

impl<P: crate::app::ports::Platform> BootSequence<P> {
    /// Construct a sequence over `table`, positioned at `Start`.
    ///
    /// Row `i` of the table must describe the step whose discriminant is
    /// `i`.
    pub fn new(table: [StepDescriptor<P>; InitStep::COUNT]) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, row)| row.id as usize == i),
            "step table out of order"
        );
        Self {
            table,
            current: InitStep::Start as usize,
            outcome: None,
        }
    }

    /// Advance by one tick.  Returns the outcome once the sequence is over.
    pub fn tick(&mut self, ctx: &mut InitContext<'_, P>) -> Option<BootOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }

        // Immediate transitions chain within the tick; the table is
        // forward-only so this cannot exceed one pass.
        for _ in 0..InitStep::COUNT {
            match (self.table[self.current].on_update)(ctx) {
                Transition::Stay => return None,
                Transition::Next(step) => {
                    self.enter(step, ctx);
                    return None;
                }
                Transition::Immediate(step) => self.enter(step, ctx),
                Transition::Done(outcome) => {
                    info!(
                        "BOOT: sequence done in {} ({:?})",
                        self.table[self.current].name, outcome
                    );
                    self.outcome = Some(outcome);
                    return self.outcome;
                }
            }
        }
        None
    }

    /// The current step's identity.
    pub fn current_step(&self) -> InitStep {
        self.table[self.current].id
    }

    pub fn outcome(&self) -> Option<BootOutcome> {
        self.outcome
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn enter(&mut self, step: InitStep, ctx: &mut InitContext<'_, P>) {
        let next_idx = step as usize;
        info!(
            "BOOT: {} -> {} (step {})",
            self.table[self.current].name, self.table[next_idx].name, next_idx
        );

        self.current = next_idx;
        ctx.note_entered(step);

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
