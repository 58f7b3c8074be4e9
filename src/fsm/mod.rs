//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  StateTable (indexed by wire ordinal)                         │
//! │  ┌───┬────────────────────┬──────────┬─────────┬───────────┐  │
//! │  │ # │ ControllerState    │ on_enter │ on_exit │ on_update │  │
//! │  ├───┼────────────────────┼──────────┼─────────┼───────────┤  │
//! │  │ 0 │ PowerOff           │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  │ 1 │ PoweredOn          │    -     │    -    │ fn -> Opt │  │
//! │  │ 2 │ EStopWait          │    -     │    -    │ fn -> Opt │  │
//! │  │ 3 │ Precharging        │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  │ 4 │ Discharging        │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  │ 5 │ ContactorOpening   │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  │ 6 │ ContactorClosing   │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  │ 7 │ ForwardDisableWait │ fn(ctx)  │    -    │ fn -> Opt │  │
//! │  └───┴────────────────────┴──────────┴─────────┴───────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  At most one transition happens per tick.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Controller states.  Discriminants are the ordinals carried in the
/// status record and must match the row order of
/// [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControllerState {
    PowerOff = 0,
    PoweredOn = 1,
    EStopWait = 2,
    Precharging = 3,
    Discharging = 4,
    ContactorOpening = 5,
    ContactorClosing = 6,
    ForwardDisableWait = 7,
}

impl ControllerState {
    /// Total number of states; sizes the table array.
    pub const COUNT: usize = 8;

    pub const ALL: [ControllerState; Self::COUNT] = [
        Self::PowerOff,
        Self::PoweredOn,
        Self::EStopWait,
        Self::Precharging,
        Self::Discharging,
        Self::ContactorOpening,
        Self::ContactorClosing,
        Self::ForwardDisableWait,
    ];

    /// Parse a wire ordinal.
    pub fn from_wire(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// Convert a table index back to a state.  Out-of-range indices assert
    /// in debug builds and fall back to `ForwardDisableWait` (the start of
    /// the teardown path) in release.
    pub fn from_index(idx: usize) -> Self {
        match Self::ALL.get(idx) {
            Some(state) => *state,
            None => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::ForwardDisableWait
            }
        }
    }

    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// The contactor is (or is about to be) closed in this state.
    pub fn bus_energised(self) -> bool {
        matches!(self, Self::ContactorClosing | Self::PoweredOn)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<ControllerState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor {
    pub id: ControllerState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
pub struct Fsm {
    table: [StateDescriptor; ControllerState::COUNT],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; ControllerState::COUNT], initial: ControllerState) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            if next_id as usize != self.current {
                self.transition(next_id, ctx);
            }
        }
    }

    /// Jump straight to `next`, running exit and entry actions.
    pub fn force_transition(&mut self, next: ControllerState, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> ControllerState {
        self.table[self.current].id
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    fn transition(&mut self, next_id: ControllerState, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.state_entered_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
