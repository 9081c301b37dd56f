//! # Cadence Core Library
//!
//! Tick-driven control loop framework for robot programs. Provides the
//! startup wiring engine (declare components and injectables by name,
//! resolve and wire everything before the first tick), a lifecycle driver
//! that executes the component graph at a fixed cadence with per-component
//! fault isolation, and a finite state machine executor with drift-free
//! timed transitions.
//!
//! ## Lifecycle
//!
//! 1. **Declare** — `CycleDriverBuilder`: injectables and components.
//! 2. **Create** — `CycleDriver::create_components()`: resolve, wire,
//!    initialise tunables, `setup()`. Any failure aborts startup.
//! 3. **Tick** — `CycleDriver::run_tick()` at `control_loop_period`:
//!    tunable refresh, `execute()`, reset-cell restore, feedback publish.
//!
//! ## External boundaries
//!
//! Time, telemetry and error reporting are traits (`Clock`, `Telemetry`,
//! `ErrorSink`) with in-memory doubles, so the whole framework runs
//! deterministically under test.

pub mod clock;
pub mod component;
pub mod config;
pub mod cycle;
pub mod fsm;
pub mod inject;
pub mod report;
pub mod reset;
pub mod telemetry;
pub mod tunable;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use component::{Component, Feedback, TickContext, TickFault, TickResult, Wired};
pub use config::{ConfigError, CoreConfig, load_config, load_config_from_str};
pub use cycle::{ContractError, CycleDriver, CycleDriverBuilder, CycleStats, Mode, StartupError};
pub use fsm::{MachineConfigError, MachineCtl, MachineLogic, State, StateMachine, StateTiming};
pub use inject::{Bindings, FieldRequest, Injectable, InjectablePool, InjectionError};
pub use report::{ErrorSink, MemorySink, TracingSink};
pub use reset::{ResetCell, Resettable};
pub use telemetry::{MemoryTelemetry, NullTelemetry, Telemetry, Value};
pub use tunable::{Tunable, TunableCell};
