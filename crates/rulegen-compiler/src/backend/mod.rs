//! Execution strategies.
//!
//! Both strategies share the class layout built by the
//! [`UnitBuilder`](crate::UnitBuilder) and differ only in the private methods
//! behind `execute0()`.

mod compiled;
mod interpreted;

use rulegen_core::{CompileCause, Strategy};

use crate::UnitBuilder;

pub use compiled::CompiledBackend;
pub use interpreted::InterpretedBackend;

/// Emits the strategy-specific methods of an adapter.
pub trait ExecutionBackend {
    /// The strategy implemented.
    fn strategy(&self) -> Strategy;

    /// Add `execute0()` and any methods it calls.
    fn emit(&self, unit: &mut UnitBuilder<'_>) -> Result<(), CompileCause>;
}

/// The backend for `strategy`.
pub fn for_strategy(strategy: Strategy) -> &'static dyn ExecutionBackend {
    match strategy {
        Strategy::Compiled => &CompiledBackend,
        Strategy::Interpreted => &InterpretedBackend,
    }
}
