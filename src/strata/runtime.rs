//! Template runtime
//!
//!     [program] links compiled instructions into jump-resolved ops, [machine] executes
//!     them and [context] holds what a render sees: target, locals, output, escaping and
//!     the loader used for includes.

pub mod context;
pub(crate) mod machine;
pub mod program;

pub use context::{locals_from_json, Context, Locals, MissingVariablePolicy, Target};
pub use machine::MAX_INCLUDE_DEPTH;
pub use program::Program;
