//! Variable substitution for action parameters

mod resolver;

pub use resolver::{VariableError, VariablePolicy, VariableResolver};
