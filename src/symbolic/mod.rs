//! Symbolic reasoning about variables and regular expressions
//!
//! Nothing here evaluates a request. Values are described by their shape
//! (a literal, a regex capture, a set of alternatives) so that detection
//! rules can ask whether user input could make a variable contain or start
//! with a given character.

pub mod builtins;
pub mod regexp;
pub mod variable;

pub use regexp::{capture_groups, Capture, Regexp, RegexpError};
pub use variable::{compile_script, compile_script_with, Variable, VariableValue};
