use thiserror::Error;

use super::value::ValueKind;

/// Fatal conditions raised while executing a program. Each one aborts the
/// current run; only a self-referential `VariableNotFound` during assignment
/// is recovered by the evaluator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },

    #[error("Variable name must be string. Found: {found}")]
    VariableNameMustBeString { found: ValueKind },

    #[error("The variable is not an array: {name}")]
    ExpectedArrayNotFound { name: String },

    #[error("Illegal array key type: {found}")]
    InvalidArrayKey { found: ValueKind },

    #[error("No class definition found: {name}")]
    ClassDefinitionNotFound { name: String },

    #[error("Cannot redeclare class {name}")]
    ClassRedeclared { name: String },

    #[error("Function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("Call to undefined method {class}::{name}()")]
    MethodNotFound { class: String, name: String },

    #[error("Function {function}( ) expecting {expected} arguments, but only found {found}.")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Cannot redeclare {name}")]
    FunctionRedeclared { name: String },

    #[error("Function name must be string. Found: {found}")]
    FunctionNameMustBeString { found: ValueKind },

    #[error("The target of an invocation must be an object. Found: {found}")]
    InvocationTargetInvalid { found: String },

    #[error("The target of the variable access was not an object.")]
    FetchTargetInvalid,

    #[error("Call to a restricted member: {member}")]
    MemberNotVisible { member: String },

    #[error(
        "Initialization value for attributes must be constant expressions. \
         A non-constant expression was used for \"{attribute}\" in \"{class}\""
    )]
    NonConstantAttributeInit { attribute: String, class: String },

    #[error("Cannot redeclare $this")]
    ThisRedeclaration,

    #[error("Inheritance not yet supported: cannot access protected {class}::{member} from {invoker}")]
    InheritanceUnsupported {
        invoker: String,
        class: String,
        member: String,
    },

    #[error("Unsupported operand type {found} for '{op}'")]
    UnsupportedOperand { op: String, found: ValueKind },
}

impl RuntimeError {
    /// True when this is the lookup failure for exactly `name`; the one case
    /// assignment recovers from.
    pub fn is_missing_variable(&self, name: &str) -> bool {
        matches!(self, RuntimeError::VariableNotFound { name: missing } if missing == name)
    }
}
