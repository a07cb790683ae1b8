use crate::error::EngineError;
use crate::expr::{compile_expression, Bytecode, VM};
use nalgebra::DMatrix;
use std::fmt;

/// An equation definition: either a textual expression over the free
/// variables `x` and `y`, or an opaque native callable of the same shape.
///
/// Textual definitions that do not parse fail with `InvalidArgument` at
/// every entry point, before any stepping or integration begins.
pub enum Definition {
    /// A textual expression, e.g. `"x - y"` or `"sin(x)*y"`.
    Expression(String),
    /// A native two-argument numeric function.
    Native(Box<dyn Fn(f64, f64) -> f64>),
}

impl Definition {
    pub fn expression(text: impl Into<String>) -> Self {
        Definition::Expression(text.into())
    }

    pub fn native(func: impl Fn(f64, f64) -> f64 + 'static) -> Self {
        Definition::Native(Box::new(func))
    }

    /// Resolves the polymorphic shape into an evaluatable form.
    ///
    /// Called once per entry-point invocation; the compiled form is not
    /// cached across calls, so every invocation re-validates its input.
    pub(crate) fn resolve(&self) -> Result<Compiled<'_>, EngineError> {
        match self {
            Definition::Expression(text) => Ok(Compiled::Bytecode(compile_expression(text)?)),
            Definition::Native(func) => Ok(Compiled::Native(func.as_ref())),
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Expression(text) => f.debug_tuple("Expression").field(text).finish(),
            Definition::Native(_) => f.write_str("Native(..)"),
        }
    }
}

impl From<&str> for Definition {
    fn from(text: &str) -> Self {
        Definition::Expression(text.to_string())
    }
}

impl From<String> for Definition {
    fn from(text: String) -> Self {
        Definition::Expression(text)
    }
}

/// A resolved definition, ready for repeated evaluation.
pub(crate) enum Compiled<'a> {
    Bytecode(Bytecode),
    Native(&'a dyn Fn(f64, f64) -> f64),
}

impl Compiled<'_> {
    /// Checked scalar evaluation, used at every trajectory step.
    ///
    /// A native callable cannot raise, so a non-finite return value plays
    /// the role of the singularity signal there.
    pub fn eval_scalar(&self, x: f64, y: f64, stack: &mut Vec<f64>) -> Result<f64, EngineError> {
        match self {
            Compiled::Bytecode(bytecode) => VM::execute_scalar(bytecode, x, y, stack),
            Compiled::Native(func) => {
                let value = func(x, y);
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(EngineError::DomainError(format!(
                        "native definition returned non-finite value at ({x}, {y})"
                    )))
                }
            }
        }
    }

    /// Broadcast evaluation over a whole lattice; never errors.
    pub fn eval_grid(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> DMatrix<f64> {
        match self {
            Compiled::Bytecode(bytecode) => VM::execute_grid(bytecode, x, y),
            Compiled::Native(func) => x.zip_map(y, |p, q| func(p, q)),
        }
    }
}

/// Evaluates a definition at a single point. This is the adapter call every
/// other entry point goes through; grid sampling uses [`evaluate_over_grid`]
/// for the array-broadcast form.
///
/// [`evaluate_over_grid`]: crate::grid::evaluate_over_grid
pub fn evaluate(definition: &Definition, x: f64, y: f64) -> Result<f64, EngineError> {
    let compiled = definition.resolve()?;
    let mut stack = Vec::with_capacity(16);
    compiled.eval_scalar(x, y, &mut stack)
}
