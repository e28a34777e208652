//! Overload resolution by operation name and runtime argument types.
//!
//! Overloads registered under one name are tried in declaration order and the
//! first structural match wins. This is NOT most-specific-type resolution: a
//! `Number` overload declared before an `Int` overload shadows it for integer
//! arguments. Only the first two positional arguments take part in matching.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::descriptor::OperationDescriptor;
use crate::error::ResolveError;
use crate::types::Value;

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Collapses a call whose first argument is `Null` to a call without
/// arguments, so "invoke with none" and "invoke with nothing" are the same.
#[must_use]
pub fn normalize_arguments(arguments: &[Value]) -> &[Value] {
    match arguments.first() {
        Some(Value::Null) => &[],
        _ => arguments,
    }
}

/// Whether `operation` accepts the (normalized) `arguments`.
#[must_use]
pub fn matches(operation: &OperationDescriptor, arguments: &[Value]) -> bool {
    let Some(first) = arguments.first() else {
        return operation.parameter_type().is_void();
    };
    if !operation.parameter_type().accepts(first) {
        return false;
    }
    match arguments.get(1) {
        None => true,
        Some(second) => match operation.extra_parameter_types().first() {
            None => second.is_null(),
            Some(extra) => extra.accepts(second),
        },
    }
}

// ---------------------------------------------------------------------------
// OperationTable
// ---------------------------------------------------------------------------

/// Operations of one service indexed by name, overloads in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: Vec<OperationDescriptor>,
    by_name: HashMap<String, Vec<usize>>,
    names: Vec<String>,
}

impl OperationTable {
    #[must_use]
    pub fn new(operations: impl IntoIterator<Item = OperationDescriptor>) -> Self {
        let mut table = Self::default();
        for operation in operations {
            let index = table.operations.len();
            let name = operation.name().to_string();
            let indexes = table.by_name.entry(name.clone()).or_default();
            if indexes.is_empty() {
                table.names.push(name);
            }
            indexes.push(index);
            table.operations.push(operation);
        }
        table
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Distinct operation names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// All operations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }

    /// Overloads registered under `name`, in declaration order.
    pub fn overloads<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a OperationDescriptor> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|&index| &self.operations[index])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Selects the first overload of `name` that accepts `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::OperationNotFound`] if nothing is registered
    /// under `name`, and [`ResolveError::OperationParameterMismatch`] (position
    /// 0) if no overload accepts the arguments.
    pub fn resolve(
        &self,
        name: &str,
        arguments: &[Value],
    ) -> Result<&OperationDescriptor, ResolveError> {
        if !self.contains(name) {
            return Err(ResolveError::OperationNotFound {
                operation: name.to_string(),
            });
        }
        let arguments = normalize_arguments(arguments);
        let resolved = self.overloads(name).find(|operation| matches(operation, arguments));
        match resolved {
            Some(operation) => {
                trace!(operation = %operation, arguments = arguments.len(), "resolved overload");
                Ok(operation)
            }
            None => Err(ResolveError::OperationParameterMismatch {
                operation: name.to_string(),
                position: 0,
            }),
        }
    }
}

impl FromIterator<OperationDescriptor> for OperationTable {
    fn from_iter<T: IntoIterator<Item = OperationDescriptor>>(iter: T) -> Self {
        Self::new(iter)
    }
}

// ---------------------------------------------------------------------------
// Arity
// ---------------------------------------------------------------------------

/// What to do with arguments beyond the resolved operation's declared arity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArityPolicy {
    /// Trailing `Null`s are dropped; any other surplus argument is a mismatch.
    #[default]
    Strict,
    /// Surplus arguments are dropped.
    Truncate,
}

/// Arguments trimmed to the resolved operation's arity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedArguments<'a> {
    pub arguments: &'a [Value],
    /// Number of surplus arguments that were dropped.
    pub dropped: usize,
}

/// Trims `arguments` to what `operation` declares, according to `policy`.
///
/// # Errors
///
/// Under [`ArityPolicy::Strict`], returns
/// [`ResolveError::OperationParameterMismatch`] carrying the position of the
/// first non-null surplus argument.
pub fn fit_arguments<'a>(
    operation: &OperationDescriptor,
    arguments: &'a [Value],
    policy: ArityPolicy,
) -> Result<FittedArguments<'a>, ResolveError> {
    let arguments = normalize_arguments(arguments);
    let arity = operation.arity();
    if arguments.len() <= arity {
        return Ok(FittedArguments {
            arguments,
            dropped: 0,
        });
    }
    let (kept, surplus) = arguments.split_at(arity);
    if policy == ArityPolicy::Strict {
        if let Some(offset) = surplus.iter().position(|value| !value.is_null()) {
            return Err(ResolveError::OperationParameterMismatch {
                operation: operation.name().to_string(),
                position: arity + offset,
            });
        }
    }
    Ok(FittedArguments {
        arguments: kept,
        dropped: surplus.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
