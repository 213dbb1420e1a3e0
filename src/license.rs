//! License/product-constraint boundary. Only the pass/fail contract is used.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operator::Operator;

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint: String,
    pub message: String,
}

impl Violation {
    pub fn new(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.constraint)
    }
}

pub trait LicenseEvaluator: Send + Sync {
    /// Violations for `operator`; empty means allowed.
    fn check_violations(&self, operator: &dyn Operator, only_enabled: bool) -> Vec<Violation>;
}

/// Evaluator that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl LicenseEvaluator for Unrestricted {
    fn check_violations(&self, _operator: &dyn Operator, _only_enabled: bool) -> Vec<Violation> {
        Vec::new()
    }
}
