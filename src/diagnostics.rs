// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Structured record of the recoverable issues met during a calculation.
//!
//! Numeric fallbacks, estimated measurements, limited or inactive devices and
//! non-converged loops do not abort a calculation.  They are logged through
//! `tracing` and also collected here, so that callers and tests can inspect
//! them without parsing log output.

use serde::Serialize;

/// Severity level of a diagnostic issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The calculation continued, possibly with a defaulted value.
    Warning,
    /// Part of the calculation could not be carried out.
    Error,
}

/// Category of a diagnostic issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Topology,
    Validation,
    Numeric,
    Equipment,
    Convergence,
    Calibration,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Topology => write!(f, "topology"),
            Category::Validation => write!(f, "validation"),
            Category::Numeric => write!(f, "numeric"),
            Category::Equipment => write!(f, "equipment"),
            Category::Convergence => write!(f, "convergence"),
            Category::Calibration => write!(f, "calibration"),
        }
    }
}

/// A single diagnostic issue.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// The node, cable or device the issue is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of the diagnostic issues of one calculation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning about the given entity.
    pub fn warn(&mut self, category: Category, entity: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Warning, category, entity, message.into());
    }

    /// Records an error about the given entity.
    pub fn error(&mut self, category: Category, entity: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Error, category, entity, message.into());
    }

    fn push(&mut self, severity: Severity, category: Category, entity: Option<&str>, message: String) {
        self.issues.push(DiagnosticIssue {
            severity,
            category,
            message,
            entity: entity.map(str::to_string),
        });
    }

    /// Moves all issues of `other` into `self`.
    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Returns an iterator over the issues of the given category.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_lookup() {
        let mut diag = Diagnostics::new();
        diag.warn(Category::Numeric, Some("cable-1"), "zero-sequence fallback");
        diag.error(Category::Equipment, Some("srg2-1"), "node not found");
        diag.warn(Category::Calibration, None, "U3 estimated");

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert!(diag
            .in_category(Category::Numeric)
            .any(|i| i.entity.as_deref() == Some("cable-1")));
        assert!(!diag
            .in_category(Category::Equipment)
            .any(|i| i.entity.as_deref() == Some("cable-1")));
        assert_eq!(diag.in_category(Category::Calibration).count(), 1);
        assert_eq!(
            diag.issues[1].to_string(),
            "[error:equipment] node not found (srg2-1)"
        );
    }
}
