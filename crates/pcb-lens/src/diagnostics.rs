//! Structured sync diagnostics.
//!
//! Diagnostic kinds form a closed vocabulary (the `kind` module); severities
//! are fixed to `info`/`warning`/`error`. Diagnostics accumulate through a
//! sync run and are delivered together at the end.

use serde::{Deserialize, Serialize};

/// The closed vocabulary of diagnostic kinds.
pub mod kind {
    pub const MISSING_FOOTPRINT: &str = "layout.sync.missing_footprint";
    pub const EXTRA_FOOTPRINT: &str = "layout.sync.extra_footprint";
    pub const UNMANAGED_FOOTPRINT: &str = "layout.sync.unmanaged_footprint";
    pub const DOMAIN_MISMATCH: &str = "layout.sync.domain_mismatch";
    pub const NO_LEAF_GROUPS: &str = "layout.sync.no_leaf_groups";
    pub const INVALID_GROUP_MEMBER: &str = "layout.sync.invalid_group_member";
    pub const EMPTY_GROUP: &str = "layout.sync.empty_group";
    pub const UNKNOWN_NETS: &str = "layout.sync.unknown_nets";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A single diagnostic from layout sync (e.g. an unmanaged footprint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: String,
    pub severity: Severity,
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: &str, severity: Severity, body: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            severity,
            body: body.into(),
            path: String::new(),
            reference: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Container for sync diagnostics. Serializes as `{"diagnostics": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Stable one-line-per-diagnostic rendering for test oracles, sorted by
    /// `(path, kind)`.
    pub fn to_summary(&self) -> String {
        if self.diagnostics.is_empty() {
            return "(no diagnostics)".to_string();
        }
        let mut lines: Vec<(String, String, String)> = self
            .diagnostics
            .iter()
            .map(|d| {
                (
                    d.path.clone(),
                    d.kind.clone(),
                    format!(
                        "{}: {} @ {}",
                        d.severity.as_str().to_uppercase(),
                        d.kind,
                        d.path
                    ),
                )
            })
            .collect();
        lines.sort();
        lines
            .into_iter()
            .map(|(_, _, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_lowercase() {
        let d = Diagnostic::new(kind::EXTRA_FOOTPRINT, Severity::Warning, "extra")
            .with_path("Power.C3")
            .with_reference("C3");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["kind"], "layout.sync.extra_footprint");
        assert_eq!(json["path"], "Power.C3");
        assert_eq!(json["reference"], "C3");
    }

    #[test]
    fn container_shape() {
        let mut diags = Diagnostics::default();
        diags.push(Diagnostic::new(
            kind::MISSING_FOOTPRINT,
            Severity::Info,
            "new footprint",
        ));
        let json = serde_json::to_value(&diags).unwrap();
        assert!(json["diagnostics"].is_array());
        assert_eq!(json["diagnostics"].as_array().unwrap().len(), 1);

        // Optional fields are omitted when unset.
        assert!(json["diagnostics"][0].get("reference").is_none());
        assert!(json["diagnostics"][0].get("path").is_none());
    }

    #[test]
    fn summary_is_sorted() {
        let mut diags = Diagnostics::default();
        diags.push(
            Diagnostic::new(kind::EXTRA_FOOTPRINT, Severity::Warning, "b").with_path("B"),
        );
        diags.push(
            Diagnostic::new(kind::MISSING_FOOTPRINT, Severity::Info, "a").with_path("A"),
        );
        let summary = diags.to_summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "INFO: layout.sync.missing_footprint @ A");
        assert_eq!(lines[1], "WARNING: layout.sync.extra_footprint @ B");
    }
}
