//! Accumulating diagnostics for configuration-shaped problems.
//!
//! The engine never aborts on a bad pin, a missing rule target, or an
//! unknown policy token: it records a diagnostic and keeps going, so a
//! single run reports every problem in the graph. Whether accumulated
//! errors fail the overall build is the host's decision.

use std::fmt;

/// Category of a configuration diagnostic.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DiagKind {
    /// A pin overwrites another pin, a rule is violated, RequireDM unmet.
    Misconfiguration,
    /// A dependency declaration points outside the manageable roots.
    BadDep,
    /// A rule names a missing directory or a directory without a module.
    BadDir,
    /// Unrecognized user input (e.g. an unknown policy token).
    UserErr,
    /// Informational: unused exception, superseded pin, and the like.
    UserWarn,
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagKind::Misconfiguration => "Misconfiguration",
            DiagKind::BadDep => "BadDep",
            DiagKind::BadDir => "BadDir",
            DiagKind::UserErr => "UserErr",
            DiagKind::UserWarn => "UserWarn",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single accumulated diagnostic.
#[derive(Debug, Clone)]
pub struct Diag {
    pub severity: Severity,
    pub kind: DiagKind,
    /// Name of the module being processed when the diagnostic was raised.
    pub module: String,
    pub message: String,
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warn",
        };
        if self.module.is_empty() {
            write!(f, "{sev}[{}]: {}", self.kind, self.message)
        } else {
            write!(f, "{sev}[{}] in {}: {}", self.kind, self.module, self.message)
        }
    }
}

/// The accumulating diagnostics report for one engine run.
///
/// Order of entries is deterministic: it follows the traversal order of
/// the run that produced them.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diag>,
    scope: String,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the module name attached to subsequently raised diagnostics.
    pub fn set_scope(&mut self, module: impl Into<String>) {
        self.scope = module.into();
    }

    pub fn clear_scope(&mut self) {
        self.scope.clear();
    }

    pub fn error(&mut self, kind: DiagKind, message: impl Into<String>) {
        self.items.push(Diag {
            severity: Severity::Error,
            kind,
            module: self.scope.clone(),
            message: message.into(),
        });
    }

    pub fn warn(&mut self, kind: DiagKind, message: impl Into<String>) {
        self.items.push(Diag {
            severity: Severity::Warning,
            kind,
            module: self.scope.clone(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diag> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diag> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "No diagnostics.");
        }
        for d in &self.items {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}
