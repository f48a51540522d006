//! Diagnostics
//!
//! Collects non-fatal findings during module preparation. Fatal problems are
//! returned as [`SchemaError`](crate::SchemaError) instead.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Field declaration could not be decoded and was skipped (lenient mode)
    SkippedField,
    /// Namespaced type name whose database does not define it
    MissingForeignType,
    /// Type name with no owning registry, kept as an opaque scalar
    OpaqueType,
    /// Key prefix already produced by an earlier key of the same record
    DuplicatePrefix,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SkippedField => "W001",
            Self::MissingForeignType => "W002",
            Self::OpaqueType => "I001",
            Self::DuplicatePrefix => "I002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SkippedField | Self::MissingForeignType => Severity::Warning,
            Self::OpaqueType | Self::DuplicatePrefix => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Qualified name of the record or enum concerned
    pub subject: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(subject: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.subject
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Move every item of `other` to the end of this list
    pub fn append(&mut self, other: &mut Diagnostics) {
        self.items.append(&mut other.items);
    }

    pub fn skipped_field(&mut self, record: &str, reason: &str) {
        self.push(DiagnosticItem::new(
            record,
            DiagnosticCode::SkippedField,
            format!("field declaration skipped: {}", reason),
        ));
    }

    pub fn missing_foreign_type(&mut self, subject: &str, namespace: &str, name: &str) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::MissingForeignType,
            format!("database '{}' does not define '{}', treated as opaque", namespace, name),
        ));
    }

    pub fn opaque_type(&mut self, subject: &str, type_name: &str) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::OpaqueType,
            format!("'{}' is not a known record or enum", type_name),
        ));
    }

    pub fn duplicate_prefix(&mut self, subject: &str, prefix: &str, key: &str, first_key: &str) {
        self.push(
            DiagnosticItem::new(
                subject,
                DiagnosticCode::DuplicatePrefix,
                format!("key prefix '{}' of key '{}' is shared", prefix, key),
            )
            .with_context(format!("first produced by key '{}'", first_key)),
        );
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!(
                "\n{} warning(s), {} note(s)\n",
                self.warning_count(),
                self.len() - self.warning_count()
            ));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
