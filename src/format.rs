//! Document formats and their static column/validation descriptors.
//!
//! The set of formats is closed: adding one means adding a
//! [`DocumentFormat`] variant, a descriptor and an
//! [`crate::extractor::Extractor`] implementation. Shared code never branches
//! on the format; it reads the descriptor instead.

use crate::error::{BatchError, ValidationIssue};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// First column of every table: the (sanitised) source file name.
pub const FILE_NAME_COLUMN: &str = "Nombre PDF";

/// Check digit split off a plate value (SOAP and permiso formats).
pub const CHECK_DIGIT_COLUMN: &str = "digito verificador";

/// Supported document formats.
///
/// Variant order is the detection priority used in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentFormat {
    /// Certificado de Homologación.
    #[serde(rename = "CERTIFICADO_DE_HOMOLOGACION")]
    Homologacion,
    /// Certificado de Revisión Técnica, optionally with the emissions certificate.
    #[serde(rename = "CRT")]
    Crt,
    /// Seguro Obligatorio de Accidentes Personales.
    #[serde(rename = "SOAP")]
    Soap,
    /// Permiso de Circulación.
    #[serde(rename = "PERMISO_CIRCULACION")]
    PermisoCirculacion,
}

impl DocumentFormat {
    /// All formats in detection priority order.
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Homologacion,
        DocumentFormat::Crt,
        DocumentFormat::Soap,
        DocumentFormat::PermisoCirculacion,
    ];

    /// Wire tag, e.g. `"CRT"`.
    pub fn tag(self) -> &'static str {
        match self {
            DocumentFormat::Homologacion => "CERTIFICADO_DE_HOMOLOGACION",
            DocumentFormat::Crt => "CRT",
            DocumentFormat::Soap => "SOAP",
            DocumentFormat::PermisoCirculacion => "PERMISO_CIRCULACION",
        }
    }

    /// Human-readable name, also used to name the output table.
    pub fn display_name(self) -> &'static str {
        match self {
            DocumentFormat::Homologacion => "Certificado de Homologación",
            DocumentFormat::Crt => "Certificado de Revisión Técnica (CRT)",
            DocumentFormat::Soap => "Seguro Obligatorio (SOAP)",
            DocumentFormat::PermisoCirculacion => "Permiso de Circulación",
        }
    }

    /// The static descriptor for this format.
    pub fn descriptor(self) -> &'static FormatDescriptor {
        use crate::extractor::{crt, homologacion, permiso, soap};
        match self {
            DocumentFormat::Homologacion => &*homologacion::DESCRIPTOR,
            DocumentFormat::Crt => &*crt::DESCRIPTOR,
            DocumentFormat::Soap => &*soap::DESCRIPTOR,
            DocumentFormat::PermisoCirculacion => &*permiso::DESCRIPTOR,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DocumentFormat {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DocumentFormat::ALL
            .into_iter()
            .find(|f| f.tag().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BatchError::UnknownFormat {
                input: s.to_string(),
                allowed: DocumentFormat::ALL
                    .iter()
                    .map(|f| f.tag())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

// ── Descriptors ──────────────────────────────────────────────────────────

/// Validation rule for one column.
#[derive(Debug)]
pub struct FieldRule {
    pub column: &'static str,
    /// Minimum length (in characters) of the trimmed value.
    pub min_len: usize,
    /// Anchored pattern the trimmed value must match, if any.
    pub pattern: Option<Regex>,
}

impl FieldRule {
    pub fn new(column: &'static str) -> Self {
        Self {
            column,
            min_len: 1,
            pattern: None,
        }
    }

    /// Attach a validation pattern.
    ///
    /// Descriptor patterns are compile-time constants; a bad one is a
    /// programming error caught by the descriptor unit tests.
    pub fn pattern(mut self, re: &str) -> Self {
        self.pattern = Some(Regex::new(re).expect("descriptor pattern must compile"));
        self
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = n.max(1);
        self
    }

    fn check(&self, value: &str) -> Option<ValidationIssue> {
        if value.chars().count() < self.min_len {
            return Some(ValidationIssue::too_short(self.column, self.min_len));
        }
        match &self.pattern {
            Some(re) if !re.is_match(value) => Some(ValidationIssue::malformed(self.column, value)),
            _ => None,
        }
    }
}

/// A set of columns tied to one optional section of a document.
#[derive(Debug)]
pub struct FieldGroup {
    pub name: &'static str,
    pub fields: Vec<FieldRule>,
}

/// Static description of one format: table layout plus validation rules.
#[derive(Debug)]
pub struct FormatDescriptor {
    pub format: DocumentFormat,
    /// Output columns, in table order.
    pub columns: Vec<&'static str>,
    /// Unconditionally required columns.
    pub required: Vec<FieldRule>,
    /// Mutually optional sections; at least one must be populated when any exist.
    pub optional_groups: Vec<FieldGroup>,
}

impl FormatDescriptor {
    /// A row with every column present and empty.
    pub fn empty_row(&self) -> FieldMap {
        FieldMap::with_columns(&self.columns)
    }

    /// Best-effort, group-aware validation.
    ///
    /// Required fields are checked first (missing, too short, malformed). A
    /// populated optional field must still be well-formed; an empty group is
    /// fine on its own, but all groups empty is one
    /// [`crate::error::ErrorKind::MissingAllOptionalGroups`] issue.
    pub fn validate(&self, fields: &FieldMap) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for rule in &self.required {
            let value = fields.value(rule.column).trim();
            if value.is_empty() {
                issues.push(ValidationIssue::missing(rule.column));
            } else if let Some(issue) = rule.check(value) {
                issues.push(issue);
            }
        }

        let mut any_group = self.optional_groups.is_empty();
        for group in &self.optional_groups {
            for rule in &group.fields {
                let value = fields.value(rule.column).trim();
                if value.is_empty() {
                    continue;
                }
                any_group = true;
                if let Some(issue) = rule.check(value) {
                    issues.push(issue);
                }
            }
        }
        if !any_group {
            let names: Vec<&str> = self.optional_groups.iter().map(|g| g.name).collect();
            issues.push(ValidationIssue::no_optional_group(&names));
        }

        issues
    }
}

// ── FieldMap ─────────────────────────────────────────────────────────────

/// Ordered column → value map.
///
/// Serialises as a JSON object whose keys keep insertion (= schema) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every column present, every value empty.
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            entries: columns
                .iter()
                .map(|c| (c.to_string(), String::new()))
                .collect(),
        }
    }

    /// Set a value, appending the column if it is not present yet.
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == column) {
            Some((_, v)) => *v = value,
            None => self.entries.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// The value of `column`, or `""` when absent.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values laid out for the given columns (`""` for absent columns).
    pub fn row_for(&self, columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| self.value(c).to_string()).collect()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
