//! Certificado de Revisión Técnica (CRT).
//!
//! A CRT document carries one or both of two certificates: the technical
//! review certificate and the emissions ("contaminantes") certificate. Each
//! contributes one "Válido Hasta" column. The two columns form two optional
//! groups: either, or both, may be present, but a document with neither is
//! rejected.

use super::{Detection, Extractor, TaskContext};
use crate::error::DocumentError;
use crate::format::{
    DocumentFormat, FieldGroup, FieldMap, FieldRule, FormatDescriptor, FILE_NAME_COLUMN,
};
use crate::text::capture_or_empty;
use once_cell::sync::Lazy;
use regex::Regex;

pub const FECHA_REVISION: &str = "Fecha de Revisión";
pub const PLANTA: &str = "Planta";
pub const PLACA_PATENTE: &str = "Placa Patente";
pub const VALIDO_HASTA_REVISION: &str = "Válido Hasta Revisión Técnica";
pub const VALIDO_HASTA_CONTAMINANTES: &str = "Válido Hasta Contaminantes";
pub const FOLIO: &str = "Folio";

pub static DESCRIPTOR: Lazy<FormatDescriptor> = Lazy::new(|| FormatDescriptor {
    format: DocumentFormat::Crt,
    columns: vec![
        FILE_NAME_COLUMN,
        FECHA_REVISION,
        PLANTA,
        PLACA_PATENTE,
        VALIDO_HASTA_REVISION,
        VALIDO_HASTA_CONTAMINANTES,
        FOLIO,
    ],
    required: vec![
        FieldRule::new(FECHA_REVISION).pattern(r"^\d{1,2}\s+[A-ZÁÉÍÓÚÑ]+\s+\d{4}$"),
        FieldRule::new(PLACA_PATENTE).pattern(r"^[A-Z0-9]+$"),
        FieldRule::new(PLANTA),
        FieldRule::new(FOLIO).pattern(r"(?i)^N°B\d+$"),
    ],
    optional_groups: vec![
        FieldGroup {
            name: "Revisión Técnica",
            fields: vec![FieldRule::new(VALIDO_HASTA_REVISION).pattern(r"(?i)^[A-ZÁÉÍÓÚÑ]+\s+\d{4}$")],
        },
        FieldGroup {
            name: "Emisiones Contaminantes",
            fields: vec![
                FieldRule::new(VALIDO_HASTA_CONTAMINANTES).pattern(r"(?i)^[A-ZÁÉÍÓÚÑ]+\s+\d{4}$"),
            ],
        },
    ],
});

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_FECHA_REVISION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)FECHA REVISIÓN:\s*(\d{1,2}\s+[A-ZÁÉÍÓÚÑ]+\s+\d{4})").unwrap()
});
static RE_PLANTA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PLANTA:\s*([A-Z0-9-]+)").unwrap());
static RE_PLACA_PATENTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PLACA PATENTE\s+([A-Z0-9]+)").unwrap());
static RE_FOLIO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(N°B\d+)").unwrap());

static RE_REVISION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)CERTIFICADO\s+(?:DE\s+)?REVISI[ÓO]N\s+T[EÉ]CNICA").unwrap()
});
static RE_CONTAMINANTES_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)CERTIFICADO\s+(?:DE\s+)?(?:EMISIONES\s+)?CONTAMINANTES").unwrap()
});
static RE_ANY_CERTIFICATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CERTIFICADO\s").unwrap());

static RE_VALIDO_HASTA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)VÁLIDO HASTA(?:\s*FECHA REVISIÓN:)?\s*(?:(\d{1,2}\s+[A-ZÁÉÍÓÚÑ]+\s+\d{4})\s+)?([A-ZÁÉÍÓÚÑ]+\s+\d{4})",
    )
    .unwrap()
});

/// Body of the section that starts at `header` and runs until the first
/// `terminator` match after it (or the end of the text).
fn section<'t>(text: &'t str, header: &Regex, terminator: &Regex) -> Option<&'t str> {
    let start = header.find(text)?.end();
    let rest = &text[start..];
    let end = terminator.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// "Válido Hasta" inside one section: the month/year, falling back to the
/// full date when only that is present.
fn valid_until(section: &str) -> Option<String> {
    let caps = RE_VALIDO_HASTA.captures(section)?;
    caps.get(2)
        .or_else(|| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

pub struct CrtExtractor;

impl Extractor for CrtExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Crt
    }

    fn detect(&self, text: &str) -> Detection {
        let upper = text.to_uppercase();
        Detection::from_bool(
            upper.contains("CERTIFICADO DE REVISIÓN TÉCNICA") || upper.contains("FECHA REVISIÓN"),
        )
    }

    fn extract(&self, text: &str, ctx: &mut TaskContext) -> Result<FieldMap, DocumentError> {
        let mut fields = self.descriptor().empty_row();

        for (column, re) in [
            (FECHA_REVISION, &*RE_FECHA_REVISION),
            (PLANTA, &*RE_PLANTA),
            (PLACA_PATENTE, &*RE_PLACA_PATENTE),
        ] {
            let value = capture_or_empty(text, re);
            ctx.note(format!("{column}: {value:?}"));
            fields.set(column, value);
        }

        // Sections: a missing certificate leaves its group empty.
        match section(text, &RE_REVISION_HEADER, &RE_CONTAMINANTES_HEADER) {
            Some(body) => match valid_until(body) {
                Some(v) => {
                    ctx.note(format!("{VALIDO_HASTA_REVISION}: {v:?}"));
                    fields.set(VALIDO_HASTA_REVISION, v);
                }
                None => ctx.note("technical review section has no 'VÁLIDO HASTA'"),
            },
            None => ctx.note("no technical review certificate section"),
        }

        match section(text, &RE_CONTAMINANTES_HEADER, &RE_ANY_CERTIFICATE) {
            Some(body) => match valid_until(body) {
                Some(v) => {
                    ctx.note(format!("{VALIDO_HASTA_CONTAMINANTES}: {v:?}"));
                    fields.set(VALIDO_HASTA_CONTAMINANTES, v);
                }
                None => ctx.note("emissions section has no 'VÁLIDO HASTA'"),
            },
            None => ctx.note("no emissions certificate section"),
        }

        let folio = capture_or_empty(text, &RE_FOLIO);
        ctx.note(format!("{FOLIO}: {folio:?}"));
        fields.set(FOLIO, folio);

        Ok(fields)
    }

    fn patterns(&self) -> Vec<(&'static str, String)> {
        vec![
            (FECHA_REVISION, RE_FECHA_REVISION.as_str().to_string()),
            (PLANTA, RE_PLANTA.as_str().to_string()),
            (PLACA_PATENTE, RE_PLACA_PATENTE.as_str().to_string()),
            (VALIDO_HASTA_REVISION, RE_VALIDO_HASTA.as_str().to_string()),
            (VALIDO_HASTA_CONTAMINANTES, RE_VALIDO_HASTA.as_str().to_string()),
            (FOLIO, RE_FOLIO.as_str().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const HEADER: &str = "FECHA REVISIÓN: 15 DICIEMBRE 2024\nPLANTA: SGS-001\nPLACA PATENTE ABCD12\n";

    fn run(text: &str) -> (FieldMap, Vec<crate::error::ValidationIssue>) {
        let mut ctx = TaskContext::new(0, "crt.pdf");
        let fields = CrtExtractor.extract(text, &mut ctx).unwrap();
        let issues = CrtExtractor.validate(&fields, &mut ctx);
        (fields, issues)
    }

    #[test]
    fn both_certificates() {
        let text = format!(
            "{HEADER}CERTIFICADO DE REVISIÓN TÉCNICA\nVÁLIDO HASTA DICIEMBRE 2025\n\
             CERTIFICADO DE EMISIONES CONTAMINANTES\nVÁLIDO HASTA JUNIO 2025\nN°B123456\n"
        );
        let (fields, issues) = run(&text);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(fields.value(FECHA_REVISION), "15 DICIEMBRE 2024");
        assert_eq!(fields.value(PLANTA), "SGS-001");
        assert_eq!(fields.value(PLACA_PATENTE), "ABCD12");
        assert_eq!(fields.value(VALIDO_HASTA_REVISION), "DICIEMBRE 2025");
        assert_eq!(fields.value(VALIDO_HASTA_CONTAMINANTES), "JUNIO 2025");
        assert_eq!(fields.value(FOLIO), "N°B123456");
    }

    #[test]
    fn only_technical_review() {
        let text = format!(
            "{HEADER}CERTIFICADO DE REVISIÓN TÉCNICA\nVÁLIDO HASTA MARZO 2025\nN°B654321\n"
        );
        let (fields, issues) = run(&text);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(fields.value(VALIDO_HASTA_REVISION), "MARZO 2025");
        assert_eq!(fields.get(VALIDO_HASTA_CONTAMINANTES), Some(""));
    }

    #[test]
    fn only_emissions() {
        let text = format!(
            "{HEADER}CERTIFICADO DE EMISIONES CONTAMINANTES\nVÁLIDO HASTA JULIO 2025\nN°B111222\n"
        );
        let (fields, issues) = run(&text);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(fields.get(VALIDO_HASTA_REVISION), Some(""));
        assert_eq!(fields.value(VALIDO_HASTA_CONTAMINANTES), "JULIO 2025");
    }

    #[test]
    fn neither_certificate_fails_as_a_whole() {
        let text = format!("{HEADER}N°B123456\n");
        let (fields, issues) = run(&text);
        assert_eq!(fields.len(), DESCRIPTOR.columns.len());
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].kind, ErrorKind::MissingAllOptionalGroups);
    }

    #[test]
    fn present_section_without_date_counts_as_absent() {
        let text = format!("{HEADER}CERTIFICADO DE REVISIÓN TÉCNICA\nsin fecha\nN°B1\n");
        let (_, issues) = run(&text);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ErrorKind::MissingAllOptionalGroups);
    }

    #[test]
    fn missing_required_field_reported_first() {
        let text = "PLANTA: SGS-001\nPLACA PATENTE ABCD12\n\
                    CERTIFICADO DE REVISIÓN TÉCNICA\nVÁLIDO HASTA MARZO 2025\nN°B1\n";
        let (_, issues) = run(text);
        assert_eq!(issues[0].kind, ErrorKind::MissingRequiredField);
        assert_eq!(issues[0].field, FECHA_REVISION);
    }

    #[test]
    fn malformed_folio() {
        let mut fields = DESCRIPTOR.empty_row();
        fields.set(FECHA_REVISION, "15 DICIEMBRE 2024");
        fields.set(PLANTA, "SGS-001");
        fields.set(PLACA_PATENTE, "ABCD12");
        fields.set(VALIDO_HASTA_REVISION, "DICIEMBRE 2025");
        fields.set(FOLIO, "123456");
        let issues = CrtExtractor.validate(&fields, &mut TaskContext::new(0, "x"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ErrorKind::MalformedField);
        assert_eq!(issues[0].field, FOLIO);
    }

    #[test]
    fn detect_keywords() {
        assert!(CrtExtractor.detect("fecha revisión: 1 enero 2024").is_match());
        assert!(!CrtExtractor.detect("PERMISO DE CIRCULACIÓN").is_match());
    }

    #[test]
    fn trace_mentions_missing_section() {
        let mut ctx = TaskContext::new(0, "crt.pdf");
        CrtExtractor.extract(HEADER, &mut ctx).unwrap();
        assert!(ctx
            .steps()
            .iter()
            .any(|s| s.contains("no emissions certificate section")));
    }
}
