//! Seguro Obligatorio de Accidentes Personales (SOAP).

use super::{Detection, Extractor, TaskContext};
use crate::error::DocumentError;
use crate::format::{
    DocumentFormat, FieldMap, FieldRule, FormatDescriptor, CHECK_DIGIT_COLUMN, FILE_NAME_COLUMN,
};
use crate::text::{capture, capture_or_empty, flatten_lines, split_plate_check_digit};
use once_cell::sync::Lazy;
use regex::Regex;

pub const INSCRIPCION: &str = "INSCRIPCION R.V.M";
pub const BAJO_CODIGO: &str = "Bajo el codigo";
pub const RUT: &str = "RUT";
pub const RIGE_DESDE: &str = "RIGE DESDE";
pub const HASTA: &str = "HASTA";
pub const POLIZA: &str = "POLIZA N°";
pub const PRIMA: &str = "PRIMA";

pub static DESCRIPTOR: Lazy<FormatDescriptor> = Lazy::new(|| FormatDescriptor {
    format: DocumentFormat::Soap,
    columns: vec![
        FILE_NAME_COLUMN,
        INSCRIPCION,
        CHECK_DIGIT_COLUMN,
        BAJO_CODIGO,
        RUT,
        RIGE_DESDE,
        HASTA,
        POLIZA,
        PRIMA,
    ],
    required: vec![
        FieldRule::new(INSCRIPCION)
            .min_len(3)
            .pattern(r"(?i)^[A-Z0-9]{6,}\s*-\s*[A-Z0-9]$"),
        FieldRule::new(BAJO_CODIGO).min_len(3).pattern(r"^[A-Z0-9\-]+$"),
        FieldRule::new(RUT)
            .min_len(3)
            .pattern(r"^(?:\d{7,8}|(?:\d{1,3}(?:\.\d{3})+))-[0-9kK]$"),
        FieldRule::new(RIGE_DESDE).min_len(3).pattern(r"^\d{2}[-/]\d{2}[-/]\d{4}$"),
        FieldRule::new(HASTA).min_len(3).pattern(r"^\d{2}[-/]\d{2}[-/]\d{4}$"),
        FieldRule::new(POLIZA).min_len(3).pattern(r"(?i)^\d{6,9}-[A-Z0-9]$"),
        FieldRule::new(PRIMA).min_len(3).pattern(r"^[\d.]+$"),
    ],
    optional_groups: Vec::new(),
});

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_INSCRIPCION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)INSCRIPC[ÍI]ON\s*R\s*\.?\s*V\s*\.?\s*M\s*\.?\s*(?::|\-)?\s*([A-Z0-9]+\s*-\s*[A-Z0-9]+)",
    )
    .unwrap()
});
static RE_BAJO_CODIGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Bajo\s+el\s+c[óo]digo\s*[:\-]?\s*([A-Z0-9\-]+)").unwrap());
static RE_RUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RUT\s*[:\-]?\s*((?:\d{1,3}(?:\.\d{3})+)|\d{7,8})\s*-\s*([0-9kK])").unwrap()
});
static RE_RIGE_DESDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RIGE\s+DESDE\s*[:\-]?\s*(\d{2}[-/]\d{2}[-/]\d{4})").unwrap()
});
static RE_HASTA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)HAST(?:\s*A)?\s*[:\-]?\s*(\d{2}[-/]\d{2}[-/]\d{4})").unwrap());
static RE_POLIZA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)POLI[ZS]A\s*N[°º]?\s*[:\-]?\s*([A-Z0-9]+\s*-\s*[A-Z0-9]+)").unwrap()
});
static RE_PRIMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PRIMA\s*[:\-]?\s*([\d.]+)").unwrap());

static RE_SPACED_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());

/// `"12.345.678 - 5"` → `"12345678-5"`.
fn extract_rut(text: &str) -> String {
    RE_RUT
        .captures(text)
        .and_then(|caps| {
            let number = caps.get(1)?.as_str().replace('.', "");
            let dv = caps.get(2)?.as_str();
            Some(format!("{number}-{dv}"))
        })
        .unwrap_or_default()
}

pub struct SoapExtractor;

impl Extractor for SoapExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Soap
    }

    fn detect(&self, text: &str) -> Detection {
        let upper = text.to_uppercase();
        Detection::from_bool(upper.contains("SEGURO OBLIGATORIO") || upper.contains("SOAP"))
    }

    fn extract(&self, text: &str, ctx: &mut TaskContext) -> Result<FieldMap, DocumentError> {
        let text = flatten_lines(text);
        let mut fields = self.descriptor().empty_row();

        fields.set(INSCRIPCION, capture_or_empty(&text, &RE_INSCRIPCION));
        fields.set(BAJO_CODIGO, capture_or_empty(&text, &RE_BAJO_CODIGO));
        fields.set(RUT, extract_rut(&text));
        fields.set(RIGE_DESDE, capture_or_empty(&text, &RE_RIGE_DESDE));
        fields.set(HASTA, capture_or_empty(&text, &RE_HASTA));
        fields.set(
            POLIZA,
            capture(&text, &RE_POLIZA)
                .map(|p| RE_SPACED_HYPHEN.replace_all(&p, "-").into_owned())
                .unwrap_or_default(),
        );
        fields.set(PRIMA, capture_or_empty(&text, &RE_PRIMA));

        for (column, value) in fields.iter().skip(1) {
            if value.is_empty() && column != CHECK_DIGIT_COLUMN {
                ctx.note(format!("{column}: no match"));
            }
        }
        Ok(fields)
    }

    fn finalize(&self, fields: &mut FieldMap) {
        let (plate, check) = split_plate_check_digit(fields.value(INSCRIPCION));
        fields.set(INSCRIPCION, plate);
        if let Some(check) = check {
            fields.set(CHECK_DIGIT_COLUMN, check);
        }
    }

    fn patterns(&self) -> Vec<(&'static str, String)> {
        [
            (INSCRIPCION, &*RE_INSCRIPCION),
            (BAJO_CODIGO, &*RE_BAJO_CODIGO),
            (RUT, &*RE_RUT),
            (RIGE_DESDE, &*RE_RIGE_DESDE),
            (HASTA, &*RE_HASTA),
            (POLIZA, &*RE_POLIZA),
            (PRIMA, &*RE_PRIMA),
        ]
        .into_iter()
        .map(|(c, re)| (c, re.as_str().to_string()))
        .collect()
    }
}
