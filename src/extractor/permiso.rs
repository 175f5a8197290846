//! Permiso de Circulación.

use super::{Detection, Extractor, TaskContext};
use crate::error::DocumentError;
use crate::format::{
    DocumentFormat, FieldMap, FieldRule, FormatDescriptor, CHECK_DIGIT_COLUMN, FILE_NAME_COLUMN,
};
use crate::text::{capture, capture_or_empty, flatten_lines, split_plate_check_digit};
use once_cell::sync::Lazy;
use regex::Regex;

pub const PLACA_UNICA: &str = "Placa Única";
pub const CODIGO_SII: &str = "Código SII";
pub const VALOR_PERMISO: &str = "Valor Permiso";
pub const PAGO_TOTAL: &str = "Pago total";
pub const PAGO_CUOTA_1: &str = "Pago Cuota 1";
pub const PAGO_CUOTA_2: &str = "Pago Cuota 2";
pub const TOTAL_A_PAGAR: &str = "Total a pagar";
pub const FECHA_EMISION: &str = "Fecha de emisión";
pub const FECHA_VENCIMIENTO: &str = "Fecha de vencimiento";
pub const FORMA_PAGO: &str = "Forma de Pago";

/// Value of an unticked payment box.
pub const NOT_APPLICABLE: &str = "No aplica";

pub static DESCRIPTOR: Lazy<FormatDescriptor> = Lazy::new(|| FormatDescriptor {
    format: DocumentFormat::PermisoCirculacion,
    columns: vec![
        FILE_NAME_COLUMN,
        PLACA_UNICA,
        CHECK_DIGIT_COLUMN,
        CODIGO_SII,
        VALOR_PERMISO,
        PAGO_TOTAL,
        PAGO_CUOTA_1,
        PAGO_CUOTA_2,
        TOTAL_A_PAGAR,
        FECHA_EMISION,
        FECHA_VENCIMIENTO,
        FORMA_PAGO,
    ],
    required: vec![
        FieldRule::new(PLACA_UNICA).min_len(3),
        FieldRule::new(CODIGO_SII).min_len(3),
        FieldRule::new(VALOR_PERMISO).min_len(3),
        FieldRule::new(PAGO_TOTAL).pattern(r"(?i)^(X|No aplica)$"),
        FieldRule::new(PAGO_CUOTA_1).pattern(r"(?i)^(X|No aplica)$"),
        FieldRule::new(PAGO_CUOTA_2).pattern(r"(?i)^(X|No aplica)$"),
        FieldRule::new(TOTAL_A_PAGAR).min_len(3),
        FieldRule::new(FECHA_EMISION).min_len(3),
        FieldRule::new(FECHA_VENCIMIENTO).min_len(3),
        FieldRule::new(FORMA_PAGO).min_len(3),
    ],
    optional_groups: Vec::new(),
});

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_PLACA_UNICA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Placa\s+Única\s*[:\-]?\s*([A-Z0-9\-]+)").unwrap());
static RE_CODIGO_SII: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)C[oó]digo\s+SII\s*[:\-]?\s*([A-Z0-9]+)").unwrap());
static RE_VALOR_PERMISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Valor\s+Permiso\s*[:\-]?\s*(\d+)").unwrap());
static RE_PAGO_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Pago\s+total\s*[:\-]?\s*(X)?").unwrap());
static RE_PAGO_CUOTA_1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Pago\s+cuota\s+1\s*[:\-]?\s*(X)?").unwrap());
static RE_PAGO_CUOTA_2: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Pago\s+cuota\s+2\s*[:\-]?\s*(X)?").unwrap());
static RE_TOTAL_A_PAGAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Total\s+a\s+pagar\s*[:\-]?\s*(\d+)").unwrap());
static RE_FECHA_EMISION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Fecha(?:\s+de)?\s+emisi[oó]n\s*[:\-]?\s*(\d{2}/\d{2}/\d{4})").unwrap()
});
static RE_FECHA_VENCIMIENTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Fecha(?:\s+de)?\s+vencimiento\s*[:\-]?\s*(\d{2}/\d{2}/\d{4})").unwrap()
});
static RE_FORMA_PAGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Forma\s+de\s+Pago\s*[:\-]?\s*(\w+)").unwrap());

/// A ticked payment box reads `"X"`; anything else means it does not apply.
fn payment_box(text: &str, re: &Regex) -> String {
    capture(text, re)
        .map(|x| x.to_uppercase())
        .unwrap_or_else(|| NOT_APPLICABLE.to_string())
}

pub struct PermisoExtractor;

impl Extractor for PermisoExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::PermisoCirculacion
    }

    fn detect(&self, text: &str) -> Detection {
        let upper = text.to_uppercase();
        Detection::from_bool(
            upper.contains("PERMISO DE CIRCULACIÓN") || upper.contains("PLACA ÚNICA"),
        )
    }

    fn extract(&self, text: &str, ctx: &mut TaskContext) -> Result<FieldMap, DocumentError> {
        let text = flatten_lines(text);
        let mut fields = self.descriptor().empty_row();

        for (column, re) in [
            (PLACA_UNICA, &*RE_PLACA_UNICA),
            (CODIGO_SII, &*RE_CODIGO_SII),
            (VALOR_PERMISO, &*RE_VALOR_PERMISO),
            (TOTAL_A_PAGAR, &*RE_TOTAL_A_PAGAR),
            (FECHA_EMISION, &*RE_FECHA_EMISION),
            (FECHA_VENCIMIENTO, &*RE_FECHA_VENCIMIENTO),
            (FORMA_PAGO, &*RE_FORMA_PAGO),
        ] {
            let value = capture_or_empty(&text, re);
            if value.is_empty() {
                ctx.note(format!("{column}: no match"));
            }
            fields.set(column, value);
        }

        for (column, re) in [
            (PAGO_TOTAL, &*RE_PAGO_TOTAL),
            (PAGO_CUOTA_1, &*RE_PAGO_CUOTA_1),
            (PAGO_CUOTA_2, &*RE_PAGO_CUOTA_2),
        ] {
            fields.set(column, payment_box(&text, re));
        }

        Ok(fields)
    }

    fn finalize(&self, fields: &mut FieldMap) {
        let (plate, check) = split_plate_check_digit(fields.value(PLACA_UNICA));
        fields.set(PLACA_UNICA, plate);
        if let Some(check) = check {
            fields.set(CHECK_DIGIT_COLUMN, check);
        }
    }

    fn patterns(&self) -> Vec<(&'static str, String)> {
        [
            (PLACA_UNICA, &*RE_PLACA_UNICA),
            (CODIGO_SII, &*RE_CODIGO_SII),
            (VALOR_PERMISO, &*RE_VALOR_PERMISO),
            (PAGO_TOTAL, &*RE_PAGO_TOTAL),
            (PAGO_CUOTA_1, &*RE_PAGO_CUOTA_1),
            (PAGO_CUOTA_2, &*RE_PAGO_CUOTA_2),
            (TOTAL_A_PAGAR, &*RE_TOTAL_A_PAGAR),
            (FECHA_EMISION, &*RE_FECHA_EMISION),
            (FECHA_VENCIMIENTO, &*RE_FECHA_VENCIMIENTO),
            (FORMA_PAGO, &*RE_FORMA_PAGO),
        ]
        .into_iter()
        .map(|(c, re)| (c, re.as_str().to_string()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = "PERMISO DE CIRCULACIÓN 2024\n\
        Placa Única: TWGV11-7\n\
        Codigo SII: ABC123\n\
        Valor Permiso: 45000\n\
        Pago total: X\n\
        Pago cuota 1:\n\
        Pago cuota 2:\n\
        Total a pagar: 45000\n\
        Fecha de emisión: 01/03/2024\n\
        Fecha de vencimiento: 31/03/2025\n\
        Forma de Pago: WEBPAY\n";

    #[test]
    fn extracts_sample_with_unticked_boxes() {
        let mut ctx = TaskContext::new(0, "p.pdf");
        let fields = PermisoExtractor.extract(SAMPLE, &mut ctx).unwrap();
        assert_eq!(fields.value(PLACA_UNICA), "TWGV11-7");
        assert_eq!(fields.value(CODIGO_SII), "ABC123");
        assert_eq!(fields.value(VALOR_PERMISO), "45000");
        assert_eq!(fields.value(PAGO_TOTAL), "X");
        assert_eq!(fields.value(PAGO_CUOTA_1), NOT_APPLICABLE);
        assert_eq!(fields.value(PAGO_CUOTA_2), NOT_APPLICABLE);
        assert_eq!(fields.value(TOTAL_A_PAGAR), "45000");
        assert_eq!(fields.value(FECHA_EMISION), "01/03/2024");
        assert_eq!(fields.value(FECHA_VENCIMIENTO), "31/03/2025");
        assert_eq!(fields.value(FORMA_PAGO), "WEBPAY");

        let issues = PermisoExtractor.validate(&fields, &mut ctx);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn finalize_splits_plate() {
        let mut fields = DESCRIPTOR.empty_row();
        fields.set(PLACA_UNICA, "TWGV11-7");
        PermisoExtractor.finalize(&mut fields);
        assert_eq!(fields.value(PLACA_UNICA), "TWGV11");
        assert_eq!(fields.value(CHECK_DIGIT_COLUMN), "7");
    }

    #[test]
    fn short_value_is_incomplete() {
        let text = SAMPLE.replace("Valor Permiso: 45000", "Valor Permiso: 45");
        let mut ctx = TaskContext::new(0, "p.pdf");
        let fields = PermisoExtractor.extract(&text, &mut ctx).unwrap();
        let issues = PermisoExtractor.validate(&fields, &mut ctx);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].field, VALOR_PERMISO);
        assert_eq!(issues[0].kind, ErrorKind::MalformedField);
    }

    #[test]
    fn detect_by_plate_label() {
        assert!(PermisoExtractor.detect("placa única: AB1234").is_match());
        assert!(!PermisoExtractor.detect("SEGURO OBLIGATORIO").is_match());
    }
}
