//! Certificado de Homologación.

use super::{Detection, Extractor, TaskContext};
use crate::error::DocumentError;
use crate::format::{DocumentFormat, FieldMap, FieldRule, FormatDescriptor, FILE_NAME_COLUMN};
use crate::text::{capture, capture_or_empty, collapse_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;

pub const PATENTE: &str = "Patente";
pub const FECHA_EMISION: &str = "Fecha de Emisión";
pub const CORRELATIVO: &str = "Nº Correlativo";
pub const CODIGO_INFORME: &str = "Código Informe Técnico";
pub const VALIDO_HASTA: &str = "Válido Hasta";
pub const TIPO_VEHICULO: &str = "Tipo de Vehículo";
pub const MARCA: &str = "Marca";
pub const ANIO: &str = "Año";
pub const MODELO: &str = "Modelo";
pub const COLOR: &str = "Color";
pub const VIN: &str = "VIN";
pub const MOTOR: &str = "Nº Motor";
pub const FIRMADO_POR: &str = "Firmado por";

pub static DESCRIPTOR: Lazy<FormatDescriptor> = Lazy::new(|| FormatDescriptor {
    format: DocumentFormat::Homologacion,
    columns: vec![
        FILE_NAME_COLUMN,
        PATENTE,
        FECHA_EMISION,
        CORRELATIVO,
        CODIGO_INFORME,
        VALIDO_HASTA,
        TIPO_VEHICULO,
        MARCA,
        ANIO,
        MODELO,
        COLOR,
        VIN,
        MOTOR,
        FIRMADO_POR,
    ],
    required: vec![
        FieldRule::new(PATENTE).pattern(r"(?i)^[A-Z0-9]{6}$"),
        FieldRule::new(FECHA_EMISION).pattern(r"^\d{1,2}/[A-Z]{3}/\d{4}$"),
        FieldRule::new(CORRELATIVO).pattern(r"^[A-Z0-9\-]+$"),
        FieldRule::new(CODIGO_INFORME).pattern(r"^[A-Z0-9\-]+$"),
        FieldRule::new(VALIDO_HASTA).pattern(r"^[A-Z]{3}/\d{4}$"),
        FieldRule::new(TIPO_VEHICULO).pattern(r"^[A-ZÑ]+$"),
        FieldRule::new(MARCA).pattern(r"^[A-Z]+$"),
        FieldRule::new(ANIO).pattern(r"^\d{4}$"),
        FieldRule::new(MODELO),
        FieldRule::new(COLOR).pattern(r"^[A-Z\s()0-9.\-]+\.?$"),
        FieldRule::new(VIN).pattern(r"^[A-Z0-9]+$"),
        FieldRule::new(MOTOR).pattern(r"^[A-Z0-9]+(?:\s+[A-Z0-9]{2,})?$"),
        FieldRule::new(FIRMADO_POR),
    ],
    optional_groups: Vec::new(),
});

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_FECHA_EMISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FECHA DE EMISIÓN\s+([0-9A-Z/]+)").unwrap());
static RE_CORRELATIVO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)N[°º]\s*CORRELATIVO\s+([A-Z0-9\-]+)").unwrap());
static RE_CODIGO_INFORME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CÓDIGO DE INFORME TÉCNICO\s+([A-Z0-9\-]+)").unwrap());
static RE_PATENTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PATENTE\s+([A-Z0-9\-]+)").unwrap());
static RE_VALIDO_HASTA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VÁLIDO HASTA\s+([0-9A-Z/]+)").unwrap());
static RE_TIPO_VEHICULO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)TIPO DE VEHÍCULO\s+([A-ZÑ]+)").unwrap());
static RE_MARCA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)MARCA\s+([A-Z]+)").unwrap());
static RE_ANIO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)AÑO\s+([0-9]{4})").unwrap());
static RE_MODELO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)MODELO\s+(.+?)\s+COLOR").unwrap());
static RE_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)COLOR\s+([A-Z\s()0-9.\-]+?)(?:\s+VIN\b|$)").unwrap()
});
static RE_VIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)VIN\s+([A-Z0-9]+)").unwrap());
static RE_MOTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)N[°º]\s*MOTOR\s+([A-Z0-9]+(?:[ \t]+[A-Z0-9]+)?)").unwrap());
static RE_FIRMADO_POR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Firmado por:\s+(.+?)(?:\s+AUDITORÍA|\r?\n|$)").unwrap());
static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CERTIFICADO DE HOMOLOGACIÓN\s+(.*?)\s+REEMPLAZA").unwrap());

static RE_MOTOR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+(C|El)$").unwrap());
static RE_SIGNATURE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}").unwrap());

fn clean_patente(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && *c != ' ')
        .take(6)
        .collect()
}

fn clean_motor(raw: &str) -> String {
    RE_MOTOR_SUFFIX.replace(raw, "").trim().to_string()
}

/// The signer line often runs into the signature timestamp.
fn clean_signer(raw: &str) -> String {
    match RE_SIGNATURE_DATE.find(raw) {
        Some(m) => raw[..m.start()].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

pub struct HomologacionExtractor;

impl Extractor for HomologacionExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Homologacion
    }

    fn detect(&self, text: &str) -> Detection {
        Detection::from_bool(text.to_uppercase().contains("CERTIFICADO DE HOMOLOGACIÓN"))
    }

    fn extract(&self, text: &str, ctx: &mut TaskContext) -> Result<FieldMap, DocumentError> {
        let mut fields = self.descriptor().empty_row();

        for (column, re) in [
            (FECHA_EMISION, &*RE_FECHA_EMISION),
            (CORRELATIVO, &*RE_CORRELATIVO),
            (CODIGO_INFORME, &*RE_CODIGO_INFORME),
            (VALIDO_HASTA, &*RE_VALIDO_HASTA),
            (TIPO_VEHICULO, &*RE_TIPO_VEHICULO),
            (MARCA, &*RE_MARCA),
            (ANIO, &*RE_ANIO),
            (COLOR, &*RE_COLOR),
            (VIN, &*RE_VIN),
        ] {
            fields.set(column, capture_or_empty(text, re));
        }

        fields.set(PATENTE, clean_patente(&capture_or_empty(text, &RE_PATENTE)));
        fields.set(MODELO, collapse_whitespace(&capture_or_empty(text, &RE_MODELO)));
        fields.set(MOTOR, clean_motor(&capture_or_empty(text, &RE_MOTOR)));
        fields.set(FIRMADO_POR, clean_signer(&capture_or_empty(text, &RE_FIRMADO_POR)));

        let found = fields.iter().filter(|(_, v)| !v.is_empty()).count();
        ctx.note(format!(
            "extracted {found} of {} columns",
            self.descriptor().columns.len() - 1
        ));
        Ok(fields)
    }

    fn title(&self, text: &str) -> Option<String> {
        capture(text, &RE_TITLE)
    }

    fn patterns(&self) -> Vec<(&'static str, String)> {
        [
            (PATENTE, &*RE_PATENTE),
            (FECHA_EMISION, &*RE_FECHA_EMISION),
            (CORRELATIVO, &*RE_CORRELATIVO),
            (CODIGO_INFORME, &*RE_CODIGO_INFORME),
            (VALIDO_HASTA, &*RE_VALIDO_HASTA),
            (TIPO_VEHICULO, &*RE_TIPO_VEHICULO),
            (MARCA, &*RE_MARCA),
            (ANIO, &*RE_ANIO),
            (MODELO, &*RE_MODELO),
            (COLOR, &*RE_COLOR),
            (VIN, &*RE_VIN),
            (MOTOR, &*RE_MOTOR),
            (FIRMADO_POR, &*RE_FIRMADO_POR),
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

    const SAMPLE: &str = "CERTIFICADO DE HOMOLOGACIÓN INDIVIDUAL REEMPLAZA AL ANTERIOR\n\
        FECHA DE EMISIÓN 15/DIC/2024\n\
        Nº CORRELATIVO AB-123456\n\
        CÓDIGO DE INFORME TÉCNICO CIT-2024-01\n\
        PATENTE AB-CD-12\n\
        VÁLIDO HASTA DIC/2025\n\
        TIPO DE VEHÍCULO AUTOMOVIL\n\
        MARCA TOYOTA\n\
        AÑO 2020\n\
        MODELO COROLLA   XLI COLOR BLANCO\n\
        VIN JTDBR32E123456789\n\
        Nº MOTOR 1ZZ1234567 C\n\
        Firmado por: JUAN PEREZ 15/12/2024 AUDITORÍA\n";

    #[test]
    fn extracts_every_column() {
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(SAMPLE, &mut ctx).unwrap();
        assert_eq!(fields.value(PATENTE), "ABCD12");
        assert_eq!(fields.value(FECHA_EMISION), "15/DIC/2024");
        assert_eq!(fields.value(CORRELATIVO), "AB-123456");
        assert_eq!(fields.value(CODIGO_INFORME), "CIT-2024-01");
        assert_eq!(fields.value(VALIDO_HASTA), "DIC/2025");
        assert_eq!(fields.value(TIPO_VEHICULO), "AUTOMOVIL");
        assert_eq!(fields.value(MARCA), "TOYOTA");
        assert_eq!(fields.value(ANIO), "2020");
        assert_eq!(fields.value(MODELO), "COROLLA XLI");
        assert_eq!(fields.value(COLOR), "BLANCO");
        assert_eq!(fields.value(VIN), "JTDBR32E123456789");
        assert_eq!(fields.value(MOTOR), "1ZZ1234567");
        assert_eq!(fields.value(FIRMADO_POR), "JUAN PEREZ");

        let issues = HomologacionExtractor.validate(&fields, &mut ctx);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn motor_without_suffix_stays_on_its_line() {
        let text = "Nº MOTOR 1ZZ1234567\nFirmado por: X";
        assert_eq!(capture_or_empty(text, &RE_MOTOR), "1ZZ1234567");
    }

    #[test]
    fn motor_el_suffix_is_stripped() {
        let text = SAMPLE.replace("1ZZ1234567 C\n", "1ZZ1234567 El\n");
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        assert_eq!(fields.value(MOTOR), "1ZZ1234567");
        assert!(HomologacionExtractor.validate(&fields, &mut ctx).is_empty());
    }

    #[test]
    fn truncated_motor_suffix_is_malformed() {
        let mut ctx = TaskContext::new(0, "h.pdf");
        let mut fields = HomologacionExtractor.extract(SAMPLE, &mut ctx).unwrap();
        fields.set(MOTOR, "1ZZ1234567 E".to_string());
        let issues = HomologacionExtractor.validate(&fields, &mut ctx);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].field, MOTOR);
        assert_eq!(issues[0].kind, ErrorKind::MalformedField);
    }

    #[test]
    fn two_token_motor_is_accepted() {
        let text = SAMPLE.replace("1ZZ1234567 C\n", "2NZ 7654321\n");
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        assert_eq!(fields.value(MOTOR), "2NZ 7654321");
        assert!(HomologacionExtractor.validate(&fields, &mut ctx).is_empty());
    }

    #[test]
    fn uppercase_signer_label() {
        let text = SAMPLE.replace(
            "Firmado por: JUAN PEREZ 15/12/2024 AUDITORÍA\n",
            "FIRMADO POR: JUAN PEREZ 15/12/2024\n",
        );
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        assert_eq!(fields.value(FIRMADO_POR), "JUAN PEREZ");
    }

    #[test]
    fn labels_match_in_any_case() {
        let text = SAMPLE
            .replace("FECHA DE EMISIÓN", "Fecha de Emisión")
            .replace("Nº CORRELATIVO", "Nº Correlativo")
            .replace("CÓDIGO DE INFORME TÉCNICO", "Código de Informe Técnico")
            .replace("PATENTE", "Patente")
            .replace("VÁLIDO HASTA", "Válido Hasta")
            .replace("TIPO DE VEHÍCULO", "Tipo de Vehículo")
            .replace("MARCA", "Marca")
            .replace("AÑO", "Año")
            .replace("MODELO", "Modelo")
            .replace("COLOR", "Color")
            .replace("VIN ", "Vin ")
            .replace("Nº MOTOR", "Nº Motor");
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        assert_eq!(fields.value(PATENTE), "ABCD12");
        assert_eq!(fields.value(MARCA), "TOYOTA");
        assert_eq!(fields.value(MODELO), "COROLLA XLI");
        assert_eq!(fields.value(COLOR), "BLANCO");
        assert_eq!(fields.value(VIN), "JTDBR32E123456789");
        assert_eq!(fields.value(MOTOR), "1ZZ1234567");
        let issues = HomologacionExtractor.validate(&fields, &mut ctx);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn title_between_header_and_reemplaza() {
        assert_eq!(HomologacionExtractor.title(SAMPLE).as_deref(), Some("INDIVIDUAL"));
        assert_eq!(HomologacionExtractor.title("no title here"), None);
    }

    #[test]
    fn missing_vin_is_reported() {
        let text = SAMPLE.replace("VIN JTDBR32E123456789\n", "");
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        let issues = HomologacionExtractor.validate(&fields, &mut ctx);
        assert!(issues
            .iter()
            .any(|i| i.field == VIN && i.kind == ErrorKind::MissingRequiredField));
    }

    #[test]
    fn malformed_emission_date() {
        let text = SAMPLE.replace("15/DIC/2024", "2024/12/15");
        let mut ctx = TaskContext::new(0, "h.pdf");
        let fields = HomologacionExtractor.extract(&text, &mut ctx).unwrap();
        let issues = HomologacionExtractor.validate(&fields, &mut ctx);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].kind, ErrorKind::MalformedField);
        assert_eq!(issues[0].field, FECHA_EMISION);
    }

    #[test]
    fn patterns_cover_every_data_column() {
        let patterns = HomologacionExtractor.patterns();
        assert_eq!(patterns.len(), DESCRIPTOR.columns.len() - 1);
    }
}
