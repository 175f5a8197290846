//! Small text helpers shared by the extractors, the pipeline and the sink.
//!
//! Each helper is a pure `&str → String` function so they can be unit tested
//! in isolation and combined freely by the per-format extractors.

use once_cell::sync::Lazy;
use regex::Regex;

/// First capture group of the first match, trimmed; `None` when there is no
/// match or the group is empty.
pub fn capture(text: &str, re: &Regex) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// [`capture`], with `""` for a miss.
pub fn capture_or_empty(text: &str, re: &Regex) -> String {
    capture(text, re).unwrap_or_default()
}

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n|\r").unwrap());

/// Replace every line break with a single space.
pub fn flatten_lines(text: &str) -> String {
    RE_LINE_BREAKS.replace_all(text, " ").into_owned()
}

static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace (including newlines) into one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Split a plate such as `"LXWJ75-4"` into plate and check digit.
///
/// Hyphens and spaces are removed first. Exactly six characters (or fewer)
/// means there is no check digit; anything beyond six is the check digit.
pub fn split_plate_check_digit(value: &str) -> (String, Option<String>) {
    let cleaned: String = value.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if cleaned.chars().count() > 6 {
        let plate: String = cleaned.chars().take(6).collect();
        let check: String = cleaned.chars().skip(6).collect();
        (plate, Some(check))
    } else {
        (cleaned, None)
    }
}

static RE_UNSAFE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

/// Make an uploaded file name safe to echo back and to use as a path
/// component: basename only, no `..`, reserved characters replaced by `_`,
/// truncated to `max_len` characters keeping the extension.
pub fn safe_filename(name: &str, max_len: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let base = base.replace("..", "");
    let mut safe = RE_UNSAFE_FILENAME.replace_all(&base, "_").into_owned();

    if safe.chars().count() > max_len {
        let (stem, ext) = match safe.rfind('.') {
            Some(i) if i > 0 => (safe[..i].to_string(), safe[i..].to_string()),
            _ => (safe.clone(), String::new()),
        };
        let keep = max_len.saturating_sub(ext.chars().count());
        safe = stem.chars().take(keep).collect::<String>() + &ext;
    }

    if safe.is_empty() {
        "unnamed".to_string()
    } else {
        safe
    }
}

/// Strip Spanish diacritics (`á → a`, `Ñ → N`, `ü → u`).
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

static RE_NAME_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-_().]").unwrap());
static RE_TRAILING_A: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+A$").unwrap());

/// Turn a display name into an artifact file stem: accents folded,
/// disallowed characters replaced by `_`, trailing `" A"` dropped.
pub fn sanitize_name(text: &str) -> String {
    let folded = fold_accents(text);
    let replaced = RE_NAME_DISALLOWED.replace_all(&folded, "_");
    RE_TRAILING_A.replace(replaced.trim(), "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_trims_and_rejects_empty() {
        let re = Regex::new(r"KEY:\s*(\w*)").unwrap();
        assert_eq!(capture("KEY:  abc  ", &re).as_deref(), Some("abc"));
        assert_eq!(capture("KEY: ", &re), None);
        assert_eq!(capture_or_empty("nothing", &re), "");
    }

    #[test]
    fn flatten_and_collapse() {
        assert_eq!(flatten_lines("a\r\nb\rc\nd"), "a b c d");
        assert_eq!(collapse_whitespace("  COROLLA\n   XLI  "), "COROLLA XLI");
    }

    #[test]
    fn plate_with_check_digit() {
        assert_eq!(
            split_plate_check_digit("LXWJ75-4"),
            ("LXWJ75".to_string(), Some("4".to_string()))
        );
        assert_eq!(
            split_plate_check_digit("TWGV11 - 7"),
            ("TWGV11".to_string(), Some("7".to_string()))
        );
        assert_eq!(split_plate_check_digit("THJL54"), ("THJL54".to_string(), None));
    }

    #[test]
    fn safe_filename_strips_paths_and_reserved_chars() {
        assert_eq!(safe_filename("../../etc/passwd", 255), "passwd");
        assert_eq!(safe_filename(r"C:\docs\a:b?.pdf", 255), "a_b_.pdf");
        assert_eq!(safe_filename("", 255), "unnamed");
    }

    #[test]
    fn safe_filename_truncates_keeping_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let safe = safe_filename(&long, 20);
        assert_eq!(safe.chars().count(), 20);
        assert!(safe.ends_with(".pdf"));
    }

    #[test]
    fn sanitize_display_names() {
        assert_eq!(
            sanitize_name("Certificado de Revisión Técnica (CRT)"),
            "Certificado de Revision Tecnica (CRT)"
        );
        assert_eq!(sanitize_name("Permiso de Circulación"), "Permiso de Circulacion");
        assert_eq!(sanitize_name("Lista A"), "Lista");
    }
}
