//! Deterministic applicant checks.
//!
//! Everything here is pure: format rules for identity fields, word-set name
//! similarity, age bounds and the composition of those into a
//! [`ValidationReport`]. Failures accumulate in the report instead of
//! aborting, so one malformed field never hides another.
use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use crate::models::{DocumentExtraction, PersonalInfo};

pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 120;
/// Below this ratio a name mismatch is reported as a warning.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Below this extraction confidence a document is flagged.
pub const DOCUMENT_CONFIDENCE_THRESHOLD: f64 = 0.8;

const REQUIRED_DOCUMENT_FIELDS: [&str; 3] = ["name", "id_number", "birth_date"];

static CURP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{4}[0-9]{6}[HM][A-Z]{5}[0-9A-Z][0-9]$").expect("valid CURP pattern")
});
static RFC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-ZÑ&]{3,4}[0-9]{6}[A-Z0-9]{3}$").expect("valid RFC pattern")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?(52)?[0-9]{10}$").expect("valid phone pattern"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});
static DATE_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date pattern"));

/// Failures raised by the individual checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unparsable date or malformed field.
    Format(String),
    /// Value parsed but falls outside accepted bounds.
    Range(String),
    /// Stated identity disagrees with the document.
    Mismatch(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Format(msg)
            | ValidationError::Range(msg)
            | ValidationError::Mismatch(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ValidationError {}

// ============ Field Validator ============

/// A registered format rule for one identity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Population-registry key: 4 letters, 6 digits, H/M, 5 letters, 1 alnum, 1 digit.
    Curp,
    /// Tax identifier: 3-4 letters (Ñ and & allowed), 6 digits, 3 alnum.
    Rfc,
    /// Optional `+`, optional `52`, then 10 digits.
    Phone,
    Email,
}

impl FieldRule {
    /// Looks up the rule registered for a field name.
    pub fn for_field(field: &str) -> Option<Self> {
        match field {
            "curp" | "national_id" => Some(FieldRule::Curp),
            "rfc" | "tax_id" => Some(FieldRule::Rfc),
            "phone" => Some(FieldRule::Phone),
            "email" => Some(FieldRule::Email),
            _ => None,
        }
    }

    pub fn pattern(&self) -> &'static str {
        self.regex().as_str()
    }

    fn regex(&self) -> &'static Regex {
        match self {
            FieldRule::Curp => &*CURP_RE,
            FieldRule::Rfc => &*RFC_RE,
            FieldRule::Phone => &*PHONE_RE,
            FieldRule::Email => &*EMAIL_RE,
        }
    }

    /// Whole-string match.
    pub fn matches(&self, value: &str) -> bool {
        self.regex().is_match(value)
    }
}

/// Checks `value` against the rule registered for `field`.
///
/// Returns `None` when the field has no rule; unknown fields are not an error.
pub fn validate_field(field: &str, value: &str) -> Option<bool> {
    FieldRule::for_field(field).map(|rule| rule.matches(value))
}

// ============ Name Similarity ============

fn name_words(name: &str) -> HashSet<String> {
    let cleaned: String = name
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .collect();

    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Jaccard index over the normalized word sets of two names.
///
/// Names are uppercased and stripped of everything except ASCII letters and
/// whitespace. Returns 0.0 if either side has no words.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let words_a = name_words(a);
    let words_b = name_words(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    intersection as f64 / union as f64
}

// ============ Age ============

/// Parses a birth date in strict `YYYY-MM-DD` form.
pub fn parse_birth_date(birth_date: &str) -> Result<NaiveDate, ValidationError> {
    if birth_date.is_empty() {
        return Err(ValidationError::Format("Birth date is required".to_string()));
    }

    if !DATE_SHAPE_RE.is_match(birth_date) {
        return Err(ValidationError::Format(
            "Invalid date format (YYYY-MM-DD)".to_string(),
        ));
    }

    NaiveDate::parse_from_str(birth_date, "%Y-%m-%d")
        .map_err(|_| ValidationError::Format("Invalid date format (YYYY-MM-DD)".to_string()))
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Parses `birth_date` and checks the resulting age against [18, 120] as of `today`.
pub fn validate_age_on(birth_date: &str, today: NaiveDate) -> Result<u32, ValidationError> {
    let birth = parse_birth_date(birth_date)?;
    let age = age_on(birth, today);

    if age < MIN_AGE {
        return Err(ValidationError::Range(format!(
            "Minimum age required: {} years",
            MIN_AGE
        )));
    }
    if age > MAX_AGE {
        return Err(ValidationError::Range(format!("Invalid age: {}", age)));
    }

    Ok(age as u32)
}

// ============ Personal-Info Validation ============

/// Outcome of comparing one applicant field against the document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMatch {
    Exact(bool),
    Similarity(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub field_matches: BTreeMap<String, FieldMatch>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            field_matches: BTreeMap::new(),
        }
    }
}

impl ValidationReport {
    fn reject(&mut self, error: impl ToString) {
        self.errors.push(error.to_string());
        self.valid = false;
    }
}

fn check_id_match(stated: &str, extracted: &str) -> Result<(), ValidationError> {
    if stated == extracted {
        Ok(())
    } else {
        Err(ValidationError::Mismatch(
            "ID number does not match document".to_string(),
        ))
    }
}

/// Validates the applicant's data against format rules, the first extracted
/// document (if any) and the age bounds, as of `today`.
pub fn validate_personal_info_on(
    info: &PersonalInfo,
    documents: &[DocumentExtraction],
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (field, value) in info.pattern_fields() {
        if validate_field(field, value) == Some(false) {
            report.reject(ValidationError::Format(format!(
                "Invalid format for {}: {}",
                field, value
            )));
        }
    }

    if let Some(document) = documents.first() {
        let extracted = &document.extracted_fields;

        if let Some(extracted_name) = extracted.name.as_deref() {
            let similarity = name_similarity(&info.name, extracted_name);
            report
                .field_matches
                .insert("name".to_string(), FieldMatch::Similarity(similarity));

            if similarity < NAME_SIMILARITY_THRESHOLD {
                report
                    .warnings
                    .push(format!("Low name similarity: {:.2}", similarity));
            }
        }

        if let Some(extracted_id) = extracted.id_number.as_deref() {
            let id_check = check_id_match(&info.id_number, extracted_id);
            report
                .field_matches
                .insert("id_number".to_string(), FieldMatch::Exact(id_check.is_ok()));

            if let Err(e) = id_check {
                report.reject(e);
            }
        }
    }

    if let Err(e) = validate_age_on(&info.birth_date, today) {
        report.reject(e);
    }

    tracing::info!(
        "Validation completed: {} errors, {} warnings",
        report.errors.len(),
        report.warnings.len()
    );
    report
}

/// [`validate_personal_info_on`] evaluated against the local calendar date.
pub fn validate_personal_info(
    info: &PersonalInfo,
    documents: &[DocumentExtraction],
) -> ValidationReport {
    validate_personal_info_on(info, documents, Local::now().date_naive())
}

// ============ Document Quality ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuality {
    pub valid: bool,
    pub confidence_threshold: f64,
    pub issues: Vec<String>,
}

/// Flags low-confidence extractions and missing required fields.
pub fn assess_document_quality(extraction: &DocumentExtraction) -> DocumentQuality {
    let mut issues = Vec::new();

    if extraction.confidence_score < DOCUMENT_CONFIDENCE_THRESHOLD {
        issues.push(format!(
            "Low extraction confidence: {:.2}",
            extraction.confidence_score
        ));
    }

    let fields = &extraction.extracted_fields;
    for field in REQUIRED_DOCUMENT_FIELDS {
        let value = match field {
            "name" => fields.name.as_deref(),
            "id_number" => fields.id_number.as_deref(),
            _ => fields.birth_date.as_deref(),
        };
        if value.map_or(true, |v| v.trim().is_empty()) {
            issues.push(format!("Missing required field: {}", field));
        }
    }

    DocumentQuality {
        valid: issues.is_empty(),
        confidence_threshold: DOCUMENT_CONFIDENCE_THRESHOLD,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiAnalysis, ExtractedDocumentFields};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn applicant() -> PersonalInfo {
        PersonalInfo {
            name: "Juan Pérez García".to_string(),
            id_number: "PEGJ900101HDFRRN05".to_string(),
            birth_date: "1990-01-01".to_string(),
            address: "Calle Principal 123".to_string(),
            phone: "+525512345678".to_string(),
            email: Some("juan.perez@example.mx".to_string()),
            curp: None,
            rfc: None,
        }
    }

    fn extraction(name: &str, id_number: &str) -> DocumentExtraction {
        DocumentExtraction {
            document_type: "jpg".to_string(),
            extracted_fields: ExtractedDocumentFields {
                name: Some(name.to_string()),
                id_number: Some(id_number.to_string()),
                birth_date: Some("1990-01-01".to_string()),
                ..Default::default()
            },
            confidence_score: 0.95,
            processing_time: 0.5,
            analysis: AiAnalysis::default(),
        }
    }

    #[test]
    fn curp_shapes() {
        assert_eq!(validate_field("national_id", "ABCD123456HDFXYZ01"), Some(true));
        assert_eq!(validate_field("curp", "ABCD123456MDFXYZA1"), Some(true));
        // lowercase
        assert_eq!(validate_field("curp", "abcd123456HDFXYZ01"), Some(false));
        // gender letter
        assert_eq!(validate_field("curp", "ABCD123456XDFXYZ01"), Some(false));
        // length
        assert_eq!(validate_field("curp", "ABCD123456HDFXYZ0"), Some(false));
        assert_eq!(validate_field("curp", "ABCD123456HDFXYZ011"), Some(false));
    }

    #[test]
    fn rfc_allows_enye_and_ampersand() {
        assert_eq!(validate_field("rfc", "ÑA&B900101AB1"), Some(true));
        assert_eq!(validate_field("tax_id", "ABC900101XY9"), Some(true));
        assert_eq!(validate_field("rfc", "AB900101XY9"), Some(false));
    }

    #[test]
    fn phone_country_code_is_optional() {
        assert_eq!(validate_field("phone", "5512345678"), Some(true));
        assert_eq!(validate_field("phone", "525512345678"), Some(true));
        assert_eq!(validate_field("phone", "+525512345678"), Some(true));
        assert_eq!(validate_field("phone", "+5512345678"), Some(true));
        assert_eq!(validate_field("phone", "+52 55 1234 5678"), Some(false));
        assert_eq!(validate_field("phone", "12345"), Some(false));
    }

    #[test]
    fn unknown_fields_are_not_checked() {
        assert_eq!(validate_field("address", "anything"), None);
    }

    #[test]
    fn similarity_basics() {
        assert_eq!(name_similarity("Juan Perez", "juan perez"), 1.0);
        assert_eq!(name_similarity("", ""), 0.0);
        assert_eq!(name_similarity("Juan", "   "), 0.0);
        assert!((name_similarity("Juan Perez Garcia", "Juan Perez") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_drops_non_ascii_letters() {
        // "PÉREZ" normalizes to "PREZ"
        assert!((name_similarity("Juan Pérez", "Juan Perez") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(name_similarity("O'Brien-Smith", "OBRIENSMITH"), 1.0);
    }

    #[test]
    fn age_bounds() {
        assert!(matches!(
            validate_age_on("2006-06-16", today()),
            Err(ValidationError::Range(_))
        ));
        assert_eq!(validate_age_on("2006-06-15", today()), Ok(18));
        assert_eq!(validate_age_on("1904-06-15", today()), Ok(120));
        assert!(matches!(
            validate_age_on("1903-06-15", today()),
            Err(ValidationError::Range(_))
        ));
    }

    #[test]
    fn age_decrements_before_birthday() {
        let birth = NaiveDate::from_ymd_opt(1990, 12, 31).unwrap();
        assert_eq!(age_on(birth, today()), 33);
        let birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert_eq!(age_on(birth, today()), 34);
    }

    #[test]
    fn age_rejects_bad_formats() {
        for input in ["", "01/01/1990", "1990-1-1", "1990-02-30", " 1990-01-01"] {
            assert!(
                matches!(validate_age_on(input, today()), Err(ValidationError::Format(_))),
                "expected format error for {:?}",
                input
            );
        }
    }

    #[test]
    fn clean_application_is_valid() {
        let info = applicant();
        let docs = vec![extraction("JUAN PEREZ GARCIA", &info.id_number)];
        let report = validate_personal_info_on(&info, &docs, today());

        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(
            report.field_matches.get("id_number"),
            Some(&FieldMatch::Exact(true))
        );
        // accent loss drops "PEREZ"
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Low name similarity"));
    }

    #[test]
    fn errors_accumulate() {
        let info = PersonalInfo {
            phone: "55-1234".to_string(),
            ..applicant()
        };
        let docs = vec![extraction("Juan Garcia", "OTHERID")];
        let report = validate_personal_info_on(&info, &docs, today());

        assert!(!report.valid);
        assert!(report.errors.len() >= 2);
        assert!(report.errors.iter().any(|e| e.contains("phone")));
        assert!(report.errors.contains(&"ID number does not match document".to_string()));
        assert_eq!(
            report.field_matches.get("id_number"),
            Some(&FieldMatch::Exact(false))
        );
    }

    #[test]
    fn only_first_document_is_consulted() {
        let info = applicant();
        let docs = vec![
            extraction("Juan Perez Garcia", &info.id_number),
            extraction("Someone Else", "OTHERID"),
        ];
        let report = validate_personal_info_on(&info, &docs, today());
        assert!(report.valid);
    }

    #[test]
    fn underage_applicant_is_invalid() {
        let info = PersonalInfo {
            birth_date: "2010-01-01".to_string(),
            ..applicant()
        };
        let report = validate_personal_info_on(&info, &[], today());
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Minimum age required: 18 years".to_string()]);
        assert!(report.field_matches.is_empty());
    }

    #[test]
    fn document_quality_flags_issues() {
        let mut doc = extraction("Juan", "ID1");
        assert!(assess_document_quality(&doc).valid);

        doc.confidence_score = 0.5;
        doc.extracted_fields.birth_date = None;
        let quality = assess_document_quality(&doc);
        assert!(!quality.valid);
        assert_eq!(quality.issues.len(), 2);
        assert!(quality.issues.contains(&"Missing required field: birth_date".to_string()));
    }
}
