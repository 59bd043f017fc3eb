//! Export form payload construction
//!
//! A browser submitting the export form would send every data-bearing field
//! with its current value. [`build_payload`] reproduces that, then the two
//! heuristics adjust it: the year/month fields get the requested month, and
//! the output-format field is pushed toward the XML variant.

use crate::form::{HtmlForm, SelectField};
use crate::types::Month;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Field name to submitted value
pub type Payload = BTreeMap<String, String>;

/// Input types that carry no data or need a real upload
const SKIPPED_INPUT_TYPES: [&str; 4] = ["submit", "button", "image", "file"];

/// Options needed before a select counts as a year or month selector
const MIN_DATE_OPTIONS: usize = 5;

/// Options shown per select when format coercion fails
const CANDIDATE_PREVIEW: usize = 8;

/// Located export form reduced to what the submission needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormSpec {
    /// The form's `action` attribute, "/export" when absent
    pub action: String,
    /// Default field values
    pub fields: Payload,
}

impl FormSpec {
    /// Read the action and default payload of a located form
    pub fn from_form(form: &HtmlForm) -> Self {
        Self {
            action: form.action.clone().unwrap_or_else(|| "/export".to_string()),
            fields: build_payload(form),
        }
    }

    /// Fields as ordered pairs for form encoding
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Names of the fields carrying year and month
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateFieldNames {
    /// Year field name
    pub year: String,
    /// Month field name
    pub month: String,
}

impl Default for DateFieldNames {
    fn default() -> Self {
        Self {
            year: "year".into(),
            month: "month".into(),
        }
    }
}

/// Result of trying to force the XML output format
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatCoercion {
    /// A select option mentioning XML was chosen
    Select {
        /// Field name
        field: String,
        /// Submitted value
        value: String,
    },
    /// A radio button whose value mentions XML was chosen
    Radio {
        /// Field name
        field: String,
        /// Submitted value
        value: String,
    },
    /// Nothing looked like XML; payload untouched
    NotFound {
        /// Every named select with its `(value, label)` options
        candidates: Vec<(String, Vec<(String, String)>)>,
    },
}

impl FormatCoercion {
    /// Whether the payload now requests XML
    pub fn applied(&self) -> bool {
        !matches!(self, FormatCoercion::NotFound { .. })
    }
}

/// Default name-to-value mapping a browser would submit
pub fn build_payload(form: &HtmlForm) -> Payload {
    let mut data = Payload::new();

    for input in form.inputs() {
        let Some(name) = input.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        let kind = input.kind.as_str();
        if SKIPPED_INPUT_TYPES.contains(&kind) {
            continue;
        }
        let value = input.value.clone().unwrap_or_default();
        if kind == "checkbox" || kind == "radio" {
            if input.checked {
                let value = if value.is_empty() { "1".to_string() } else { value };
                data.insert(name.to_string(), value);
            }
            continue;
        }
        data.insert(name.to_string(), value);
    }

    for select in form.selects() {
        let Some(name) = select.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        let chosen = select
            .options
            .iter()
            .find(|o| o.selected)
            .or_else(|| select.options.first());
        if let Some(option) = chosen {
            let value = option.value.clone().unwrap_or_else(|| option.label.clone());
            data.insert(name.to_string(), value);
        }
    }

    for textarea in form.textareas() {
        let Some(name) = textarea.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        data.insert(name.to_string(), textarea.text.clone());
    }

    data
}

fn is_year_like(label: &str) -> bool {
    label.len() == 4 && label.bytes().all(|b| b.is_ascii_digit())
}

fn is_month_like(label: &str) -> bool {
    !label.is_empty()
        && label.bytes().all(|b| b.is_ascii_digit())
        && label.parse::<u32>().is_ok_and(|n| (1..=12).contains(&n))
}

/// Guess which selects hold the year and month
///
/// A select with at least five 4-digit options is a year field; one with at
/// least five options in 1..=12 is a month field. When several qualify the
/// last one wins. Unmatched names default to "year"/"month".
pub fn guess_year_month_field_names(form: &HtmlForm) -> DateFieldNames {
    let mut names = DateFieldNames::default();

    for select in form.selects() {
        let Some(name) = select.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        let labels = || select.options.iter().map(|o| o.label.as_str());
        if labels().filter(|l| is_year_like(l)).count() >= MIN_DATE_OPTIONS {
            names.year = name.to_string();
        }
        if labels().filter(|l| is_month_like(l)).count() >= MIN_DATE_OPTIONS {
            names.month = name.to_string();
        }
    }

    names
}

/// Overwrite the year/month fields with the requested month
pub fn apply_month(payload: &mut Payload, names: &DateFieldNames, month: Month) {
    payload.insert(names.year.clone(), month.year().to_string());
    payload.insert(names.month.clone(), month.month().to_string());
}

/// Named radio inputs grouped by name, groups in order of first appearance
fn radio_groups(form: &HtmlForm) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for input in form.inputs().iter().filter(|i| i.kind == "radio") {
        let Some(name) = input.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        let value = input.value.clone().unwrap_or_default();
        match groups.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value),
            None => groups.push((name.to_string(), vec![value])),
        }
    }
    groups
}

/// Point the output-format field at XML
///
/// Selects are scanned first, in document order, for an option whose value or
/// label contains "xml" (case-insensitive); the first hit wins and nothing
/// after it is considered. Failing that, radio groups are tried one name at a
/// time, in order of first appearance, for a value containing "xml". If neither matches, the payload is left alone and the
/// select candidates are logged and returned.
pub fn force_output_format_xml(form: &HtmlForm, payload: &mut Payload) -> FormatCoercion {
    let named_selects = || {
        form.selects()
            .iter()
            .filter_map(|s| s.name.as_deref().filter(|n| !n.is_empty()).map(|n| (n, s)))
    };

    for (name, select) in named_selects() {
        for option in &select.options {
            let value = option.value.as_deref().unwrap_or("");
            if contains_xml(value) || contains_xml(&option.label) {
                let chosen = if value.is_empty() {
                    option.label.clone()
                } else {
                    value.to_string()
                };
                payload.insert(name.to_string(), chosen.clone());
                info!(field = name, value = %chosen, "Set output format field to XML");
                return FormatCoercion::Select {
                    field: name.to_string(),
                    value: chosen,
                };
            }
        }
    }

    for (name, values) in radio_groups(form) {
        if let Some(value) = values.into_iter().find(|v| contains_xml(v)) {
            payload.insert(name.clone(), value.clone());
            info!(field = %name, value = %value, "Set radio output format field to XML");
            return FormatCoercion::Radio { field: name, value };
        }
    }

    let candidates: Vec<(String, Vec<(String, String)>)> = named_selects()
        .map(|(name, select)| (name.to_string(), option_pairs(select)))
        .collect();

    warn!("Could not auto-detect XML output format field");
    for (name, options) in &candidates {
        let preview = options
            .iter()
            .take(CANDIDATE_PREVIEW)
            .map(|(v, l)| format!("{v:?}:{l:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        warn!(field = %name, options = %preview, "Candidate select (first 8 options)");
    }

    FormatCoercion::NotFound { candidates }
}

fn contains_xml(s: &str) -> bool {
    s.to_ascii_lowercase().contains("xml")
}

fn option_pairs(select: &SelectField) -> Vec<(String, String)> {
    select
        .options
        .iter()
        .map(|o| (o.value.clone().unwrap_or_default(), o.label.clone()))
        .collect()
}
