//! Export form discovery
//!
//! The export page is parsed once with `scraper` into an owned model of its
//! forms. Everything downstream (payload extraction, field-name guessing,
//! format coercion) works on that model, so no parser state is held across
//! requests.

use crate::error::{Error, Result};
use scraper::{ElementRef, Html, Selector};

/// An `<input>` element
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputField {
    /// `name` attribute
    pub name: Option<String>,
    /// Lowercased `type` attribute ("text" when absent)
    pub kind: String,
    /// `value` attribute
    pub value: Option<String>,
    /// Whether the `checked` attribute is present
    pub checked: bool,
}

/// An `<option>` inside a `<select>`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectOption {
    /// `value` attribute
    pub value: Option<String>,
    /// Trimmed text content
    pub label: String,
    /// Whether the `selected` attribute is present
    pub selected: bool,
}

/// A `<select>` element
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectField {
    /// `name` attribute
    pub name: Option<String>,
    /// Options in document order
    pub options: Vec<SelectOption>,
}

/// A `<textarea>` element
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextareaField {
    /// `name` attribute
    pub name: Option<String>,
    /// Text content
    pub text: String,
}

/// One `<form>` and the data-bearing elements inside it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HtmlForm {
    /// `action` attribute
    pub action: Option<String>,
    /// Visible text, whitespace-joined
    pub text: String,
    inputs: Vec<InputField>,
    selects: Vec<SelectField>,
    textareas: Vec<TextareaField>,
}

impl HtmlForm {
    /// `<input>` elements in document order
    pub fn inputs(&self) -> &[InputField] {
        &self.inputs
    }

    /// `<select>` elements in document order
    pub fn selects(&self) -> &[SelectField] {
        &self.selects
    }

    /// `<textarea>` elements in document order
    pub fn textareas(&self) -> &[TextareaField] {
        &self.textareas
    }

    /// Whether the form has a `<select>` with the given name
    pub fn has_select_named(&self, name: &str) -> bool {
        self.selects.iter().any(|s| s.name.as_deref() == Some(name))
    }

    fn from_element(form: ElementRef<'_>, sel: &Selectors) -> Self {
        let inputs = form
            .select(&sel.input)
            .map(|el| {
                let attrs = el.value();
                InputField {
                    name: attrs.attr("name").map(str::to_string),
                    kind: attrs.attr("type").unwrap_or("text").to_ascii_lowercase(),
                    value: attrs.attr("value").map(str::to_string),
                    checked: attrs.attr("checked").is_some(),
                }
            })
            .collect();

        let selects = form
            .select(&sel.select)
            .map(|el| SelectField {
                name: el.value().attr("name").map(str::to_string),
                options: el
                    .select(&sel.option)
                    .map(|opt| SelectOption {
                        value: opt.value().attr("value").map(str::to_string),
                        label: opt.text().collect::<String>().trim().to_string(),
                        selected: opt.value().attr("selected").is_some(),
                    })
                    .collect(),
            })
            .collect();

        let textareas = form
            .select(&sel.textarea)
            .map(|el| TextareaField {
                name: el.value().attr("name").map(str::to_string),
                text: el.text().collect(),
            })
            .collect();

        let text = form
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            action: form.value().attr("action").map(str::to_string),
            text,
            inputs,
            selects,
            textareas,
        }
    }
}

struct Selectors {
    form: Selector,
    input: Selector,
    select: Selector,
    option: Selector,
    textarea: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            form: selector("form")?,
            input: selector("input")?,
            select: selector("select")?,
            option: selector("option")?,
            textarea: selector("textarea")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector '{css}': {e}")))
}

/// Every `<form>` in the document, in document order
pub fn find_forms(html: &str) -> Result<Vec<HtmlForm>> {
    let sel = Selectors::new()?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&sel.form)
        .map(|form| HtmlForm::from_element(form, &sel))
        .collect())
}

/// Pick the form that requests the export
///
/// Priority: the first form with a `<select>` named `year` or `month`, then
/// the first form whose text mentions "export", then the first form.
pub fn locate_export_form(html: &str) -> Result<HtmlForm> {
    let mut forms = find_forms(html)?;
    if forms.is_empty() {
        return Err(Error::NoFormFound);
    }

    let index = forms
        .iter()
        .position(|f| f.has_select_named("year") || f.has_select_named("month"))
        .or_else(|| {
            forms
                .iter()
                .position(|f| f.text.to_lowercase().contains("export"))
        })
        .unwrap_or(0);

    Ok(forms.swap_remove(index))
}
