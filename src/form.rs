//! HTML form extraction
//!
//! Both the gateway's SAML request and Okta's SAML response arrive as an
//! auto-submitting HTML form. We only need the first form's action and the
//! values of its named inputs.

use crate::error::LoginError;
use scraper::{Html, Selector};
use indexmap::IndexMap;
use std::sync::LazyLock;

static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("static selector"));
static INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input").expect("static selector"));

/// Action URL plus named input values of a form, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDescriptor {
    pub action: String,
    pub fields: IndexMap<String, String>,
}

impl FormDescriptor {
    /// Fail unless `name` is one of the form's fields
    pub fn require_field(&self, name: &str) -> Result<&str, LoginError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| LoginError::missing(format!("form field {}", name)))
    }

    /// Action URL with the fields appended as a query string
    pub fn to_get_url(&self) -> Result<String, LoginError> {
        let mut url = url::Url::parse(&self.action).map_err(|e| {
            LoginError::MalformedResponse(format!("invalid form action: {}", e))
        })?;
        url.query_pairs_mut().extend_pairs(self.fields.iter());
        Ok(url.into())
    }
}

/// Parse `html` leniently and describe its first `<form>`
///
/// Inputs without a `name` are ignored, inputs without a `value` map to an
/// empty string, and a repeated name keeps its first position but the last
/// value.
pub fn extract_form(html: &str) -> Result<FormDescriptor, LoginError> {
    let document = Html::parse_document(html);
    let form = document
        .select(&FORM)
        .next()
        .ok_or_else(|| LoginError::missing("<form> element"))?;

    let action = form
        .value()
        .attr("action")
        .ok_or_else(|| LoginError::missing("form action"))?
        .to_string();

    let mut fields = IndexMap::new();
    for input in form.select(&INPUT) {
        if let Some(name) = input.value().attr("name") {
            let value = input.value().attr("value").unwrap_or_default();
            fields.insert(name.to_string(), value.to_string());
        }
    }

    Ok(FormDescriptor { action, fields })
}
