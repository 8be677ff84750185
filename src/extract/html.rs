//! HTML listing extractor
//!
//! This module handles listings rendered as markup: each element matched by
//! the row selector becomes one record whose fields are read from
//! descendants of that row.

use crate::config::FieldConfig;
use crate::extract::{compile_selector, ExtractError, Extractor};
use crate::state::Record;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde_json::Map;
use std::collections::BTreeMap;

/// Reads one field from a row element
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: String,
    selector: Option<Selector>,
    attr: Option<String>,
    strip_prefix: Option<String>,
    prepend: Option<String>,
}

impl FieldExtractor {
    /// Compiles a field from its configuration
    pub fn from_config(name: &str, config: &FieldConfig) -> Result<Self, ConfigError> {
        let selector = config
            .selector
            .as_deref()
            .map(compile_selector)
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            selector,
            attr: config.attr.clone(),
            strip_prefix: config.strip_prefix.clone(),
            prepend: config.prepend.clone(),
        })
    }

    /// Reads the field from `row`
    ///
    /// Returns `Null` when the selector matches nothing or the attribute is
    /// absent, otherwise the cleaned string value.
    fn read(&self, row: ElementRef<'_>) -> Record {
        let element = match &self.selector {
            Some(selector) => row.select(selector).next(),
            None => Some(row),
        };
        let Some(element) = element else {
            return Record::Null;
        };

        let raw = match &self.attr {
            Some(attr) => match element.value().attr(attr) {
                Some(value) => value.to_string(),
                None => return Record::Null,
            },
            None => collapse_whitespace(&element.text().collect::<String>()),
        };

        let mut value = raw.trim();
        if let Some(prefix) = &self.strip_prefix {
            value = value.strip_prefix(prefix.as_str()).unwrap_or(value).trim();
        }

        match &self.prepend {
            Some(prefix) if !value.is_empty() => Record::String(format!("{}{}", prefix, value)),
            _ => Record::String(value.to_string()),
        }
    }
}

/// Extracts one record per row of an HTML listing
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    row_selector: Selector,
    fields: Vec<FieldExtractor>,
}

impl HtmlExtractor {
    /// Creates an extractor from compiled parts
    pub fn new(row_selector: Selector, fields: Vec<FieldExtractor>) -> Self {
        Self {
            row_selector,
            fields,
        }
    }

    /// Compiles an extractor from its configuration
    pub fn from_config(
        row_selector: &str,
        fields: &BTreeMap<String, FieldConfig>,
    ) -> Result<Self, ConfigError> {
        let row_selector = compile_selector(row_selector)?;
        let fields = fields
            .iter()
            .map(|(name, config)| FieldExtractor::from_config(name, config))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(row_selector, fields))
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, body: &str) -> Result<Vec<Record>, ExtractError> {
        let document = Html::parse_document(body);

        let records = document
            .select(&self.row_selector)
            .map(|row| {
                let mut object = Map::new();
                for field in &self.fields {
                    object.insert(field.name.clone(), field.read(row));
                }
                Record::Object(object)
            })
            .collect();

        Ok(records)
    }
}

/// Joins text fragments and collapses runs of whitespace into single spaces
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LISTING: &str = r#"
        <html><body>
          <div class="table-row">
            <div class="col"><p class="name">Name: Alpha Capital Ltd</p></div>
            <div class="col"><p class="ref">Reference number: F001</p></div>
            <a href="/public-register/firms/alpha">details</a>
          </div>
          <div class="table-row">
            <div class="col"><p class="name">Name:   Beta
               Partners</p></div>
            <div class="col"><p class="ref">Reference number: F002</p></div>
          </div>
        </body></html>
    "#;

    fn field(selector: &str) -> FieldConfig {
        FieldConfig {
            selector: Some(selector.to_string()),
            ..FieldConfig::default()
        }
    }

    fn extractor() -> HtmlExtractor {
        let mut fields = BTreeMap::new();
        fields.insert(
            "name".to_string(),
            FieldConfig {
                strip_prefix: Some("Name:".to_string()),
                ..field(".name")
            },
        );
        fields.insert(
            "referenceNumber".to_string(),
            FieldConfig {
                strip_prefix: Some("Reference number:".to_string()),
                ..field(".ref")
            },
        );
        fields.insert(
            "url".to_string(),
            FieldConfig {
                attr: Some("href".to_string()),
                prepend: Some("https://register.example".to_string()),
                ..field("a")
            },
        );
        HtmlExtractor::from_config(".table-row", &fields).unwrap()
    }

    #[test]
    fn test_extracts_one_record_per_row() {
        let records = extractor().extract(LISTING).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            json!({
                "name": "Alpha Capital Ltd",
                "referenceNumber": "F001",
                "url": "https://register.example/public-register/firms/alpha"
            })
        );
    }

    #[test]
    fn test_whitespace_collapsed_and_missing_attr_is_null() {
        let records = extractor().extract(LISTING).unwrap();

        assert_eq!(records[1]["name"], "Beta Partners");
        assert_eq!(records[1]["url"], Record::Null);
    }

    #[test]
    fn test_no_rows_is_empty_page() {
        let records = extractor()
            .extract("<html><body><p>No firms found</p></body></html>")
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_field_without_selector_reads_row() {
        let mut fields = BTreeMap::new();
        fields.insert("text".to_string(), FieldConfig::default());
        let extractor = HtmlExtractor::from_config("li", &fields).unwrap();

        let records = extractor
            .extract("<ul><li> one </li><li>two</li></ul>")
            .unwrap();
        assert_eq!(records, vec![json!({"text": "one"}), json!({"text": "two"})]);
    }
}
