//! JSON extractors
//!
//! `JsonPointerExtractor` reads API responses. `EmbeddedJsonExtractor`
//! reads pages that inline their state as `marker={...};` inside a script.

use crate::extract::{copy_document_fields, records_from_value, ExtractError, Extractor};
use crate::state::Record;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Extracts the records found at a JSON pointer of a JSON body
#[derive(Debug, Clone)]
pub struct JsonPointerExtractor {
    pointer: String,
    drop_fields: Vec<String>,
    copy_fields: BTreeMap<String, String>,
}

impl JsonPointerExtractor {
    pub fn new(pointer: impl Into<String>, drop_fields: Vec<String>) -> Self {
        Self {
            pointer: pointer.into(),
            drop_fields,
            copy_fields: BTreeMap::new(),
        }
    }

    /// Sets record fields copied from pointers into the whole response
    pub fn with_copied_fields(mut self, copy_fields: BTreeMap<String, String>) -> Self {
        self.copy_fields = copy_fields;
        self
    }
}

impl Extractor for JsonPointerExtractor {
    fn extract(&self, body: &str) -> Result<Vec<Record>, ExtractError> {
        let document: Record = serde_json::from_str(body)?;

        if document.pointer(&self.pointer).is_none() {
            tracing::debug!("No value at {} in response", self.pointer);
        }

        let mut records = records_from_value(document.pointer(&self.pointer), &self.drop_fields);
        copy_document_fields(&mut records, &document, &self.copy_fields);
        Ok(records)
    }
}

/// Extracts records from JSON embedded in an inline script
///
/// The last `<script>` containing the marker wins. Pages without such a
/// script are empty pages, not errors.
#[derive(Debug, Clone)]
pub struct EmbeddedJsonExtractor {
    marker: String,
    pointer: String,
    drop_fields: Vec<String>,
    copy_fields: BTreeMap<String, String>,
}

impl EmbeddedJsonExtractor {
    pub fn new(marker: impl Into<String>, pointer: impl Into<String>, drop_fields: Vec<String>) -> Self {
        Self {
            marker: marker.into(),
            pointer: pointer.into(),
            drop_fields,
            copy_fields: BTreeMap::new(),
        }
    }

    /// Sets record fields copied from pointers into the embedded document
    pub fn with_copied_fields(mut self, copy_fields: BTreeMap<String, String>) -> Self {
        self.copy_fields = copy_fields;
        self
    }

    /// Returns the text of the last script containing the marker
    fn find_script(&self, body: &str) -> Option<String> {
        let document = Html::parse_document(body);
        let selector = Selector::parse("script").ok()?;

        document
            .select(&selector)
            .map(|script| script.text().collect::<String>())
            .filter(|text| text.contains(&self.marker))
            .last()
    }

    /// Parses the first JSON value following the marker
    ///
    /// Anything after the value (a trailing `;` or further statements) is
    /// ignored.
    fn parse_assignment(&self, script: &str) -> Result<Record, ExtractError> {
        let start = script
            .find(&self.marker)
            .map(|idx| idx + self.marker.len())
            .ok_or_else(|| ExtractError::Unexpected(format!("marker '{}' vanished", self.marker)))?;

        let mut values = serde_json::Deserializer::from_str(script[start..].trim_start())
            .into_iter::<Record>();

        match values.next() {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(ExtractError::EmbeddedJson {
                marker: self.marker.clone(),
                message: e.to_string(),
            }),
            None => Err(ExtractError::EmbeddedJson {
                marker: self.marker.clone(),
                message: "no value after marker".to_string(),
            }),
        }
    }
}

impl Extractor for EmbeddedJsonExtractor {
    fn extract(&self, body: &str) -> Result<Vec<Record>, ExtractError> {
        let Some(script) = self.find_script(body) else {
            tracing::debug!("No script containing '{}' on page", self.marker);
            return Ok(Vec::new());
        };

        let state = self.parse_assignment(&script)?;
        let mut records = records_from_value(state.pointer(&self.pointer), &self.drop_fields);
        copy_document_fields(&mut records, &state, &self.copy_fields);
        Ok(records)
    }
}
