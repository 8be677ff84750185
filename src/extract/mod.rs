//! Extractors turning fetched page payloads into records
//!
//! An extractor receives the body of exactly one page and returns zero or
//! more records. Returning no records is a legitimate outcome (an empty
//! page); an error means the payload could not be interpreted.
//!
//! Three configurable extractors are provided:
//! - `HtmlExtractor`: one record per row matched by a CSS selector
//! - `JsonPointerExtractor`: the array at a JSON pointer of a JSON body
//! - `EmbeddedJsonExtractor`: JSON assigned inside an inline `<script>`
//!
//! The JSON extractors can also copy values from elsewhere in the document
//! into every record (e.g. a page-level seller name).

mod html;
mod json;

pub use html::{FieldExtractor, HtmlExtractor};
pub use json::{EmbeddedJsonExtractor, JsonPointerExtractor};

use crate::config::ExtractorConfig;
use crate::state::Record;
use crate::ConfigError;
use scraper::Selector;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a payload cannot be interpreted
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Script marker '{marker}' is not followed by valid JSON: {message}")]
    EmbeddedJson { marker: String, message: String },

    #[error("Unexpected payload: {0}")]
    Unexpected(String),
}

/// Turns one page payload into records
pub trait Extractor: Send + Sync {
    /// Extracts the records of one page
    fn extract(&self, body: &str) -> Result<Vec<Record>, ExtractError>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Result<Vec<Record>, ExtractError> + Send + Sync,
{
    fn extract(&self, body: &str) -> Result<Vec<Record>, ExtractError> {
        self(body)
    }
}

/// Parses a CSS selector, mapping failures to a configuration error
pub fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Builds the extractor described by a job's configuration
///
/// # Arguments
///
/// * `config` - The extractor section of a job
///
/// # Returns
///
/// * `Ok(Arc<dyn Extractor>)` - A shareable extractor
/// * `Err(ConfigError)` - A selector failed to compile
pub fn build_extractor(config: &ExtractorConfig) -> Result<Arc<dyn Extractor>, ConfigError> {
    let extractor: Arc<dyn Extractor> = match config {
        ExtractorConfig::Html {
            row_selector,
            fields,
        } => Arc::new(HtmlExtractor::from_config(row_selector, fields)?),
        ExtractorConfig::Json {
            pointer,
            drop_fields,
            copy_fields,
        } => Arc::new(
            JsonPointerExtractor::new(pointer, drop_fields.clone())
                .with_copied_fields(copy_fields.clone()),
        ),
        ExtractorConfig::EmbeddedJson {
            marker,
            pointer,
            drop_fields,
            copy_fields,
        } => Arc::new(
            EmbeddedJsonExtractor::new(marker, pointer, drop_fields.clone())
                .with_copied_fields(copy_fields.clone()),
        ),
    };

    Ok(extractor)
}

/// Turns the value found at a pointer into records
///
/// A missing or null value yields no records, an array yields its elements,
/// anything else is a single record. Listed fields are removed from object
/// records.
pub(crate) fn records_from_value(value: Option<&Record>, drop_fields: &[String]) -> Vec<Record> {
    let mut records = match value {
        None | Some(Record::Null) => Vec::new(),
        Some(Record::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    if !drop_fields.is_empty() {
        for record in &mut records {
            if let Record::Object(map) = record {
                for field in drop_fields {
                    map.remove(field);
                }
            }
        }
    }

    records
}

/// Sets each listed field of object records to the value at a pointer into
/// the whole document
///
/// Fields whose pointer is missing or null are left untouched.
pub(crate) fn copy_document_fields(
    records: &mut [Record],
    document: &Record,
    copy_fields: &BTreeMap<String, String>,
) {
    for (field, pointer) in copy_fields {
        let Some(value) = document.pointer(pointer).filter(|value| !value.is_null()) else {
            continue;
        };
        for record in records.iter_mut() {
            if let Record::Object(map) = record {
                map.insert(field.clone(), value.clone());
            }
        }
    }
}
