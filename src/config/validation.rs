use crate::config::types::{
    Config, DetailsConfig, DiscoveryConfig, EngineConfig, ExtractorConfig, HttpConfig, JobConfig,
    OutputConfig,
};
use crate::extract::compile_selector;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on pages in flight at once
const MAX_BATCH_SIZE: usize = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    validate_jobs(&config.jobs)?;
    Ok(())
}

/// Validates engine tuning
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_batch_size(config.batch_size)?;

    if config.page_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "page-attempts must be >= 1, got {}",
            config.page_attempts
        )));
    }

    if config.discovery_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "discovery-attempts must be >= 1, got {}",
            config.discovery_attempts
        )));
    }

    Ok(())
}

fn validate_batch_size(batch_size: usize) -> Result<(), ConfigError> {
    if batch_size < 1 || batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, batch_size
        )));
    }
    Ok(())
}

/// Validates HTTP transport settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dir.is_empty() {
        return Err(ConfigError::Validation(
            "output dir cannot be empty".to_string(),
        ));
    }

    if config.combined_file.is_empty() {
        return Err(ConfigError::Validation(
            "combined-file cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates job entries and their uniqueness
fn validate_jobs(jobs: &[JobConfig]) -> Result<(), ConfigError> {
    if jobs.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[job]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut keys = HashSet::new();

    for job in jobs {
        if !names.insert(job.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate job name '{}'",
                job.name
            )));
        }

        let key = job.job_key();
        if !keys.insert(key.clone()) {
            return Err(ConfigError::Validation(format!(
                "jobs share the key '{}'; set an explicit key on job '{}'",
                key, job.name
            )));
        }

        validate_job(job)?;
    }

    Ok(())
}

/// Validates a single job
fn validate_job(job: &JobConfig) -> Result<(), ConfigError> {
    if job.name.trim().is_empty() {
        return Err(ConfigError::Validation("job name cannot be empty".to_string()));
    }

    if job.key.as_deref().is_some_and(|key| key.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "job '{}': key cannot be empty",
            job.name
        )));
    }

    validate_http_url(&job.base_url, &job.name)?;

    if let Some(url) = &job.discovery_url {
        validate_http_url(url, &job.name)?;
    }

    if let Some(batch_size) = job.batch_size {
        validate_batch_size(batch_size)?;
    }

    // Every page must produce a different request
    let varies_by_page = job
        .url_template
        .as_deref()
        .map_or(true, |t| t.contains("{page}"))
        || job
            .body_template
            .as_deref()
            .is_some_and(|b| b.contains("{page}"));
    if !varies_by_page {
        return Err(ConfigError::Validation(format!(
            "job '{}': url-template or body-template must contain {{page}}",
            job.name
        )));
    }

    validate_discovery(&job.discovery, &job.name)?;
    validate_extractor(&job.extractor, &job.name)?;

    if let Some(details) = &job.details {
        validate_details(details, &job.name)?;
    }

    Ok(())
}

fn validate_details(details: &DetailsConfig, job: &str) -> Result<(), ConfigError> {
    if details.url_field.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}': details url-field cannot be empty",
            job
        )));
    }

    if details.into.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Validation(format!(
            "job '{}': details into cannot be empty",
            job
        )));
    }

    if let Some(batch_size) = details.batch_size {
        validate_batch_size(batch_size)?;
    }

    validate_extractor(&details.extractor, job)
}

fn validate_http_url(raw: &str, job: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("job '{}': '{}': {}", job, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "job '{}': '{}' must use http or https",
            job, raw
        )));
    }

    Ok(())
}

fn validate_discovery(discovery: &DiscoveryConfig, job: &str) -> Result<(), ConfigError> {
    match discovery {
        DiscoveryConfig::Fixed { .. } => Ok(()),
        DiscoveryConfig::LastPageLink { selector, param } => {
            compile_selector(selector)?;
            if param.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "job '{}': pagination param cannot be empty",
                    job
                )));
            }
            Ok(())
        }
        DiscoveryConfig::ItemCount { selector, per_page } => {
            compile_selector(selector)?;
            validate_per_page(*per_page, job)
        }
        DiscoveryConfig::JsonTotal { pointer, per_page } => {
            validate_pointer(pointer, job)?;
            if let Some(per_page) = per_page {
                validate_per_page(*per_page, job)?;
            }
            Ok(())
        }
    }
}

fn validate_extractor(extractor: &ExtractorConfig, job: &str) -> Result<(), ConfigError> {
    match extractor {
        ExtractorConfig::Html {
            row_selector,
            fields,
        } => {
            compile_selector(row_selector)?;
            if fields.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "job '{}': html extractor needs at least one field",
                    job
                )));
            }
            for field in fields.values() {
                if let Some(selector) = &field.selector {
                    compile_selector(selector)?;
                }
            }
            Ok(())
        }
        ExtractorConfig::Json {
            pointer,
            copy_fields,
            ..
        } => {
            validate_pointer(pointer, job)?;
            copy_fields
                .values()
                .try_for_each(|pointer| validate_pointer(pointer, job))
        }
        ExtractorConfig::EmbeddedJson {
            marker,
            pointer,
            copy_fields,
            ..
        } => {
            if marker.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "job '{}': embedded-json marker cannot be empty",
                    job
                )));
            }
            validate_pointer(pointer, job)?;
            copy_fields
                .values()
                .try_for_each(|pointer| validate_pointer(pointer, job))
        }
    }
}

/// JSON pointers are empty (whole document) or start with `/`
fn validate_pointer(pointer: &str, job: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "job '{}': JSON pointer '{}' must be empty or start with '/'",
            job, pointer
        )));
    }
    Ok(())
}

fn validate_per_page(per_page: u64, job: &str) -> Result<(), ConfigError> {
    if per_page == 0 {
        return Err(ConfigError::Validation(format!(
            "job '{}': per-page must be >= 1",
            job
        )));
    }
    Ok(())
}
