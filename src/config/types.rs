use crate::state::{JobKey, PageIndex};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Jobs, run one after another in file order
    #[serde(rename = "job", default)]
    pub jobs: Vec<JobConfig>,
}

/// Pagination engine tuning shared by all jobs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Pages dispatched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per page, counting the first one
    #[serde(default = "default_page_attempts")]
    pub page_attempts: u32,

    /// Attempts to discover a job's page count
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    /// Fixed pause after every batch (milliseconds)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Pause between attempts of the same page (milliseconds)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Whether a payload that fails to parse is fetched again
    #[serde(default = "default_true")]
    pub retry_parse_failures: bool,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Static proxy applied to every request
    #[serde(default)]
    pub proxy: Option<String>,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Where checkpoints and journals live
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// Directory for checkpoint files and record journals
    #[serde(default = "default_checkpoint_dir")]
    pub dir: String,

    /// SQLite database used by the `sqlite` backend
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// Checkpoint persistence backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Json,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving the per-job and combined files
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Prefix of per-job file names
    #[serde(default = "default_output_prefix")]
    pub prefix: String,

    /// File name of the combined output
    #[serde(default = "default_combined_file")]
    pub combined_file: String,
}

/// One pagination stream
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Human-readable name, used by `--job`
    pub name: String,

    /// Explicit job key; derived from `base-url` when absent
    #[serde(default)]
    pub key: Option<String>,

    /// Base URL of the listing
    pub base_url: String,

    /// Page URL with `{base}`, `{page}` and `{key}` placeholders
    ///
    /// Defaults to `{base}?page={page}`.
    #[serde(default)]
    pub url_template: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    /// Request body with the same placeholders as `url-template`
    #[serde(default)]
    pub body_template: Option<String>,

    /// Extra headers for this job's requests
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Index of the first page (0 or 1)
    #[serde(default = "default_first_page")]
    pub first_page: PageIndex,

    /// Overrides `engine.batch-size` for this job
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// URL fetched to discover the page count; defaults to the first page
    #[serde(default)]
    pub discovery_url: Option<String>,

    pub discovery: DiscoveryConfig,

    pub extractor: ExtractorConfig,

    /// Follows each record's detail link after the listing page is read
    #[serde(default)]
    pub details: Option<DetailsConfig>,
}

/// Second fetch per record, merging its detail page into the record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetailsConfig {
    /// Record field holding the detail URL, relative to `base-url` or absolute
    pub url_field: String,

    /// Stores every detail record as an array under this field instead of
    /// merging the first one into the record
    #[serde(default)]
    pub into: Option<String>,

    /// Detail pages fetched concurrently; defaults to the job's batch size
    #[serde(default)]
    pub batch_size: Option<usize>,

    pub extractor: ExtractorConfig,
}

impl JobConfig {
    /// Returns the key namespacing this job's checkpoint and files
    pub fn job_key(&self) -> JobKey {
        match &self.key {
            Some(key) => JobKey::new(key.clone()),
            None => JobKey::from_base_url(&self.base_url),
        }
    }
}

/// HTTP request method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// How a job determines its total page count
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiscoveryConfig {
    /// A known page count
    Fixed { pages: u64 },

    /// Page number in the last pagination link of an HTML page
    ///
    /// No pagination container means a single page.
    #[serde(rename_all = "kebab-case")]
    LastPageLink {
        selector: String,
        #[serde(default = "default_page_param")]
        param: String,
    },

    /// Item counter in an HTML page divided by the page size
    #[serde(rename_all = "kebab-case")]
    ItemCount { selector: String, per_page: u64 },

    /// Number at a JSON pointer, optionally an item count divided by page size
    #[serde(rename_all = "kebab-case")]
    JsonTotal {
        pointer: String,
        #[serde(default)]
        per_page: Option<u64>,
    },
}

/// How a job turns a page payload into records
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExtractorConfig {
    /// One record per element matching `row-selector`
    #[serde(rename_all = "kebab-case")]
    Html {
        row_selector: String,
        fields: BTreeMap<String, FieldConfig>,
    },

    /// The array (or single value) at a JSON pointer of a JSON body
    #[serde(rename_all = "kebab-case")]
    Json {
        pointer: String,
        #[serde(default)]
        drop_fields: Vec<String>,
        #[serde(default)]
        copy_fields: BTreeMap<String, String>,
    },

    /// JSON assigned inside an inline `<script>`, e.g. `window.__STORE__=`
    ///
    /// `copy-fields` maps a record field to a JSON pointer into the whole
    /// document, e.g. `seller = "/googleAds/targeting/seller/0"`.
    #[serde(rename_all = "kebab-case")]
    EmbeddedJson {
        marker: String,
        pointer: String,
        #[serde(default)]
        drop_fields: Vec<String>,
        #[serde(default)]
        copy_fields: BTreeMap<String, String>,
    },
}

/// One field of an HTML record
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldConfig {
    /// Selector relative to the row; the row itself when absent
    #[serde(default)]
    pub selector: Option<String>,

    /// Attribute to read instead of the text content
    #[serde(default)]
    pub attr: Option<String>,

    /// Label removed from the start of the value (e.g. `Name:`)
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// String prepended to non-empty values (e.g. a site origin)
    #[serde(default)]
    pub prepend: Option<String>,
}

fn default_batch_size() -> usize {
    5
}

fn default_page_attempts() -> u32 {
    5
}

fn default_discovery_attempts() -> u32 {
    3
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("catalog-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_checkpoint_dir() -> String {
    "./checkpoints".to_string()
}

fn default_database_path() -> String {
    "./checkpoints/checkpoints.db".to_string()
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_output_prefix() -> String {
    "harvest".to_string()
}

fn default_combined_file() -> String {
    "combined.json".to_string()
}

fn default_first_page() -> PageIndex {
    1
}

fn default_page_param() -> String {
    "page".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_attempts: default_page_attempts(),
            discovery_attempts: default_discovery_attempts(),
            batch_delay_ms: default_batch_delay_ms(),
            retry_delay_ms: 0,
            retry_parse_failures: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            proxy: None,
            headers: BTreeMap::new(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            dir: default_checkpoint_dir(),
            database_path: default_database_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            prefix: default_output_prefix(),
            combined_file: default_combined_file(),
        }
    }
}
