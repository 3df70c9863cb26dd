use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::findings::{Category, Severity};

const CONFIG_DIR: &str = ".codequal";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// File extensions to analyze
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to ignore (in addition to .gitignore)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Files larger than this (bytes) are split into chunks for chunked analyzers
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Byte budget of a single analysis chunk
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,

    /// Lines shared by consecutive chunks
    #[serde(default = "default_chunk_overlap_lines")]
    pub chunk_overlap_lines: usize,

    /// How far (in lines) a chunk end may move back to reach a declaration boundary
    #[serde(default = "default_boundary_lookback")]
    pub boundary_lookback: usize,

    /// Maximum number of files analyzed concurrently (0 = number of CPUs)
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Maximum number of chunk analyses in flight for one file
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Budget for the whole analysis of one file
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,

    /// Budget for a single external call (analyzer, inference, embedding)
    #[serde(default = "default_service_timeout_secs")]
    pub service_timeout_secs: u64,

    /// Run the built-in pattern analyzer
    #[serde(default = "default_true")]
    pub builtin_patterns: bool,

    /// External analyzer command; receives file content on stdin and prints JSON
    #[serde(default)]
    pub external_command: Option<Vec<String>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            max_file_size: default_max_file_size(),
            chunk_budget: default_chunk_budget(),
            chunk_overlap_lines: default_chunk_overlap_lines(),
            boundary_lookback: default_boundary_lookback(),
            max_concurrent_files: default_max_concurrent_files(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            file_timeout_secs: default_file_timeout_secs(),
            service_timeout_secs: default_service_timeout_secs(),
            builtin_patterns: true,
            external_command: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    [
        "py", "js", "jsx", "ts", "tsx", "java", "c", "cc", "cpp", "cxx", "h", "hpp", "cs",
        "go", "rs", "rb", "php", "swift", "kt", "scala", "ipynb",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "target".to_string(),
        ".git".to_string(),
        "dist".to_string(),
        "build".to_string(),
        "__pycache__".to_string(),
        ".venv".to_string(),
        "vendor".to_string(),
        ".codequal".to_string(),
    ]
}

fn default_max_file_size() -> usize {
    1024 * 1024
}

fn default_chunk_budget() -> usize {
    default_max_file_size() / 4
}

fn default_chunk_overlap_lines() -> usize {
    100
}

fn default_boundary_lookback() -> usize {
    10
}

fn default_max_concurrent_files() -> usize {
    8
}

fn default_max_concurrent_chunks() -> usize {
    4
}

fn default_file_timeout_secs() -> u64 {
    300
}

fn default_service_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Lines per sliding window
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,

    /// Windows whose normalized text is shorter than this are ignored
    #[serde(default = "default_min_normalized_len")]
    pub min_normalized_len: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_lines: default_window_lines(),
            min_normalized_len: default_min_normalized_len(),
        }
    }
}

fn default_window_lines() -> usize {
    10
}

fn default_min_normalized_len() -> usize {
    40
}

/// Weight tables for issue-based quality scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Keyed by severity name (`critical`, `high`, ...)
    #[serde(default = "default_severity_weights")]
    pub severity_weights: BTreeMap<String, f64>,

    /// Keyed by category name; categories missing from this table weigh 1
    #[serde(default = "default_category_weights")]
    pub category_weights: BTreeMap<String, f64>,

    #[serde(default = "default_security_multiplier")]
    pub security_multiplier: f64,

    #[serde(default = "default_maintainability_multiplier")]
    pub maintainability_multiplier: f64,

    #[serde(default = "default_overall_multiplier")]
    pub overall_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            severity_weights: default_severity_weights(),
            category_weights: default_category_weights(),
            security_multiplier: default_security_multiplier(),
            maintainability_multiplier: default_maintainability_multiplier(),
            overall_multiplier: default_overall_multiplier(),
        }
    }
}

impl ScoringConfig {
    pub fn severity_weight(&self, severity: Severity) -> f64 {
        self.severity_weights
            .get(severity.as_str())
            .copied()
            .unwrap_or(1.0)
    }

    pub fn category_weight(&self, category: Category) -> f64 {
        self.category_weights
            .get(category.as_str())
            .copied()
            .unwrap_or(1.0)
    }
}

fn default_severity_weights() -> BTreeMap<String, f64> {
    [
        (Severity::Critical, 25.0),
        (Severity::High, 15.0),
        (Severity::Medium, 8.0),
        (Severity::Low, 3.0),
        (Severity::Info, 1.0),
    ]
    .into_iter()
    .map(|(severity, weight)| (severity.as_str().to_string(), weight))
    .collect()
}

fn default_category_weights() -> BTreeMap<String, f64> {
    [
        (Category::Security, 20.0),
        (Category::Complexity, 10.0),
        (Category::Maintainability, 5.0),
        (Category::BestPractices, 3.0),
        (Category::CodeDuplication, 2.0),
        (Category::Testing, 5.0),
        (Category::Documentation, 2.0),
    ]
    .into_iter()
    .map(|(category, weight)| (category.as_str().to_string(), weight))
    .collect()
}

fn default_security_multiplier() -> f64 {
    2.0
}

fn default_maintainability_multiplier() -> f64 {
    1.5
}

fn default_overall_multiplier() -> f64 {
    1.2
}

/// Retrieval backend kinds, listed in the order they are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// LanceDB table with a local embedding model
    VectorDb,
    /// In-process flat index over hashed code features
    Flat,
    /// Keyword and substring matching
    Keyword,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::VectorDb => write!(f, "vector_db"),
            BackendKind::Flat => write!(f, "flat"),
            BackendKind::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Backend priority; the first one that initializes is used
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,

    /// Index directory (relative to .codequal/)
    #[serde(default = "default_persist_dir")]
    pub persist_dir: String,

    /// Target fragment size in characters
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,

    /// Characters shared by consecutive fragments
    #[serde(default = "default_fragment_overlap")]
    pub fragment_overlap: usize,

    /// Fragments shorter than this (trimmed) are not indexed
    #[serde(default = "default_min_fragment_len")]
    pub min_fragment_len: usize,

    /// Default number of query results
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_vector_db_floor")]
    pub vector_db_floor: f32,

    #[serde(default = "default_flat_floor")]
    pub flat_floor: f32,

    #[serde(default = "default_keyword_floor")]
    pub keyword_floor: f32,

    /// Embedding model used by the vector database backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Dimension of the hashed feature vectors used by the flat backend
    #[serde(default = "default_flat_dimension")]
    pub flat_dimension: usize,

    /// Time budget for one embedding-backed call (append, search, rollback)
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,

    /// Time budget for initializing one backend, model load included
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            persist_dir: default_persist_dir(),
            fragment_size: default_fragment_size(),
            fragment_overlap: default_fragment_overlap(),
            min_fragment_len: default_min_fragment_len(),
            default_limit: default_limit(),
            vector_db_floor: default_vector_db_floor(),
            flat_floor: default_flat_floor(),
            keyword_floor: default_keyword_floor(),
            model: default_model(),
            batch_size: default_batch_size(),
            flat_dimension: default_flat_dimension(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl RetrievalConfig {
    pub fn floor_for(&self, kind: BackendKind) -> f32 {
        match kind {
            BackendKind::VectorDb => self.vector_db_floor,
            BackendKind::Flat => self.flat_floor,
            BackendKind::Keyword => self.keyword_floor,
        }
    }
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::VectorDb, BackendKind::Flat, BackendKind::Keyword]
}

fn default_persist_dir() -> String {
    "index".to_string()
}

fn default_fragment_size() -> usize {
    800
}

fn default_fragment_overlap() -> usize {
    100
}

fn default_min_fragment_len() -> usize {
    50
}

fn default_limit() -> usize {
    5
}

fn default_vector_db_floor() -> f32 {
    0.3
}

fn default_flat_floor() -> f32 {
    0.01
}

fn default_keyword_floor() -> f32 {
    0.01
}

fn default_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_flat_dimension() -> usize {
    512
}

fn default_embedding_timeout_secs() -> u64 {
    120
}

fn default_probe_timeout_secs() -> u64 {
    600
}

/// OpenAI-compatible chat endpoint used for per-chunk review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_inference_model")]
    pub model: String,

    /// Base URL override (e.g. a local OpenAI-compatible server)
    #[serde(default)]
    pub api_base: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_inference_model(),
            api_base: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
        }
    }
}

fn default_inference_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to rotating files
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (relative to the project root unless absolute)
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Rotation: daily, hourly, minutely, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Also log to stderr (filtered by RUST_LOG)
    #[serde(default = "default_true")]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            directory: default_log_directory(),
            rotation: default_rotation(),
            file_prefix: default_file_prefix(),
            stderr: true,
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".codequal/logs")
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_file_prefix() -> String {
    "codequal.log".to_string()
}

impl Config {
    /// Load configuration from the .codequal directory
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        let config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the .codequal directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.analysis.chunk_budget == 0 {
            bail!("analysis.chunk_budget must be greater than zero");
        }
        if self.retrieval.embedding_timeout_secs == 0 || self.retrieval.probe_timeout_secs == 0 {
            bail!("retrieval timeouts must be greater than zero");
        }
        if self.analysis.max_concurrent_chunks == 0 {
            bail!("analysis.max_concurrent_chunks must be greater than zero");
        }
        if self.fingerprint.window_lines == 0 {
            bail!("fingerprint.window_lines must be greater than zero");
        }
        if self.retrieval.backends.is_empty() {
            bail!("retrieval.backends must list at least one backend");
        }
        if self.retrieval.fragment_size == 0 {
            bail!("retrieval.fragment_size must be greater than zero");
        }
        Ok(())
    }

    /// Get the path to the .codequal directory
    pub fn codequal_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Get the path to the retrieval index directory
    pub fn index_dir(&self, root: &Path) -> PathBuf {
        Self::codequal_dir(root).join(&self.retrieval.persist_dir)
    }

    /// Check if codequal is initialized in the given directory
    pub fn is_initialized(root: &Path) -> bool {
        Self::codequal_dir(root).exists()
    }
}
