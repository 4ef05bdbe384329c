//! Configuration types for an upload session.
//!
//! All pipeline behaviour is controlled through [`SessionConfig`], built via
//! its [`SessionConfigBuilder`]. The endpoint and key are carried here
//! explicitly instead of living in process-wide constants, so a server and a
//! test can run side by side with different services.
//!
//! Presence of the endpoint and key is **not** checked by the builder. It is
//! checked once per batch by [`SessionConfig::credentials`], which is what
//! lets the UI show a configuration error on every render instead of
//! refusing to start.

use crate::error::ExtractError;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::layout::LayoutAnalyzer;
use crate::progress::ProgressCallback;
use crate::wordcloud::WordCloudConfig;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the Form Recognizer endpoint URL.
pub const ENV_ENDPOINT: &str = "FORM_RECOGNIZER_ENDPOINT";
/// Environment variable holding the Form Recognizer subscription key.
pub const ENV_KEY: &str = "FORM_RECOGNIZER_KEY";
/// Environment variable overriding the REST API version.
pub const ENV_API_VERSION: &str = "FORM_RECOGNIZER_API_VERSION";
/// Environment variable overriding the analysis model id.
pub const ENV_MODEL: &str = "FORM_RECOGNIZER_MODEL";

/// Default Form Recognizer REST API version.
pub const DEFAULT_API_VERSION: &str = "2023-07-31";
/// Default analysis model.
pub const DEFAULT_MODEL_ID: &str = "prebuilt-layout";

/// Endpoint + key pair, only obtainable once both are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    endpoint: String,
    key: String,
}

impl Credentials {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Configuration for one upload session.
///
/// Built via [`SessionConfig::builder()`], [`SessionConfig::from_env()`] or
/// [`SessionConfig::default()`] (which has no credentials and therefore
/// processes nothing).
///
/// # Example
/// ```rust
/// use idmp_extract::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .endpoint("https://my-resource.cognitiveservices.azure.com/")
///     .key("0123456789abcdef")
///     .poll_interval_ms(500)
///     .build()
///     .unwrap();
/// assert!(config.credentials().is_ok());
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Form Recognizer resource endpoint, e.g.
    /// `https://<resource>.cognitiveservices.azure.com/`.
    pub endpoint: String,

    /// Subscription key sent as `Ocp-Apim-Subscription-Key`.
    pub key: String,

    /// Analysis model id. Default: `prebuilt-layout`.
    pub model_id: String,

    /// REST API version. Default: `2023-07-31`.
    pub api_version: String,

    /// Delay between operation polls when the service sends no
    /// `Retry-After`. Default: 1000 ms.
    pub poll_interval_ms: u64,

    /// Per-HTTP-request timeout in seconds. Default: 120.
    ///
    /// A timeout is a transport error and aborts the batch; it exists so a
    /// dead socket cannot stall a render forever.
    pub request_timeout_secs: u64,

    /// Documents analysed at once. Default: 1 (strictly sequential).
    ///
    /// Values above 1 still store records in upload order.
    pub concurrency: usize,

    /// Directory for temporary document copies. Default: system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Largest accepted upload request body in bytes. Default: 200 MiB.
    pub max_upload_bytes: usize,

    /// Word cloud rendering settings.
    pub wordcloud: WordCloudConfig,

    /// Pre-constructed text extractor. Default: PDFium.
    pub extractor: Option<Arc<dyn TextExtractor>>,

    /// Pre-constructed layout analyzer. Default: Form Recognizer REST client.
    pub analyzer: Option<Arc<dyn LayoutAnalyzer>>,

    /// Optional progress callback for per-document events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            key: String::new(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval_ms: 1000,
            request_timeout_secs: 120,
            concurrency: 1,
            temp_dir: None,
            max_upload_bytes: 200 * 1024 * 1024,
            wordcloud: WordCloudConfig::default(),
            extractor: None,
            analyzer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &if self.key.is_empty() { "" } else { "<redacted>" })
            .field("model_id", &self.model_id)
            .field("api_version", &self.api_version)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("temp_dir", &self.temp_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("wordcloud", &self.wordcloud)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn TextExtractor>"))
            .field("analyzer", &self.analyzer.as_ref().map(|_| "<dyn LayoutAnalyzer>"))
            .finish()
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read endpoint, key, API version and model from the environment.
    ///
    /// Missing variables leave the defaults in place; an absent endpoint or
    /// key is reported later by [`SessionConfig::credentials`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var(ENV_ENDPOINT) {
            config.endpoint = v.trim().to_string();
        }
        if let Ok(v) = std::env::var(ENV_KEY) {
            config.key = v.trim().to_string();
        }
        if let Ok(v) = std::env::var(ENV_API_VERSION) {
            if !v.trim().is_empty() {
                config.api_version = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_MODEL) {
            if !v.trim().is_empty() {
                config.model_id = v.trim().to_string();
            }
        }
        config
    }

    /// The configuration gate: both endpoint and key must be non-empty.
    pub fn credentials(&self) -> Result<Credentials, ExtractError> {
        let endpoint = self.endpoint.trim();
        let key = self.key.trim();
        let missing = match (endpoint.is_empty(), key.is_empty()) {
            (true, true) => Some("endpoint and key"),
            (true, false) => Some("endpoint"),
            (false, true) => Some("key"),
            (false, false) => None,
        };
        if let Some(missing) = missing {
            return Err(ExtractError::MissingConfiguration { missing });
        }
        Ok(Credentials {
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        })
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.config.key = key.into();
        self
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.config.model_id = model_id.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn wordcloud(mut self, wordcloud: WordCloudConfig) -> Self {
        self.config.wordcloud = wordcloud;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn LayoutAnalyzer>) -> Self {
        self.config.analyzer = Some(analyzer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, ExtractError> {
        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model id must not be empty".into()));
        }
        if c.api_version.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "API version must not be empty".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        c.wordcloud.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_credentials() {
        let config = SessionConfig::default();
        let err = config.credentials().unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MissingConfiguration {
                missing: "endpoint and key"
            }
        ));
    }

    #[test]
    fn blank_key_is_missing() {
        let config = SessionConfig::builder()
            .endpoint("https://example.cognitiveservices.azure.com/")
            .key("   ")
            .build()
            .unwrap();
        assert!(matches!(
            config.credentials(),
            Err(ExtractError::MissingConfiguration { missing: "key" })
        ));
    }

    #[test]
    fn credentials_are_trimmed() {
        let config = SessionConfig::builder()
            .endpoint(" https://example.cognitiveservices.azure.com/ ")
            .key("abc ")
            .build()
            .unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.endpoint(), "https://example.cognitiveservices.azure.com/");
        assert_eq!(creds.key(), "abc");
    }

    #[test]
    fn debug_redacts_key() {
        let config = SessionConfig::builder().key("super-secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret"), "got: {dbg}");
        let creds = SessionConfig::builder()
            .endpoint("https://e")
            .key("super-secret")
            .build()
            .unwrap()
            .credentials()
            .unwrap();
        assert!(!format!("{creds:?}").contains("super-secret"));
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let config = SessionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = SessionConfig::builder()
            .request_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }
}
