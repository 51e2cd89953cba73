//! Configuration for deepread pipelines.
//!
//! Every collaborator setting lives in [`DeepReadConfig`], built either from
//! the process environment ([`DeepReadConfig::from_env`]) or through
//! [`DeepReadConfigBuilder`]. The factory hands the relevant section to each
//! collaborator when it assembles a pipeline; nothing reads the environment
//! after that.
//!
//! Validation is per flow: a local summary run does not need Gitee or MinerU
//! credentials, so [`DeepReadConfig::validate_for`] only checks what the
//! chosen flow will call.

use crate::error::DeepReadError;
use crate::factory::Flow;
use edgequake_llm::LLMProvider;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_MINERU_API_URL: &str = "https://mineru.net/api/v4/extract/task";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5";

/// Gitee repository used as the public object store for uploaded PDFs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GiteeConfig {
    pub access_token: Option<String>,
    pub owner: Option<String>,
    /// Repository name. Gitee paths are case-sensitive; the store lower-cases it.
    pub repo: Option<String>,
    /// Default: `master`.
    pub branch: String,
    /// Directory inside the repository. Default: `pdfs/`.
    pub upload_path: String,
}

/// MinerU document-parsing service.
#[derive(Clone, PartialEq, Eq)]
pub struct MineruConfig {
    pub api_key: Option<String>,
    /// Task endpoint. Default: [`DEFAULT_MINERU_API_URL`].
    pub api_url: String,
    /// Seconds between status polls. Default: 5.
    pub poll_interval_secs: u64,
    /// Ask MinerU to OCR the document. Default: false.
    pub is_ocr: bool,
    /// Ask MinerU to recognise formulas. Default: true.
    pub enable_formula: bool,
}

/// Language model used by the summarise step.
#[derive(Clone)]
pub struct LlmConfig {
    /// Provider name understood by `edgequake_llm::ProviderFactory`
    /// (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,
    pub model: Option<String>,
    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Maximum tokens the model may generate. Default: 30000.
    pub max_tokens: usize,
    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,
}

/// Complete deepread configuration.
///
/// # Example
/// ```rust
/// use deepread::DeepReadConfig;
///
/// let config = DeepReadConfig::builder()
///     .output_dir("out")
///     .request_timeout_secs(60)
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.request_timeout_secs, 60);
/// ```
#[derive(Clone)]
pub struct DeepReadConfig {
    pub gitee: GiteeConfig,
    pub mineru: MineruConfig,
    pub llm: LlmConfig,

    /// Directory holding `<style>.md` prompt overrides. Default: `prompts`.
    pub prompts_dir: PathBuf,

    /// Where extracted archives and summaries land. Default: `output`.
    pub output_dir: PathBuf,

    /// Time budget for each network call, and the overall MinerU polling
    /// deadline. Default: 300.
    pub request_timeout_secs: u64,

    /// Retries for transient network failures. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay; doubles after each attempt. Default: 1000.
    pub retry_backoff_ms: u64,
}

impl Default for MineruConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_MINERU_API_URL.to_string(),
            poll_interval_secs: 5,
            is_ocr: false,
            enable_formula: true,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            model: None,
            provider: None,
            max_tokens: 30_000,
            temperature: 0.3,
        }
    }
}

impl Default for DeepReadConfig {
    fn default() -> Self {
        Self {
            gitee: GiteeConfig {
                branch: "master".to_string(),
                upload_path: "pdfs/".to_string(),
                ..GiteeConfig::default()
            },
            mineru: MineruConfig::default(),
            llm: LlmConfig::default(),
            prompts_dir: PathBuf::from("prompts"),
            output_dir: PathBuf::from("output"),
            request_timeout_secs: 300,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

/// Mask a secret, keeping the last four characters.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

fn redact_opt(secret: &Option<String>) -> Option<String> {
    secret.as_deref().map(redact)
}

impl fmt::Debug for GiteeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GiteeConfig")
            .field("access_token", &redact_opt(&self.access_token))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("upload_path", &self.upload_path)
            .finish()
    }
}

impl fmt::Debug for MineruConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MineruConfig")
            .field("api_key", &redact_opt(&self.api_key))
            .field("api_url", &self.api_url)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("is_ocr", &self.is_ocr)
            .field("enable_formula", &self.enable_formula)
            .finish()
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl fmt::Debug for DeepReadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepReadConfig")
            .field("gitee", &self.gitee)
            .field("mineru", &self.mineru)
            .field("llm", &self.llm)
            .field("prompts_dir", &self.prompts_dir)
            .field("output_dir", &self.output_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

/// Serializable view of the configuration with every secret masked.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub gitee_access_token: Option<String>,
    pub gitee_owner: Option<String>,
    pub gitee_repo: Option<String>,
    pub gitee_branch: String,
    pub gitee_upload_path: String,
    pub mineru_api_key: Option<String>,
    pub mineru_api_url: String,
    pub mineru_poll_interval_secs: u64,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub llm_max_tokens: usize,
    pub prompts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl DeepReadConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> DeepReadConfigBuilder {
        DeepReadConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Load a `.env` file first (the `deepread` binary does this with
    /// `dotenvy`) if settings live there.
    /// Unset variables keep their defaults; a variable that is set but does
    /// not parse is an error.
    pub fn from_env() -> Result<Self, DeepReadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DeepReadConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DeepReadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut c = Self::default();

        c.gitee.access_token = var("GITEE_ACCESS_TOKEN");
        c.gitee.owner = var("GITEE_OWNER");
        c.gitee.repo = var("GITEE_REPO");
        if let Some(branch) = var("GITEE_BRANCH") {
            c.gitee.branch = branch;
        }
        if let Some(path) = var("GITEE_UPLOAD_PATH") {
            c.gitee.upload_path = path;
        }

        c.mineru.api_key = var("MINERU_API_KEY");
        if let Some(url) = var("MINERU_API_URL") {
            c.mineru.api_url = url;
        }
        if let Some(v) = var("MINERU_POLL_INTERVAL") {
            c.mineru.poll_interval_secs = parse_var("MINERU_POLL_INTERVAL", &v)?;
        }

        // Explicit provider wins; otherwise pick whichever vendor key is set.
        c.llm.provider_name = var("DEEPREAD_LLM_PROVIDER");
        c.llm.model = var("DEEPREAD_MODEL");
        if c.llm.provider_name.is_none() {
            if var("ANTHROPIC_API_KEY").is_some() {
                c.llm.provider_name = Some("anthropic".to_string());
                c.llm.model = c.llm.model.or_else(|| Some(DEFAULT_ANTHROPIC_MODEL.to_string()));
            } else if var("OPENAI_API_KEY").is_some() {
                c.llm.provider_name = Some("openai".to_string());
                c.llm.model = c.llm.model.or_else(|| Some(DEFAULT_OPENAI_MODEL.to_string()));
            }
        }
        if let Some(v) = var("DEEPREAD_MAX_TOKENS") {
            c.llm.max_tokens = parse_var("DEEPREAD_MAX_TOKENS", &v)?;
        }

        if let Some(dir) = var("DEEPREAD_PROMPTS_DIR") {
            c.prompts_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("DEEPREAD_OUTPUT_DIR") {
            c.output_dir = PathBuf::from(dir);
        }
        if let Some(v) = var("REQUEST_TIMEOUT") {
            c.request_timeout_secs = parse_var("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = var("MAX_RETRIES") {
            c.max_retries = parse_var("MAX_RETRIES", &v)?;
        }

        c.check_ranges()?;
        Ok(c)
    }

    /// Reject values no flow can run with.
    fn check_ranges(&self) -> Result<(), DeepReadError> {
        if self.request_timeout_secs == 0 {
            return Err(DeepReadError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(DeepReadError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(())
    }

    /// Check that every setting `flow` depends on is present.
    ///
    /// All missing settings are reported in one error.
    pub fn validate_for(&self, flow: Flow) -> Result<(), DeepReadError> {
        let mut missing = Vec::new();

        if flow.uses_remote_parser() {
            if self.gitee.access_token.is_none() {
                missing.push("GITEE_ACCESS_TOKEN");
            }
            if self.gitee.owner.is_none() {
                missing.push("GITEE_OWNER");
            }
            if self.gitee.repo.is_none() {
                missing.push("GITEE_REPO");
            }
            if self.mineru.api_key.is_none() {
                missing.push("MINERU_API_KEY");
            }
        }

        if !missing.is_empty() {
            return Err(DeepReadError::InvalidConfig(format!(
                "flow '{}' needs: {}",
                flow,
                missing.join(", ")
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(DeepReadError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }

    /// A copy of the settings safe to print or log.
    pub fn redacted_summary(&self) -> ConfigSummary {
        ConfigSummary {
            gitee_access_token: redact_opt(&self.gitee.access_token),
            gitee_owner: self.gitee.owner.clone(),
            gitee_repo: self.gitee.repo.clone(),
            gitee_branch: self.gitee.branch.clone(),
            gitee_upload_path: self.gitee.upload_path.clone(),
            mineru_api_key: redact_opt(&self.mineru.api_key),
            mineru_api_url: self.mineru.api_url.clone(),
            mineru_poll_interval_secs: self.mineru.poll_interval_secs,
            llm_provider: self.llm.provider_name.clone(),
            llm_model: self.llm.model.clone(),
            llm_max_tokens: self.llm.max_tokens,
            prompts_dir: self.prompts_dir.clone(),
            output_dir: self.output_dir.clone(),
            request_timeout_secs: self.request_timeout_secs,
            max_retries: self.max_retries,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, DeepReadError> {
    value.trim().parse().map_err(|_| {
        DeepReadError::InvalidConfig(format!("{key}: cannot parse '{value}' as a number"))
    })
}

/// Builder for [`DeepReadConfig`].
#[derive(Debug)]
pub struct DeepReadConfigBuilder {
    config: DeepReadConfig,
}

impl DeepReadConfigBuilder {
    pub fn gitee_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.gitee.access_token = Some(token.into());
        self
    }

    pub fn gitee_owner(mut self, owner: impl Into<String>) -> Self {
        self.config.gitee.owner = Some(owner.into());
        self
    }

    pub fn gitee_repo(mut self, repo: impl Into<String>) -> Self {
        self.config.gitee.repo = Some(repo.into());
        self
    }

    pub fn gitee_branch(mut self, branch: impl Into<String>) -> Self {
        self.config.gitee.branch = branch.into();
        self
    }

    pub fn gitee_upload_path(mut self, path: impl Into<String>) -> Self {
        self.config.gitee.upload_path = path.into();
        self
    }

    pub fn mineru_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.mineru.api_key = Some(key.into());
        self
    }

    pub fn mineru_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.mineru.api_url = url.into();
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.mineru.poll_interval_secs = secs.max(1);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.llm.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.llm.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.llm.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.llm.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn prompts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompts_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeepReadConfig, DeepReadError> {
        self.config.check_ranges()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = DeepReadConfig::default();
        assert_eq!(c.gitee.branch, "master");
        assert_eq!(c.gitee.upload_path, "pdfs/");
        assert_eq!(c.mineru.api_url, DEFAULT_MINERU_API_URL);
        assert_eq!(c.mineru.poll_interval_secs, 5);
        assert_eq!(c.llm.max_tokens, 30_000);
        assert_eq!(c.request_timeout_secs, 300);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn from_lookup_reads_every_section() {
        let c = DeepReadConfig::from_lookup(lookup(&[
            ("GITEE_ACCESS_TOKEN", "tok-123456"),
            ("GITEE_OWNER", "alice"),
            ("GITEE_REPO", "Docs"),
            ("GITEE_BRANCH", "main"),
            ("MINERU_API_KEY", "mk"),
            ("MINERU_POLL_INTERVAL", "2"),
            ("DEEPREAD_OUTPUT_DIR", "/tmp/out"),
            ("REQUEST_TIMEOUT", "30"),
            ("MAX_RETRIES", "0"),
        ]))
        .unwrap();

        assert_eq!(c.gitee.owner.as_deref(), Some("alice"));
        assert_eq!(c.gitee.branch, "main");
        assert_eq!(c.mineru.poll_interval_secs, 2);
        assert_eq!(c.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(c.request_timeout_secs, 30);
        assert_eq!(c.max_retries, 0);
    }

    #[test]
    fn provider_auto_selection_prefers_anthropic() {
        let c = DeepReadConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "a"),
            ("OPENAI_API_KEY", "o"),
        ]))
        .unwrap();
        assert_eq!(c.llm.provider_name.as_deref(), Some("anthropic"));
        assert_eq!(c.llm.model.as_deref(), Some(DEFAULT_ANTHROPIC_MODEL));

        let c = DeepReadConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "o")])).unwrap();
        assert_eq!(c.llm.provider_name.as_deref(), Some("openai"));
        assert_eq!(c.llm.model.as_deref(), Some(DEFAULT_OPENAI_MODEL));

        let c = DeepReadConfig::from_lookup(lookup(&[
            ("DEEPREAD_LLM_PROVIDER", "ollama"),
            ("OPENAI_API_KEY", "o"),
        ]))
        .unwrap();
        assert_eq!(c.llm.provider_name.as_deref(), Some("ollama"));
        assert_eq!(c.llm.model, None);
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let err = DeepReadConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT", "soon")])).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT"));
    }

    #[test]
    fn environment_zero_limits_are_rejected() {
        let err = DeepReadConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT", "0")])).unwrap_err();
        assert!(matches!(err, DeepReadError::InvalidConfig(_)));
        assert!(err.to_string().contains("timeout"), "got: {err}");

        let err = DeepReadConfig::from_lookup(lookup(&[("DEEPREAD_MAX_TOKENS", "0")])).unwrap_err();
        assert!(err.to_string().contains("max_tokens"), "got: {err}");

        let c = DeepReadConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT", "1")])).unwrap();
        assert_eq!(c.request_timeout_secs, 1);
    }

    #[test]
    fn validation_lists_every_missing_remote_setting() {
        let c = DeepReadConfig::builder().gitee_owner("alice").build().unwrap();
        let msg = c.validate_for(Flow::Full).unwrap_err().to_string();
        assert!(msg.contains("GITEE_ACCESS_TOKEN"), "got: {msg}");
        assert!(msg.contains("GITEE_REPO"), "got: {msg}");
        assert!(msg.contains("MINERU_API_KEY"), "got: {msg}");
        assert!(!msg.contains("GITEE_OWNER"), "got: {msg}");
    }

    #[test]
    fn local_flows_need_no_remote_credentials() {
        let c = DeepReadConfig::default();
        assert!(c.validate_for(Flow::Local).is_ok());
        assert!(c.validate_for(Flow::SummaryOnly).is_ok());
        assert!(c.validate_for(Flow::LocalParseOnly).is_ok());
        assert!(c.validate_for(Flow::ParseOnly).is_err());
    }

    #[test]
    fn secrets_are_redacted() {
        let c = DeepReadConfig::builder()
            .gitee_access_token("supersecret-abcd")
            .mineru_api_key("xyz")
            .build()
            .unwrap();
        let debug = format!("{c:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("***abcd"));

        let summary = c.redacted_summary();
        assert_eq!(summary.gitee_access_token.as_deref(), Some("***abcd"));
        assert_eq!(summary.mineru_api_key.as_deref(), Some("***"));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(DeepReadConfig::builder().request_timeout_secs(0).build().is_err());
    }
}
