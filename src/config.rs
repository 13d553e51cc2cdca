//! Configuration types for a classification run.
//!
//! Everything a run needs is collected in [`ScanConfig`], built via
//! [`ScanConfigBuilder`]. The builder validates the two required folders up
//! front so a missing input folder is reported before any document is touched.

use crate::error::ScanError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the shared work root below the output folder.
pub const WORK_DIR_NAME: &str = "work.d";

/// Name of the compilation of all per-document feature tables.
pub const ALL_FEATURES_NAME: &str = "all-features.csv";

/// Placeholder in [`ScanConfig::features_name_fmt`] replaced by the PDF file name.
pub const PDF_NAME_PLACEHOLDER: &str = "{pdf_name}";

/// Configuration for a classification run.
///
/// # Example
/// ```rust,no_run
/// use pdfclassify::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .input_dir("scans/inbox")
///     .output_dir("scans/archive")
///     .force(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Folder scanned for `*.pdf` files. Required.
    pub input_dir: PathBuf,

    /// Folder receiving the work area, feature tables and renamed files. Required.
    pub output_dir: PathBuf,

    /// Disable every freshness check and recompute all artifacts. Default: false.
    pub force: bool,

    /// Rendering DPI for page images. Range: 72–400. Default: 200.
    ///
    /// 200 DPI is what Tesseract is tuned for on typical A4 office scans.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// Number of documents processed concurrently. Default: 1.
    ///
    /// Pages of one document are always processed in order.
    pub concurrency: usize,

    /// Tesseract language code(s), e.g. "deu" or "deu+eng". Default: "deu".
    pub ocr_language: String,

    /// LLM model identifier. If None, a per-provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for feature extraction. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1024.
    pub max_tokens: usize,

    /// Minimum delay between two language-model calls in ms. Default: 2000.
    pub llm_min_interval_ms: u64,

    /// Write the per-document feature files and `all-features.csv`. Default: true.
    pub write_features: bool,

    /// File name format of the per-document feature file, relative to
    /// `output_dir`. `{pdf_name}` is replaced by the PDF's file name.
    /// Default: `{pdf_name}-feature.csv`.
    pub features_name_fmt: String,

    /// Write the results table. Default: true.
    pub write_results: bool,

    /// File name of the results table, written into `input_dir`.
    /// Default: `results.csv`.
    pub results_name: String,

    /// Explicit pdfium library (file or directory). Default: next to the
    /// binary, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Progress callback for per-document events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            force: false,
            dpi: 200,
            max_rendered_pixels: 3000,
            concurrency: 1,
            ocr_language: "deu".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            llm_min_interval_ms: 2000,
            write_features: true,
            features_name_fmt: format!("{PDF_NAME_PLACEHOLDER}-feature.csv"),
            write_results: true,
            results_name: "results.csv".to_string(),
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("force", &self.force)
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("ocr_language", &self.ocr_language)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("write_features", &self.write_features)
            .field("write_results", &self.write_results)
            .field("results_name", &self.results_name)
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    /// `<output_dir>/work.d`
    pub fn work_root(&self) -> PathBuf {
        self.output_dir.join(WORK_DIR_NAME)
    }

    /// `<input_dir>/<results_name>`
    pub fn results_path(&self) -> PathBuf {
        self.input_dir.join(&self.results_name)
    }

    /// `<output_dir>/all-features.csv`
    pub fn all_features_path(&self) -> PathBuf {
        self.output_dir.join(ALL_FEATURES_NAME)
    }

    /// Per-document feature file for the PDF called `pdf_name`.
    pub fn feature_path(&self, pdf_name: &str) -> PathBuf {
        self.output_dir
            .join(self.features_name_fmt.replace(PDF_NAME_PLACEHOLDER, pdf_name))
    }
}

/// Builder for [`ScanConfig`].
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl fmt::Debug for ScanConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ScanConfigBuilder {
    pub fn input_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.input_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn llm_min_interval_ms(mut self, ms: u64) -> Self {
        self.config.llm_min_interval_ms = ms;
        self
    }

    pub fn write_features(mut self, v: bool) -> Self {
        self.config.write_features = v;
        self
    }

    pub fn features_name_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.config.features_name_fmt = fmt.into();
        self
    }

    pub fn write_results(mut self, v: bool) -> Self {
        self.config.write_results = v;
        self
    }

    pub fn results_name(mut self, name: impl Into<String>) -> Self {
        self.config.results_name = name.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl AsRef<Path>) -> Self {
        self.config.pdfium_library = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        if c.input_dir.as_os_str().is_empty() {
            return Err(ScanError::InvalidConfig("input folder is required".into()));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(ScanError::InvalidConfig("output folder is required".into()));
        }
        if !c.input_dir.is_dir() {
            return Err(ScanError::InputDirNotFound {
                path: c.input_dir.clone(),
            });
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ScanError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.results_name.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "results file name must not be empty".into(),
            ));
        }
        if c.write_features && !c.features_name_fmt.contains(PDF_NAME_PLACEHOLDER) {
            return Err(ScanError::InvalidConfig(format!(
                "feature file name format must contain {PDF_NAME_PLACEHOLDER}, got '{}'",
                c.features_name_fmt
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_input_folder_is_rejected() {
        let err = ScanConfig::builder()
            .output_dir("/tmp/out")
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn missing_output_folder_is_rejected() {
        let input = TempDir::new().unwrap();
        let err = ScanConfig::builder()
            .input_dir(input.path())
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn nonexistent_input_folder_is_rejected() {
        let err = ScanConfig::builder()
            .input_dir("/definitely/not/here")
            .output_dir("/tmp/out")
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::InputDirNotFound { .. }), "got {err:?}");
    }

    #[test]
    fn defaults_and_derived_paths() {
        let input = TempDir::new().unwrap();
        let config = ScanConfig::builder()
            .input_dir(input.path())
            .output_dir("/archive")
            .build()
            .unwrap();

        assert_eq!(config.dpi, 200);
        assert!(!config.force);
        assert_eq!(config.work_root(), PathBuf::from("/archive/work.d"));
        assert_eq!(config.results_path(), input.path().join("results.csv"));
        assert_eq!(
            config.feature_path("scan_001.pdf"),
            PathBuf::from("/archive/scan_001.pdf-feature.csv")
        );
        assert_eq!(
            config.all_features_path(),
            PathBuf::from("/archive/all-features.csv")
        );
    }

    #[test]
    fn features_fmt_requires_placeholder() {
        let input = TempDir::new().unwrap();
        let err = ScanConfig::builder()
            .input_dir(input.path())
            .output_dir("/archive")
            .features_name_fmt("features.csv")
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn builder_clamps_values() {
        let input = TempDir::new().unwrap();
        let config = ScanConfig::builder()
            .input_dir(input.path())
            .output_dir("/archive")
            .dpi(1000)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 400);
        assert_eq!(config.concurrency, 1);
    }
}
