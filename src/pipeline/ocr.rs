//! OCR adapter: page image → words with line positions and confidence.
//!
//! The pipeline only depends on the [`OcrEngine`] trait. Two engines ship:
//!
//! * [`TesseractOcr`] runs the `tesseract` CLI with TSV output, which carries
//!   a confidence per word.
//! * [`VisionOcr`] asks a vision LLM to transcribe the page. Models report no
//!   confidence, so its words carry `None`.
//!
//! An [`OcrPage`] is persisted as `page_<n>.csv` with header
//! `line,word,confidence`; an empty confidence cell means "unknown".

use crate::error::{OcrError, ScanError};
use crate::pipeline::encode;
use crate::prompts::TRANSCRIPTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// One recognised word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    /// 0-based line index in reading order.
    pub line: usize,
    #[serde(rename = "word")]
    pub text: String,
    /// Confidence in `[0, 1]`, `None` if the engine does not report one.
    pub confidence: Option<f32>,
}

/// The OCR result of one page image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OcrPage {
    pub words: Vec<OcrWord>,
}

/// Header of every persisted OCR record.
pub const OCR_HEADER: [&str; 3] = ["line", "word", "confidence"];

impl OcrPage {
    /// Build a page from plain text, one OCR line per text line.
    pub fn from_text(text: &str, confidence: Option<f32>) -> Self {
        let words = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .flat_map(|(line, l)| {
                l.split_whitespace().map(move |w| OcrWord {
                    line,
                    text: w.to_string(),
                    confidence,
                })
            })
            .collect();
        Self { words }
    }

    /// Reconstructed page text: words joined by spaces, lines by newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut current: Option<usize> = None;
        for word in &self.words {
            match current {
                Some(line) if line == word.line => out.push(' '),
                Some(_) => out.push('\n'),
                None => {}
            }
            out.push_str(&word.text);
            current = Some(word.line);
        }
        out
    }

    /// Mean confidence over words that report one.
    pub fn mean_confidence(&self) -> Option<f32> {
        let known: Vec<f32> = self.words.iter().filter_map(|w| w.confidence).collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f32>() / known.len() as f32)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Serialise as a `line,word,confidence` table.
    pub fn to_csv(&self) -> Result<Vec<u8>, ScanError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(OCR_HEADER)
            .map_err(|e| ScanError::Internal(format!("OCR table: {e}")))?;
        for word in &self.words {
            writer
                .serialize(word)
                .map_err(|e| ScanError::Internal(format!("OCR table: {e}")))?;
        }
        writer
            .into_inner()
            .map_err(|e| ScanError::Internal(format!("OCR table: {e}")))
    }

    /// Parse a persisted OCR table. Anything unexpected is an
    /// [`ScanError::ArtifactIo`].
    pub fn from_csv(bytes: &[u8], path: &Path) -> Result<Self, ScanError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| ScanError::artifact_io(path, e))?
            .clone();
        if headers.iter().collect::<Vec<_>>() != OCR_HEADER {
            return Err(ScanError::artifact_io(
                path,
                format!("unexpected header {:?}", headers),
            ));
        }
        let words = reader
            .deserialize::<OcrWord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ScanError::artifact_io(path, e))?;
        Ok(Self { words })
    }
}

/// Turns a page image into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise the text of the PNG at `image_path`.
    async fn recognize(&self, image_path: &Path) -> Result<OcrPage, OcrError>;
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// OCR via the `tesseract` command-line tool.
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    /// Use `tesseract` from `PATH`.
    pub fn new(language: impl Into<String>, dpi: u32) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: language.into(),
            dpi,
        }
    }

    /// Use a specific tesseract executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image_path: &Path) -> Result<OcrPage, OcrError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .arg("tsv")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OcrError::EngineUnavailable(format!("'{}' not found", self.binary.display()))
                } else {
                    OcrError::EngineUnavailable(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let page = parse_tesseract_tsv(&tsv);
        debug!(
            "tesseract: {} words from {}",
            page.words.len(),
            image_path.display()
        );
        Ok(page)
    }
}

/// Parse Tesseract TSV output into words.
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Level 5 rows are words; confidence is 0–100 and -1 when
/// Tesseract cannot assign one. Lines are numbered in order of first
/// appearance of each (block, paragraph, line) triple.
pub fn parse_tesseract_tsv(tsv: &str) -> OcrPage {
    let mut words = Vec::new();
    let mut last_key: Option<(u32, u32, u32)> = None;
    let mut line_idx = 0usize;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        let key = match (fields[2].parse(), fields[3].parse(), fields[4].parse()) {
            (Ok(b), Ok(p), Ok(l)) => (b, p, l),
            _ => continue,
        };
        match last_key {
            Some(k) if k == key => {}
            Some(_) => line_idx += 1,
            None => {}
        }
        last_key = Some(key);

        let confidence = fields[10]
            .parse::<f32>()
            .ok()
            .filter(|c| *c >= 0.0)
            .map(|c| (c / 100.0).min(1.0));

        words.push(OcrWord {
            line: line_idx,
            text: text.to_string(),
            confidence,
        });
    }

    OcrPage { words }
}

// ── Vision LLM ───────────────────────────────────────────────────────────────

/// OCR by asking a vision LLM to transcribe the page image.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, image_path: &Path) -> Result<OcrPage, OcrError> {
        let image = encode::encode_page_file(image_path)
            .await
            .map_err(|e| OcrError::Failed(format!("cannot read {}: {e}", image_path.display())))?;

        let messages = vec![
            ChatMessage::system(TRANSCRIPTION_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;

        debug!(
            "vision OCR: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(OcrPage::from_text(&response.content, None))
    }
}
