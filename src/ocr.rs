//! Document page OCR through a vision-capable LLM.
//!
//! Pages are images (one per document page). `Basic` mode asks for Markdown
//! text; `Structured` mode attaches the `page_analysis` shape and validates the
//! reply, so a malformed element list fails the page instead of leaking into
//! the results.

use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::llm::{
    ContentBlock, ConversationMessage, GenerationRequest, GenerationService, ModelSettings, Role,
};
use crate::schema::{FieldSpec, OutputShape};
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SYSTEM_PROMPT: &str = "You are an OCR expert specialized in the data extraction from various \
types of documents. You are always precise and make sure that extraction is done properly.";

const BASIC_PROMPT: &str = "Provided below you can find a document. Perform a full-scale OCR process \
on it. Return its content in the Markdown but **without** backticks used for usual code marking in the \
document itself. Do your best to provide original format and try to retain as much of original \
structure as possible. Use regular Markdown elements like tables, image descriptions, lists, headers \
and others. Do not perform any additional actions other than recognition of the characters in the \
document and translating it into a Markdown result.";

const STRUCTURED_PROMPT: &str = "You are an expert OCR and document analysis system. Provided below \
is a document. Analyze it and return a structured JSON response:\n\
1. file_type: the specific category of the document (e.g. invoice, internal_document, instruction).\n\
2. file_content_md: full-scale OCR of the document as Markdown, retaining the original structure \
(tables, headers, lists).\n\
3. file_elements: a granular list of elements found. For each element give its element_type \
(e.g. table, image_description, paragraph) and its element_content.\n\
Strictly perform character recognition and structural mapping. Do not add commentary.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    Basic,
    #[default]
    Structured,
}

impl OcrMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "structured" => Ok(Self::Structured),
            other => Err(Error::config(format!(
                "unknown OCR mode '{other}' (expected basic, structured)"
            ))),
        }
    }

    fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::Basic => None,
            Self::Structured => Some("structured"),
        }
    }
}

/// One page image loaded for sending.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub path: PathBuf,
    pub media_type: &'static str,
}

impl PageImage {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let media_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => {
                return Err(Error::invalid_input(format!(
                    "{} is not a supported page image (jpg, jpeg, png, webp, gif)",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            media_type,
        })
    }

    /// File stem used as the page's name in results.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".into())
    }

    async fn content_block(&self) -> Result<ContentBlock> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(ContentBlock::Image {
            media_type: self.media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileElement {
    pub element_type: String,
    pub element_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub file_type: String,
    pub file_content_md: String,
    pub file_elements: Vec<FileElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PageOutput {
    Basic {
        filename: String,
        result: String,
    },
    Structured {
        filename: String,
        analysis_result: PageAnalysis,
    },
}

impl PageOutput {
    pub fn filename(&self) -> &str {
        match self {
            Self::Basic { filename, .. } | Self::Structured { filename, .. } => filename,
        }
    }
}

/// Results file written per source document.
#[derive(Debug, Serialize)]
pub struct DocumentResults<'a> {
    pub source: &'a str,
    pub analyzed_at: DateTime<Utc>,
    pub pages: &'a [PageOutput],
}

pub fn page_analysis_shape() -> OutputShape {
    OutputShape::new(
        "page_analysis",
        vec![
            FieldSpec::text(
                "file_type",
                "Type name which can describe given file precisely, e.g. invoice, \
                 internal_document, instruction, other",
                0,
            ),
            FieldSpec::text(
                "file_content_md",
                "Output of the OCR process, contents of the file in Markdown",
                0,
            ),
            FieldSpec::list(
                "file_elements",
                "Elements the given page consists of: tables, images, paragraphs, graphs, \
                 flowcharts etc.",
                vec![
                    FieldSpec::text("element_type", "Type of the element found on the page", 0),
                    FieldSpec::text(
                        "element_content",
                        "Content of the element found on the page",
                        0,
                    ),
                ],
            ),
        ],
    )
}

pub struct DocumentAnalyzer<S> {
    service: S,
    gate: AdmissionGate,
    mode: OcrMode,
    settings: ModelSettings,
}

impl<S: GenerationService> DocumentAnalyzer<S> {
    /// Defaults to temperature 0: OCR wants the most literal transcription.
    pub fn new(service: S, mode: OcrMode) -> Self {
        let settings = ModelSettings {
            temperature: Some(0.0),
            ..service.settings()
        };
        Self {
            service,
            gate: AdmissionGate::default(),
            mode,
            settings,
        }
    }

    pub fn from_config(service: S, config: &crate::config::OcrConfig) -> Self {
        let mut analyzer = Self::new(service, config.mode).with_max_in_flight(config.max_in_flight);
        analyzer.settings.temperature = Some(config.temperature);
        analyzer
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.gate = AdmissionGate::new(max_in_flight);
        self
    }

    pub fn mode(&self) -> OcrMode {
        self.mode
    }

    pub async fn analyze_page(&self, path: &Path) -> Result<PageOutput> {
        let page = PageImage::from_path(path)?;
        self.gate.run(self.run_inference(&page)).await
    }

    /// Analyze all pages concurrently through the admission gate. Output order follows
    /// `paths`; the first failing page fails the batch.
    pub async fn analyze_pages(&self, paths: &[PathBuf]) -> Result<Vec<PageOutput>> {
        let pages = paths
            .iter()
            .map(|p| PageImage::from_path(p))
            .collect::<Result<Vec<_>>>()?;
        info!(pages = pages.len(), mode = ?self.mode, "analyzing pages");

        join_all(
            pages
                .iter()
                .map(|page| self.gate.run(self.run_inference(page))),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn run_inference(&self, page: &PageImage) -> Result<PageOutput> {
        let prompt = match self.mode {
            OcrMode::Basic => BASIC_PROMPT,
            OcrMode::Structured => STRUCTURED_PROMPT,
        };
        let mut request = GenerationRequest {
            system: SYSTEM_PROMPT.into(),
            messages: vec![ConversationMessage {
                role: Role::User,
                content: vec![
                    ContentBlock::Text {
                        text: prompt.into(),
                    },
                    page.content_block().await?,
                ],
            }],
            settings: Some(self.settings),
            ..Default::default()
        };
        let shape = page_analysis_shape();
        if self.mode == OcrMode::Structured {
            request.output = Some(shape.clone());
        }

        debug!(page = %page.name(), "sending page");
        let completion = self.service.generate(&request).await.inspect_err(|e| {
            warn!(page = %page.name(), error = %e, "unexpected error during inference");
        })?;
        info!(page = %page.name(), "file analyzed");

        match self.mode {
            OcrMode::Basic => Ok(PageOutput::Basic {
                filename: page.name(),
                result: completion.text(),
            }),
            OcrMode::Structured => {
                let fields = shape.decode(&completion.text())?;
                let analysis: PageAnalysis = serde_json::from_value(fields.into())
                    .map_err(|e| Error::parse(format!("decode page analysis: {e}")))?;
                Ok(PageOutput::Structured {
                    filename: page.name(),
                    analysis_result: analysis,
                })
            }
        }
    }

    /// Write results for one source document, prefixed with the mode name in structured mode.
    pub fn save_results(
        &self,
        base_filename: &str,
        outputs: &[PageOutput],
        save_dir: &Path,
    ) -> Result<PathBuf> {
        save_results(self.mode.prefix(), base_filename, outputs, save_dir)
    }
}

/// Files in `dir` (not recursive) with the given extension, sorted by path.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::invalid_input(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&wanted))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Write `{save_dir}/{prefix_}{base_filename}.json`, creating the directory.
pub fn save_results(
    prefix: Option<&str>,
    base_filename: &str,
    outputs: &[PageOutput],
    save_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(save_dir)?;
    let name = match prefix {
        Some(p) => format!("{p}_{base_filename}.json"),
        None => format!("{base_filename}.json"),
    };
    let path = save_dir.join(name);
    let doc = DocumentResults {
        source: base_filename,
        analyzed_at: Utc::now(),
        pages: outputs,
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| Error::parse(format!("serialize results: {e}")))?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), pages = outputs.len(), "results saved");
    Ok(path)
}
