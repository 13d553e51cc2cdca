//! PDF rasterisation: page count and page images via pdfium.
//!
//! The pipeline talks to the [`Rasterizer`] trait only. [`PdfiumRasterizer`]
//! wraps `pdfium-render`; every call runs inside `spawn_blocking` because the
//! pdfium bindings are synchronous and CPU-bound.
//!
//! Rendered pages are written to a temp file next to their target and renamed
//! into place once encoding succeeded, so a crash never leaves a half-written
//! `page_<n>.png` that looks fresh on the next run.
//!
//! ## Resolution
//!
//! Pages are scaled by `dpi / 72` and then capped so neither edge exceeds
//! `max_rendered_pixels`. OCR quality drops sharply below ~150 DPI while
//! an A3 page at 300 DPI is already ~5,000 px tall.

use crate::config::ScanConfig;
use crate::error::ScanError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or the directory holding it.
pub const PDFIUM_LIB_ENV: &str = "PDFCLASSIFY_PDFIUM_LIB";

/// Where to write one rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    /// 1-based page index.
    pub page: usize,
    pub path: PathBuf,
}

/// Turns a PDF into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Number of pages in `pdf`.
    async fn page_count(&self, pdf: &Path) -> Result<usize, ScanError>;

    /// Render each requested page to its target path as PNG. Either every
    /// target is written or an error is returned.
    async fn render_pages(&self, pdf: &Path, targets: &[PageTarget]) -> Result<(), ScanError>;
}

/// [`Rasterizer`] backed by a pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &ScanConfig) -> Self {
        let library = config
            .pdfium_library
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_ENV).map(PathBuf::from));
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            library,
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, ScanError> {
        let path = pdf.to_path_buf();
        let library = self.library.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, ScanError> {
            let pdfium = bind_pdfium(library.as_deref())?;
            let document = open_document(&pdfium, &path)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("Page count task panicked: {e}")))?
    }

    async fn render_pages(&self, pdf: &Path, targets: &[PageTarget]) -> Result<(), ScanError> {
        if targets.is_empty() {
            return Ok(());
        }
        let path = pdf.to_path_buf();
        let library = self.library.clone();
        let targets = targets.to_vec();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);

        tokio::task::spawn_blocking(move || -> Result<(), ScanError> {
            let pdfium = bind_pdfium(library.as_deref())?;
            let document = open_document(&pdfium, &path)?;
            render_blocking(&document, &path, &targets, dpi, max_pixels)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("Render task panicked: {e}")))?
    }
}

/// Bind to pdfium: an explicit library (file or directory) first, then the
/// working directory, then the system library search path.
fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, ScanError> {
    let bindings = match library {
        Some(lib) => {
            let file = if lib.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(lib)
            } else {
                lib.to_path_buf()
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ScanError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ScanError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ScanError::DocumentUnreadable {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn render_blocking(
    document: &PdfDocument<'_>,
    pdf: &Path,
    targets: &[PageTarget],
    dpi: u32,
    max_pixels: u32,
) -> Result<(), ScanError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    let scale = dpi as f32 / 72.0;
    let unreadable = |detail: String| ScanError::DocumentUnreadable {
        path: pdf.to_path_buf(),
        detail,
    };

    // Render everything to temp paths first, then move into place.
    let mut staged = Vec::with_capacity(targets.len());
    for target in targets {
        if target.page == 0 || target.page > total {
            return Err(unreadable(format!(
                "page {} out of range (document has {total})",
                target.page
            )));
        }
        let page = pages
            .get((target.page - 1) as u16)
            .map_err(|e| unreadable(format!("page {}: {e:?}", target.page)))?;

        let width = (page.width().value * scale).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| unreadable(format!("page {}: {e:?}", target.page)))?;
        let image = bitmap.as_image();

        let dir = target
            .path
            .parent()
            .ok_or_else(|| ScanError::artifact_io(&target.path, "page path has no parent"))?;
        let tmp = tempfile::Builder::new()
            .prefix(".page-")
            .suffix(".png")
            .tempfile_in(dir)
            .map_err(|e| ScanError::artifact_io(&target.path, e))?
            .into_temp_path();
        image
            .save_with_format(&tmp, image::ImageFormat::Png)
            .map_err(|e| ScanError::artifact_io(&target.path, e))?;

        debug!(
            "Rendered page {} → {}x{} px",
            target.page,
            image.width(),
            image.height()
        );
        staged.push((tmp, &target.path));
    }

    for (tmp, path) in staged {
        tmp.persist(path)
            .map_err(|e| ScanError::artifact_io(path, e.error))?;
    }
    info!("Rendered {} page(s) of {}", targets.len(), pdf.display());
    Ok(())
}
