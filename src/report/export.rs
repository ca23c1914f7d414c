//! Report export: raster and native-table PDF strategies, file naming, and
//! the zip bundle with a checksummed manifest.

use super::pdf::{self, Font, Page, PdfDocument, PdfImage, Rgb};
use super::pivot::{PivotTable, ReportKind, Tone};
use super::raster;
use crate::config::ReportConfig;
use crate::error::{AppError, AppResult};
use anyhow::Context;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT: &str = "schoold-report-bundle-v1";

const RASTER_MARGIN: f32 = 18.0;
const TABLE_MARGIN: f32 = 36.0;
const CELL_FONT: f32 = 8.0;
const CELL_PAD: f32 = 3.0;
const LINE_H: f32 = 10.0;

const BLACK: Rgb = (17, 24, 39);
const HEADER_FILL: Rgb = (229, 231, 235);
const GRID: Rgb = (209, 213, 219);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Raster,
    Table,
}

impl Strategy {
    /// `None` selects the table strategy.
    pub fn parse(raw: Option<&str>) -> AppResult<Strategy> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("table") => Ok(Strategy::Table),
            Some("raster") | Some("image") => Ok(Strategy::Raster),
            Some(other) => Err(AppError::BadParams(format!("unknown export strategy: {}", other))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Raster => "raster",
            Strategy::Table => "table",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub kind: ReportKind,
    pub classroom_name: String,
    /// Month (`YYYY-MM`) for attendance, quarter name for grades.
    pub period_label: String,
    pub generated_at: String,
}

impl ReportMeta {
    pub fn title(&self) -> String {
        format!("{} Report", self.kind.label())
    }

    pub fn subtitle(&self) -> String {
        format!("{} - {}", self.classroom_name, self.period_label)
    }

    pub fn file_name(&self) -> String {
        file_name(self.kind, &self.classroom_name, &self.period_label)
    }
}

pub fn sanitize(part: &str) -> String {
    let s: String = part
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() {
        "_".to_string()
    } else {
        s
    }
}

/// `{ReportType}_Report_{Classroom}_{Period}.pdf`
pub fn file_name(kind: ReportKind, classroom: &str, period: &str) -> String {
    format!(
        "{}_Report_{}_{}.pdf",
        kind.label(),
        sanitize(classroom),
        sanitize(period)
    )
}

fn pdf_rgb(c: image::Rgb<u8>) -> Rgb {
    (c.0[0], c.0[1], c.0[2])
}

/// One page holding the rendered bitmap. Orientation follows the image
/// aspect ratio and the page height is derived from its width.
pub fn raster_pdf(table: &PivotTable, meta: &ReportMeta) -> anyhow::Result<Vec<u8>> {
    let img = raster::render(table, &meta.title(), &meta.subtitle())?;
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        anyhow::bail!("rendered report is empty");
    }
    let landscape = iw >= ih;
    let page_w = if landscape { pdf::A4_LONG } else { pdf::A4_SHORT };
    let draw_w = page_w - 2.0 * RASTER_MARGIN;
    let draw_h = draw_w * ih as f32 / iw as f32;
    let page_h = draw_h + 2.0 * RASTER_MARGIN;

    let mut page = Page::new(page_w, page_h);
    page.draw_image(
        PdfImage {
            width: iw,
            height: ih,
            rgb: img.into_raw(),
        },
        RASTER_MARGIN,
        RASTER_MARGIN,
        draw_w,
        draw_h,
    );
    let mut doc = PdfDocument::new(meta.title());
    doc.push(page);
    doc.to_bytes()
}

/// Greedy word wrap; words wider than `width` are split by character.
pub fn wrap(text: &str, width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };
        if pdf::text_width(&candidate, size) <= width {
            line = candidate;
            continue;
        }
        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        for c in word.chars() {
            line.push(c);
            if line.chars().count() > 1 && pdf::text_width(&line, size) > width {
                line.pop();
                lines.push(std::mem::take(&mut line));
                line.push(c);
            }
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn column_widths(table: &PivotTable, usable: f32, cfg: &ReportConfig) -> Vec<f32> {
    let n = table.columns.len();
    let has_comment = table.kind == ReportKind::Grades && n > 0;
    let fixed = cfg.name_column_width + if has_comment { cfg.comment_column_width } else { 0.0 };
    let flexible = if has_comment { n - 1 } else { n };
    let share = if flexible > 0 {
        ((usable - fixed) / flexible as f32).max(12.0)
    } else {
        0.0
    };
    let mut widths = vec![cfg.name_column_width];
    widths.extend(std::iter::repeat(share).take(flexible));
    if has_comment {
        widths.push(cfg.comment_column_width);
    }
    widths
}

struct TableLayout<'a> {
    widths: &'a [f32],
    left: f32,
}

impl TableLayout<'_> {
    /// Draws one row whose top edge is at `top`; returns its height.
    fn row(&self, page: &mut Page, top: f32, cells: &[(String, Tone)], header: bool) -> f32 {
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(self.widths)
            .map(|((text, _), w)| wrap(text, w - 2.0 * CELL_PAD, CELL_FONT))
            .collect();
        let lines = wrapped.iter().map(|l| l.len()).max().unwrap_or(1).max(1);
        let height = lines as f32 * LINE_H + 2.0 * CELL_PAD;
        let bottom = top - height;

        let mut x = self.left;
        for (((_, tone), w), text_lines) in cells.iter().zip(self.widths).zip(&wrapped) {
            let (bg, fg) = if header {
                (HEADER_FILL, BLACK)
            } else {
                let (bg, fg) = raster::tone_colors(*tone);
                (pdf_rgb(bg), pdf_rgb(fg))
            };
            if bg != (255, 255, 255) {
                page.fill_rect(x, bottom, *w, height, bg);
            }
            page.stroke_rect(x, bottom, *w, height, GRID, 0.5);
            let font = if header { Font::Bold } else { Font::Regular };
            for (i, line) in text_lines.iter().enumerate() {
                let baseline = top - CELL_PAD - (i as f32 + 1.0) * LINE_H + 2.0;
                page.text(x + CELL_PAD, baseline, CELL_FONT, font, fg, line);
            }
            x += w;
        }
        height
    }
}

/// Native text table on A4 landscape pages with a repeated header row.
pub fn table_pdf(table: &PivotTable, meta: &ReportMeta, cfg: &ReportConfig) -> anyhow::Result<Vec<u8>> {
    let (page_w, page_h) = (pdf::A4_LONG, pdf::A4_SHORT);
    let usable = page_w - 2.0 * TABLE_MARGIN;
    let widths = column_widths(table, usable, cfg);
    let layout = TableLayout {
        widths: &widths,
        left: TABLE_MARGIN,
    };

    let header: Vec<(String, Tone)> = std::iter::once("Student".to_string())
        .chain(table.column_labels())
        .map(|l| (l, Tone::Plain))
        .collect();
    let body: Vec<Vec<(String, Tone)>> = table
        .rows
        .iter()
        .map(|r| {
            std::iter::once((r.student_name.clone(), Tone::Plain))
                .chain(r.cells.iter().map(|c| (c.display(), c.tone())))
                .collect()
        })
        .collect();

    let mut doc = PdfDocument::new(meta.title());
    let new_page = |first: bool| -> (Page, f32) {
        let mut page = Page::new(page_w, page_h);
        let mut top = page_h - TABLE_MARGIN;
        if first {
            page.text(TABLE_MARGIN, top - 14.0, 14.0, Font::Bold, BLACK, &meta.title());
            page.text(TABLE_MARGIN, top - 30.0, 10.0, Font::Regular, BLACK, &meta.subtitle());
            top -= 42.0;
        }
        let h = layout.row(&mut page, top, &header, true);
        (page, top - h)
    };

    let (mut page, mut top) = new_page(true);
    let mut rows_on_page = 0usize;
    for row in &body {
        let mut scratch = Page::new(page_w, page_h);
        let needed = layout.row(&mut scratch, page_h, row, false);
        if top - needed < TABLE_MARGIN && rows_on_page > 0 {
            doc.push(page);
            (page, top) = new_page(false);
            rows_on_page = 0;
        }
        top -= layout.row(&mut page, top, row, false);
        rows_on_page += 1;
    }
    page.text(
        TABLE_MARGIN,
        TABLE_MARGIN / 2.0,
        7.0,
        Font::Regular,
        (107, 114, 128),
        &format!("Generated {}", meta.generated_at),
    );
    doc.push(page);
    doc.to_bytes()
}

/// Renders with the chosen strategy. Failures are logged and surface as
/// `report_failed`.
pub fn render_pdf(
    table: &PivotTable,
    meta: &ReportMeta,
    strategy: Strategy,
    cfg: &ReportConfig,
) -> AppResult<Vec<u8>> {
    let result = match strategy {
        Strategy::Raster => raster_pdf(table, meta),
        Strategy::Table => table_pdf(table, meta, cfg),
    };
    result.map_err(|e| {
        log::error!(
            "{} export of {} failed: {:#}",
            strategy.as_str(),
            meta.file_name(),
            e
        );
        AppError::Report(format!("{:#}", e))
    })
}

pub fn write_export(dir: &Path, name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(path)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone)]
pub struct BundleSummary {
    pub path: PathBuf,
    pub entry_count: usize,
}

/// Writes `entries` plus a `manifest.json` listing each entry's size and
/// SHA-256. `extra` is merged into the manifest.
pub fn write_bundle(
    out_path: &Path,
    entries: &[(String, Vec<u8>)],
    extra: serde_json::Value,
) -> anyhow::Result<BundleSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let listed: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, bytes)| {
            json!({
                "name": name,
                "bytes": bytes.len(),
                "sha256": sha256_hex(bytes),
            })
        })
        .collect();
    let mut manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "entries": listed,
    });
    if let (Some(m), serde_json::Value::Object(extra)) = (manifest.as_object_mut(), extra) {
        for (k, v) in extra {
            m.entry(k).or_insert(v);
        }
    }

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
    }
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(BundleSummary {
        path: out_path.to_path_buf(),
        entry_count: entries.len() + 1,
    })
}
