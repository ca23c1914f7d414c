//! Renders a pivot table to an RGB bitmap with plotters' bitmap backend.

use super::pivot::{PivotTable, Tone};
use anyhow::Context;
use image::{Rgb, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::panic::{self, AssertUnwindSafe};

const FONT: &str = "sans-serif";
const TEXT_SIZE: u32 = 16;
const TITLE_SIZE: u32 = 22;
/// Layout advance per character; independent of the installed font.
const CHAR_W: u32 = 9;
const PAD: u32 = 8;
const ROW_H: u32 = 30;
const TITLE_H: u32 = 2 * ROW_H;
const MAX_COMMENT_CHARS: usize = 40;

const WHITE_BG: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([17, 24, 39]);
const SUBTLE: Rgb<u8> = Rgb([75, 85, 99]);
const GRID: Rgb<u8> = Rgb([209, 213, 219]);
const HEADER_BG: Rgb<u8> = Rgb([229, 231, 235]);

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Background and foreground for a tone.
pub fn tone_colors(tone: Tone) -> (Rgb<u8>, Rgb<u8>) {
    match tone {
        Tone::Plain => (WHITE_BG, INK),
        Tone::Positive => (Rgb([220, 252, 231]), Rgb([21, 128, 61])),
        Tone::Negative => (Rgb([254, 226, 226]), Rgb([185, 28, 28])),
        Tone::Caution => (Rgb([254, 243, 199]), Rgb([161, 98, 7])),
        Tone::Neutral => (Rgb([243, 244, 246]), Rgb([55, 65, 81])),
        Tone::Muted => (WHITE_BG, Rgb([156, 163, 175])),
        Tone::Warning => (Rgb([255, 237, 213]), Rgb([194, 65, 12])),
    }
}

fn color(c: Rgb<u8>) -> RGBColor {
    RGBColor(c.0[0], c.0[1], c.0[2])
}

fn text_px(text: &str) -> u32 {
    text.chars().count() as u32 * CHAR_W
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max.saturating_sub(2)).collect();
    s.push_str("..");
    s
}

/// Draws text through the font backend. When no font can be loaded the
/// first failure is logged and later labels are skipped, leaving the
/// coloured cells in place.
struct Labels {
    available: bool,
}

impl Labels {
    fn draw(&mut self, area: &Area, text: &str, x: u32, y: u32, ink: Rgb<u8>, size: u32) {
        if !self.available || text.is_empty() {
            return;
        }
        let style = (FONT, size).into_font().color(&color(ink));
        // Font lookup panics instead of erroring when fontconfig is missing.
        let drawn = panic::catch_unwind(AssertUnwindSafe(|| {
            area.draw_text(text, &style, (x as i32, y as i32))
                .map_err(|e| e.to_string())
        }));
        let failure = match drawn {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(_) => "font backend panicked".to_string(),
        };
        log::warn!("report text rendering unavailable, drawing cells only: {}", failure);
        self.available = false;
    }
}

fn cell(area: &Area, x: u32, y: u32, w: u32, h: u32, bg: Rgb<u8>) -> anyhow::Result<()> {
    let corners = [(x as i32, y as i32), ((x + w) as i32, (y + h) as i32)];
    area.draw(&Rectangle::new(corners, color(bg).filled()))
        .map_err(|e| anyhow::anyhow!("failed to fill cell: {}", e))?;
    area.draw(&Rectangle::new(corners, ShapeStyle::from(&color(GRID))))
        .map_err(|e| anyhow::anyhow!("failed to draw grid: {}", e))?;
    Ok(())
}

/// Lays the table out under a title block and returns the bitmap.
pub fn render(table: &PivotTable, title: &str, subtitle: &str) -> anyhow::Result<RgbImage> {
    let header: Vec<String> = std::iter::once("Student".to_string())
        .chain(table.column_labels())
        .collect();
    let body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|r| {
            std::iter::once(r.student_name.clone())
                .chain(r.cells.iter().map(|c| clip(&c.display(), MAX_COMMENT_CHARS)))
                .collect()
        })
        .collect();

    let widths: Vec<u32> = (0..header.len())
        .map(|i| {
            let longest = body
                .iter()
                .filter_map(|row| row.get(i))
                .chain(std::iter::once(&header[i]))
                .map(|s| text_px(s))
                .max()
                .unwrap_or(0);
            longest + 2 * PAD
        })
        .collect();

    let table_w: u32 = widths.iter().sum();
    let width = table_w.max(text_px(title).max(text_px(subtitle)) + 2 * PAD) + 2 * PAD;
    let height = TITLE_H + ROW_H * (body.len() as u32 + 1) + 2 * PAD;
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    {
        let area = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        area.fill(&color(WHITE_BG))
            .map_err(|e| anyhow::anyhow!("failed to clear canvas: {}", e))?;
        let mut labels = Labels { available: true };
        labels.draw(&area, title, PAD, PAD, INK, TITLE_SIZE);
        labels.draw(&area, subtitle, PAD, PAD + ROW_H, SUBTLE, TEXT_SIZE);

        let top = TITLE_H + PAD;
        let mut x = PAD;
        for (i, label) in header.iter().enumerate() {
            cell(&area, x, top, widths[i], ROW_H, HEADER_BG)?;
            labels.draw(&area, label, x + PAD, top + PAD, INK, TEXT_SIZE);
            x += widths[i];
        }

        for (r, row) in body.iter().enumerate() {
            let y = top + ROW_H * (r as u32 + 1);
            let mut x = PAD;
            for (i, text) in row.iter().enumerate() {
                let (bg, fg) = if i == 0 {
                    (WHITE_BG, INK)
                } else {
                    tone_colors(table.rows[r].cells[i - 1].tone())
                };
                cell(&area, x, y, widths[i], ROW_H, bg)?;
                labels.draw(&area, text, x + PAD, y + PAD, fg, TEXT_SIZE);
                x += widths[i];
            }
        }
        area.present()
            .map_err(|e| anyhow::anyhow!("failed to finish bitmap: {}", e))?;
    }
    RgbImage::from_raw(width, height, buf).context("bitmap buffer has the wrong size")
}
