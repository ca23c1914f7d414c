//! Minimal PDF 1.4 writer: base-14 Helvetica text, filled/stroked
//! rectangles, and one RGB image per page. Streams are Flate-compressed.

use anyhow::Context;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

pub const A4_LONG: f32 = 842.0;
pub const A4_SHORT: f32 = 595.0;

pub type Rgb = (u8, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdfImage {
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit RGB triples.
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub width: f32,
    pub height: f32,
    ops: Vec<u8>,
    image: Option<PdfImage>,
}

/// Approximate Helvetica advance; good enough for wrapping decisions.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| match c {
            'i' | 'j' | 'l' | '.' | ',' | '\'' | '|' | ':' | ';' | '!' => 0.28,
            'f' | 't' | 'r' | ' ' | '(' | ')' | '-' | '/' => 0.33,
            'm' | 'w' | 'M' | 'W' => 0.85,
            'A'..='Z' => 0.67,
            _ => 0.55,
        })
        .sum::<f32>()
        * size
}

fn encode_text(text: &str, out: &mut Vec<u8>) {
    out.push(b'(');
    for c in text.chars() {
        let b = match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        };
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b')');
}

fn color(c: Rgb) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        c.0 as f32 / 255.0,
        c.1 as f32 / 255.0,
        c.2 as f32 / 255.0
    )
}

impl Page {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            image: None,
        }
    }

    /// `y` is the baseline, measured from the bottom edge.
    pub fn text(&mut self, x: f32, y: f32, size: f32, font: Font, fill: Rgb, text: &str) {
        let head = format!(
            "BT {} rg /{} {:.1} Tf {:.2} {:.2} Td ",
            color(fill),
            font.resource(),
            size,
            x,
            y
        );
        self.ops.extend_from_slice(head.as_bytes());
        encode_text(text, &mut self.ops);
        self.ops.extend_from_slice(b" Tj ET\n");
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, fill: Rgb) {
        let op = format!("{} rg {:.2} {:.2} {:.2} {:.2} re f\n", color(fill), x, y, w, h);
        self.ops.extend_from_slice(op.as_bytes());
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, stroke: Rgb, line_width: f32) {
        let op = format!(
            "{} RG {:.2} w {:.2} {:.2} {:.2} {:.2} re S\n",
            color(stroke),
            line_width,
            x,
            y,
            w,
            h
        );
        self.ops.extend_from_slice(op.as_bytes());
    }

    /// Places `image` scaled into the given box. One image per page.
    pub fn draw_image(&mut self, image: PdfImage, x: f32, y: f32, w: f32, h: f32) {
        let op = format!("q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im1 Do Q\n", w, h, x, y);
        self.ops.extend_from_slice(op.as_bytes());
        self.image = Some(image);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfDocument {
    pub title: String,
    pub pages: Vec<Page>,
}

fn deflate(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).context("failed to compress stream")?;
    enc.finish().context("failed to finish stream")
}

struct ObjectWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl ObjectWriter {
    fn begin(&mut self, id: usize) {
        if self.offsets.len() < id {
            self.offsets.resize(id, 0);
        }
        self.offsets[id - 1] = self.buf.len();
        self.buf.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    }

    fn dict(&mut self, id: usize, body: &str) {
        self.begin(id);
        self.buf.extend_from_slice(body.as_bytes());
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, extra_dict: &str, data: &[u8]) {
        self.begin(id);
        let head = format!(
            "<< {} /Filter /FlateDecode /Length {} >>\nstream\n",
            extra_dict,
            data.len()
        );
        self.buf.extend_from_slice(head.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }
}

impl PdfDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: Vec::new(),
        }
    }

    pub fn push(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        if self.pages.is_empty() {
            anyhow::bail!("document has no pages");
        }
        let mut w = ObjectWriter {
            buf: Vec::new(),
            offsets: Vec::new(),
        };
        w.buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

        // 1 catalog, 2 page tree, 3/4 fonts, 5 info, then 3 ids per page.
        const FIRST_PAGE_ID: usize = 6;
        let page_id = |i: usize| FIRST_PAGE_ID + i * 3;
        let kids = (0..self.pages.len())
            .map(|i| format!("{} 0 R", page_id(i)))
            .collect::<Vec<_>>()
            .join(" ");

        w.dict(1, "<< /Type /Catalog /Pages 2 0 R >>");
        w.dict(
            2,
            &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, self.pages.len()),
        );
        w.dict(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        w.dict(
            4,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );
        let mut info = b"<< /Producer (schoold) /Title ".to_vec();
        encode_text(&self.title, &mut info);
        info.extend_from_slice(b" >>");
        w.begin(5);
        w.buf.extend_from_slice(&info);
        w.buf.extend_from_slice(b"\nendobj\n");

        for (i, page) in self.pages.iter().enumerate() {
            let pid = page_id(i);
            let content_id = pid + 1;
            let image_id = pid + 2;
            let xobject = match &page.image {
                Some(_) => format!(" /XObject << /Im1 {} 0 R >>", image_id),
                None => String::new(),
            };
            w.dict(
                pid,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R >>{} >> /Contents {} 0 R >>",
                    page.width, page.height, xobject, content_id
                ),
            );
            w.stream(content_id, "", &deflate(&page.ops)?);
            match &page.image {
                Some(img) => {
                    let expected = img.width as usize * img.height as usize * 3;
                    if img.rgb.len() != expected {
                        anyhow::bail!(
                            "image buffer is {} bytes, expected {}",
                            img.rgb.len(),
                            expected
                        );
                    }
                    w.stream(
                        image_id,
                        &format!(
                            "/Type /XObject /Subtype /Image /Width {} /Height {} \
                             /ColorSpace /DeviceRGB /BitsPerComponent 8",
                            img.width, img.height
                        ),
                        &deflate(&img.rgb)?,
                    );
                }
                // Keep ids dense so the xref has no gaps.
                None => w.dict(image_id, "null"),
            }
        }

        let xref_at = w.buf.len();
        let count = w.offsets.len() + 1;
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", count);
        for off in &w.offsets {
            tail.push_str(&format!("{:010} 00000 n \n", off));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
            count, xref_at
        ));
        w.buf.extend_from_slice(tail.as_bytes());
        Ok(w.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(PdfDocument::new("x").to_bytes().is_err());
    }

    #[test]
    fn writes_header_pages_and_trailer() {
        let mut doc = PdfDocument::new("Attendance (Jan)");
        let mut p = Page::new(A4_LONG, A4_SHORT);
        p.text(36.0, 550.0, 12.0, Font::Bold, (0, 0, 0), "Hello");
        doc.push(p);
        doc.push(Page::new(A4_LONG, A4_SHORT));
        let bytes = doc.to_bytes().expect("pdf");
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(contains(&bytes, b"/Count 2"));
        assert!(contains(&bytes, b"(Attendance \\(Jan\\))"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let mut doc = PdfDocument::new("t");
        doc.push(Page::new(100.0, 100.0));
        let bytes = doc.to_bytes().expect("pdf");
        let text = String::from_utf8_lossy(&bytes).to_string();
        let xref = text.rfind("xref\n").expect("xref");
        let first_entry = text[xref..].lines().nth(3).expect("entry for object 1");
        let off: usize = first_entry[..10].parse().expect("offset");
        assert!(bytes[off..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn image_size_mismatch_is_an_error() {
        let mut doc = PdfDocument::new("t");
        let mut p = Page::new(100.0, 100.0);
        p.draw_image(
            PdfImage {
                width: 2,
                height: 2,
                rgb: vec![0; 5],
            },
            0.0,
            0.0,
            100.0,
            100.0,
        );
        doc.push(p);
        assert!(doc.to_bytes().is_err());
    }

    #[test]
    fn text_width_grows_with_length_and_size() {
        assert!(text_width("abcdef", 10.0) > text_width("abc", 10.0));
        assert!(text_width("abc", 12.0) > text_width("abc", 8.0));
    }
}
