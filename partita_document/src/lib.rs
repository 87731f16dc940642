// Partita document assembler.
//
// Builds a paginated PDF 1.4 file from already-rasterized score pages,
// writing the object graph and cross-reference table by hand. Each page is
// one full-bleed image:
//
//   object 1          catalog
//   object 2          page tree listing every page
//   object 3 + 3i     page i (MediaBox in points, 72 per inch)
//   object 4 + 3i     content stream placing the image
//   object 5 + 3i     the image XObject holding the compressed bytes
//
// Pixels are taken at 96 per inch, so one pixel is 0.75 pt. The crate knows
// nothing about notes or scores; it only sees images.
//
// - writer.rs: ObjectWriter, reserved ids and offset tracking
// - jpeg.rs: JPEG frame header sniffing for `PageImage::from_jpeg`

pub mod jpeg;
pub mod writer;

pub use writer::ObjectWriter;

use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("document has no pages")]
    NoPages,
    #[error("page {index} is invalid: {reason}")]
    InvalidPage { index: usize, reason: String },
    #[error("object {0} was reserved but never written")]
    MissingObject(u32),
    #[error("object {0} written twice")]
    DuplicateObject(u32),
    #[error("object {0} was never reserved")]
    UnknownObject(u32),
    #[error("not a usable JPEG: {0}")]
    NotJpeg(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "/DeviceGray",
            ColorSpace::DeviceRgb => "/DeviceRGB",
            ColorSpace::DeviceCmyk => "/DeviceCMYK",
        }
    }
}

/// Compression applied to the embedded image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// JPEG.
    DctDecode,
    /// zlib/deflate of raw 8-bit samples.
    FlateDecode,
}

impl Filter {
    pub fn pdf_name(self) -> &'static str {
        match self {
            Filter::DctDecode => "/DCTDecode",
            Filter::FlateDecode => "/FlateDecode",
        }
    }
}

/// One rasterized page: compressed image bytes plus what a reader needs to
/// decode them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub data: Vec<u8>,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    pub color_space: ColorSpace,
    pub filter: Filter,
}

impl PageImage {
    fn validate(&self, index: usize) -> Result<()> {
        let reason = if self.data.is_empty() {
            "image data is empty"
        } else if self.width == 0 || self.height == 0 {
            "image has a zero dimension"
        } else {
            return Ok(());
        };
        Err(DocumentError::InvalidPage {
            index,
            reason: reason.to_string(),
        })
    }
}

/// Pixels at 96 dpi to PDF points, exact to the quarter point.
pub fn px_to_points(px: u32) -> String {
    let quarters = px as u64 * 3;
    let whole = quarters / 4;
    match quarters % 4 {
        0 => whole.to_string(),
        1 => format!("{whole}.25"),
        2 => format!("{whole}.5"),
        _ => format!("{whole}.75"),
    }
}

/// Assemble pages, in order, into a complete PDF file.
///
/// Fails without producing any bytes if the list is empty or any page is
/// invalid.
pub fn assemble_pdf(pages: &[PageImage]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(DocumentError::NoPages);
    }
    for (index, page) in pages.iter().enumerate() {
        page.validate(index)?;
    }

    let mut writer = ObjectWriter::new();
    let catalog = writer.reserve();
    let tree = writer.reserve();
    let ids: Vec<(u32, u32, u32)> = pages
        .iter()
        .map(|_| (writer.reserve(), writer.reserve(), writer.reserve()))
        .collect();

    writer.write_object(catalog, &format!("<< /Type /Catalog /Pages {tree} 0 R >>"))?;

    let mut kids = String::new();
    for (i, (page_id, _, _)) in ids.iter().enumerate() {
        if i > 0 {
            kids.push(' ');
        }
        let _ = write!(kids, "{page_id} 0 R");
    }
    writer.write_object(
        tree,
        &format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
    )?;

    for (page, &(page_id, content_id, image_id)) in pages.iter().zip(&ids) {
        let w = px_to_points(page.width);
        let h = px_to_points(page.height);
        writer.write_object(
            page_id,
            &format!(
                "<< /Type /Page /Parent {tree} 0 R /MediaBox [0 0 {w} {h}] \
                 /Resources << /XObject << /Im0 {image_id} 0 R >> >> \
                 /Contents {content_id} 0 R >>"
            ),
        )?;
        let placement = format!("q {w} 0 0 {h} 0 0 cm /Im0 Do Q");
        writer.write_stream(content_id, "", placement.as_bytes())?;
        writer.write_stream(
            image_id,
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace {} /BitsPerComponent 8 /Filter {}",
                page.width,
                page.height,
                page.color_space.pdf_name(),
                page.filter.pdf_name()
            ),
            &page.data,
        )?;
    }

    writer.finish(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: u32, height: u32) -> PageImage {
        PageImage {
            data: vec![0xAB; 16],
            width,
            height,
            color_space: ColorSpace::DeviceRgb,
            filter: Filter::DctDecode,
        }
    }

    #[test]
    fn test_px_to_points() {
        assert_eq!(px_to_points(800), "600");
        assert_eq!(px_to_points(1001), "750.75");
        assert_eq!(px_to_points(2), "1.5");
        assert_eq!(px_to_points(3), "2.25");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(assemble_pdf(&[]).unwrap_err(), DocumentError::NoPages);
    }

    #[test]
    fn test_invalid_pages() {
        let mut empty = page(10, 10);
        empty.data.clear();
        assert!(matches!(
            assemble_pdf(&[page(10, 10), empty]),
            Err(DocumentError::InvalidPage { index: 1, .. })
        ));
        assert!(matches!(
            assemble_pdf(&[page(0, 10)]),
            Err(DocumentError::InvalidPage { index: 0, .. })
        ));
    }

    #[test]
    fn test_single_page_objects() {
        let pdf = assemble_pdf(&[page(800, 1000)]).unwrap();
        let s = String::from_utf8_lossy(&pdf);
        assert!(s.contains("1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>"));
        assert!(s.contains("2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>"));
        assert!(s.contains("/MediaBox [0 0 600 750]"));
        assert!(s.contains("/XObject << /Im0 5 0 R >>"));
        assert!(s.contains("/Contents 4 0 R"));
        assert!(s.contains("stream\nq 600 0 0 750 0 0 cm /Im0 Do Q\nendstream"));
        assert!(s.contains(
            "/Width 800 /Height 1000 /ColorSpace /DeviceRGB /BitsPerComponent 8 \
             /Filter /DCTDecode /Length 16 >>"
        ));
        assert!(s.contains("<< /Size 6 /Root 1 0 R >>"));
    }

    #[test]
    fn test_page_order_in_tree() {
        let pdf = assemble_pdf(&[page(10, 10), page(20, 20), page(30, 30)]).unwrap();
        let s = String::from_utf8_lossy(&pdf);
        assert!(s.contains("/Kids [3 0 R 6 0 R 9 0 R] /Count 3"));
        let first = s.find("/MediaBox [0 0 7.5 7.5]").unwrap();
        let third = s.find("/MediaBox [0 0 22.5 22.5]").unwrap();
        assert!(first < third);
    }

    #[test]
    fn test_image_bytes_embedded_verbatim() {
        let mut p = page(4, 4);
        p.data = (0u8..=255).collect();
        let pdf = assemble_pdf(&[p.clone()]).unwrap();
        assert!(pdf.windows(p.data.len()).any(|w| w == p.data.as_slice()));
    }
}
