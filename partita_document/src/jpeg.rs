// JPEG header sniffing.
//
// Walks the marker segments up to the first start-of-frame and reads the
// image size and component count from it. The image data itself is never
// decoded; PDF readers decompress it through `/DCTDecode`.

use crate::{ColorSpace, DocumentError, Filter, PageImage, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;

/// Frame header fields needed to embed the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
}

/// Start-of-frame markers: C0..=CF minus DHT (C4), JPG (C8) and DAC (CC).
fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Markers with no length field.
fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD7)
}

/// Read the frame header of a JPEG file.
pub fn read_jpeg_info(data: &[u8]) -> Result<JpegInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return Err(DocumentError::NotJpeg("missing start-of-image marker".to_string()));
    }

    let mut pos = 2;
    loop {
        // Markers may be preceded by any number of 0xFF fill bytes.
        if data.get(pos) != Some(&0xFF) {
            return Err(DocumentError::NotJpeg(format!("expected marker at byte {pos}")));
        }
        while data.get(pos) == Some(&0xFF) {
            pos += 1;
        }
        let marker = *data
            .get(pos)
            .ok_or_else(|| DocumentError::NotJpeg("truncated marker".to_string()))?;
        pos += 1;

        if is_standalone(marker) {
            continue;
        }
        if marker == EOI || marker == SOS {
            return Err(DocumentError::NotJpeg(
                "no frame header before image data".to_string(),
            ));
        }

        let segment = data
            .get(pos..pos + 2)
            .ok_or_else(|| DocumentError::NotJpeg("truncated segment length".to_string()))?;
        let len = u16::from_be_bytes([segment[0], segment[1]]) as usize;
        if len < 2 {
            return Err(DocumentError::NotJpeg(format!("bad segment length {len}")));
        }

        if is_sof(marker) {
            // length(2) precision(1) height(2) width(2) components(1)
            let frame = data
                .get(pos..pos + 8)
                .ok_or_else(|| DocumentError::NotJpeg("truncated frame header".to_string()))?;
            return Ok(JpegInfo {
                height: u16::from_be_bytes([frame[3], frame[4]]) as u32,
                width: u16::from_be_bytes([frame[5], frame[6]]) as u32,
                components: frame[7],
            });
        }
        pos += len;
    }
}

impl PageImage {
    /// Wrap a JPEG file as a page, taking its size and color space from the
    /// frame header.
    pub fn from_jpeg(data: Vec<u8>) -> Result<PageImage> {
        let info = read_jpeg_info(&data)?;
        let color_space = match info.components {
            1 => ColorSpace::DeviceGray,
            3 => ColorSpace::DeviceRgb,
            4 => ColorSpace::DeviceCmyk,
            n => {
                return Err(DocumentError::NotJpeg(format!(
                    "unsupported component count {n}"
                )));
            }
        };
        Ok(PageImage {
            data,
            width: info.width,
            height: info.height,
            color_space,
            filter: Filter::DctDecode,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest marker sequence that passes the sniffer: SOI, an APP0 stub,
    /// a baseline SOF0, then SOS and EOI. Not a decodable image.
    pub(crate) fn fake_jpeg(width: u16, height: u16, components: u8) -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 8 + 3 * components, 8]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.push(components);
        for c in 0..components {
            out.extend_from_slice(&[c + 1, 0x11, 0]);
        }
        out.extend_from_slice(&[0xFF, SOS, 0x00, 0x02, 0x12, 0x34, 0xFF, EOI]);
        out
    }

    #[test]
    fn test_reads_frame_header() {
        let info = read_jpeg_info(&fake_jpeg(1240, 1754, 3)).unwrap();
        assert_eq!(
            info,
            JpegInfo {
                width: 1240,
                height: 1754,
                components: 3
            }
        );
    }

    #[test]
    fn test_color_spaces() {
        let gray = PageImage::from_jpeg(fake_jpeg(10, 20, 1)).unwrap();
        assert_eq!(gray.color_space, ColorSpace::DeviceGray);
        assert_eq!((gray.width, gray.height), (10, 20));
        assert_eq!(gray.filter, Filter::DctDecode);
        let cmyk = PageImage::from_jpeg(fake_jpeg(10, 20, 4)).unwrap();
        assert_eq!(cmyk.color_space, ColorSpace::DeviceCmyk);
    }

    #[test]
    fn test_fill_bytes_and_progressive_sof() {
        let mut data = fake_jpeg(64, 48, 3);
        // Switch to progressive (SOF2) and pad the marker with fill bytes.
        let sof = data.iter().position(|&b| b == 0xC0).unwrap();
        data[sof] = 0xC2;
        data.splice(sof - 1..sof - 1, [0xFF, 0xFF]);
        let info = read_jpeg_info(&data).unwrap();
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn test_rejects_non_jpeg() {
        assert!(matches!(
            read_jpeg_info(b"\x89PNG\r\n\x1a\n"),
            Err(DocumentError::NotJpeg(_))
        ));
        assert!(matches!(read_jpeg_info(&[]), Err(DocumentError::NotJpeg(_))));
    }

    #[test]
    fn test_rejects_scan_before_frame() {
        let data = [0xFF, SOI, 0xFF, SOS, 0x00, 0x02, 0xFF, EOI];
        assert!(matches!(read_jpeg_info(&data), Err(DocumentError::NotJpeg(_))));
    }

    #[test]
    fn test_rejects_truncated_frame() {
        let data = fake_jpeg(8, 8, 3);
        let sof = data.iter().position(|&b| b == 0xC0).unwrap();
        assert!(matches!(
            read_jpeg_info(&data[..sof + 4]),
            Err(DocumentError::NotJpeg(_))
        ));
    }

    #[test]
    fn test_two_components_unsupported() {
        assert!(matches!(
            PageImage::from_jpeg(fake_jpeg(8, 8, 2)),
            Err(DocumentError::NotJpeg(_))
        ));
    }
}
