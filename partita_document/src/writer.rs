// Byte-exact PDF object graph builder.
//
// Object ids are reserved before any body is written, so objects can refer
// to each other freely. Each body's byte offset is captured the moment it is
// written. `finish` refuses to produce a file unless every reserved id was
// written exactly once, then appends the cross-reference table and trailer.
//
// Cross-reference entries are fixed-width: a 10-digit offset, a 5-digit
// generation, a type letter, and a two-byte end of line (space + LF), 20
// bytes in all.

use crate::{DocumentError, Result};
use std::fmt::Write as _;

/// File header. The second line is a comment of high-bit bytes that marks
/// the file as binary for transfer tools.
pub const HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Width of one cross-reference entry, line ending included.
pub const XREF_ENTRY_LEN: usize = 20;

pub struct ObjectWriter {
    buf: Vec<u8>,
    /// Offset of object `id` at index `id - 1`; `None` until written.
    offsets: Vec<Option<usize>>,
}

impl Default for ObjectWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectWriter {
    pub fn new() -> Self {
        ObjectWriter {
            buf: HEADER.to_vec(),
            offsets: Vec::new(),
        }
    }

    /// Reserve the next object id. Ids start at 1 and are dense.
    pub fn reserve(&mut self) -> u32 {
        self.offsets.push(None);
        self.offsets.len() as u32
    }

    /// Number of ids reserved so far.
    pub fn object_count(&self) -> usize {
        self.offsets.len()
    }

    /// Write a plain object whose body is a PDF value (usually a dictionary).
    pub fn write_object(&mut self, id: u32, body: &str) -> Result<()> {
        self.begin(id)?;
        self.buf.extend_from_slice(body.as_bytes());
        self.buf.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    /// Write a stream object. `dict_entries` are the dictionary's entries
    /// without the surrounding `<< >>`; `/Length` is appended here.
    pub fn write_stream(&mut self, id: u32, dict_entries: &str, data: &[u8]) -> Result<()> {
        self.begin(id)?;
        let mut dict = String::from("<<");
        if !dict_entries.is_empty() {
            dict.push(' ');
            dict.push_str(dict_entries);
        }
        let _ = write!(dict, " /Length {} >>\nstream\n", data.len());
        self.buf.extend_from_slice(dict.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        Ok(())
    }

    /// Record the offset for `id` and write its `obj` line.
    fn begin(&mut self, id: u32) -> Result<()> {
        let slot = id
            .checked_sub(1)
            .and_then(|i| self.offsets.get_mut(i as usize))
            .ok_or(DocumentError::UnknownObject(id))?;
        if slot.is_some() {
            return Err(DocumentError::DuplicateObject(id));
        }
        *slot = Some(self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        Ok(())
    }

    /// Append the cross-reference table and trailer with `root` as the
    /// document catalog, and return the finished file.
    pub fn finish(self, root: u32) -> Result<Vec<u8>> {
        if root == 0 || root as usize > self.offsets.len() {
            return Err(DocumentError::UnknownObject(root));
        }
        let mut offsets = Vec::with_capacity(self.offsets.len());
        for (i, slot) in self.offsets.iter().enumerate() {
            match slot {
                Some(offset) => offsets.push(*offset),
                None => return Err(DocumentError::MissingObject(i as u32 + 1)),
            }
        }

        let mut buf = self.buf;
        let xref_offset = buf.len();
        let size = offsets.len() + 1;

        let mut table = String::with_capacity(32 + size * XREF_ENTRY_LEN);
        let _ = write!(table, "xref\n0 {size}\n");
        table.push_str("0000000000 65535 f \n");
        for offset in offsets {
            let _ = write!(table, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            table,
            "trailer\n<< /Size {size} /Root {root} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );
        buf.extend_from_slice(table.as_bytes());
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Byte position of `needle`. The lossy text view shifts offsets past
    /// the binary header line, so positions are found on raw bytes.
    fn find(hay: &[u8], needle: &str) -> Option<usize> {
        hay.windows(needle.len()).position(|w| w == needle.as_bytes())
    }

    #[test]
    fn test_minimal_file() {
        let mut w = ObjectWriter::new();
        let root = w.reserve();
        w.write_object(root, "<< /Type /Catalog >>").unwrap();
        let pdf = w.finish(root).unwrap();
        let s = text(&pdf);

        assert!(pdf.starts_with(HEADER));
        assert!(s.contains("1 0 obj\n<< /Type /Catalog >>\nendobj\n"));
        assert!(s.contains(&format!(
            "xref\n0 2\n0000000000 65535 f \n{:010} 00000 n \n",
            HEADER.len()
        )));
        assert!(s.contains("trailer\n<< /Size 2 /Root 1 0 R >>"));
        assert!(s.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_stream_length() {
        let mut w = ObjectWriter::new();
        let id = w.reserve();
        w.write_stream(id, "/Type /Test", b"abc\x00def").unwrap();
        let pdf = w.finish(id).unwrap();
        let s = text(&pdf);
        assert!(s.contains("<< /Type /Test /Length 7 >>\nstream\n"));
        assert!(s.contains("\nendstream\nendobj\n"));
    }

    #[test]
    fn test_out_of_order_writes_keep_xref_ascending() {
        let mut w = ObjectWriter::new();
        let a = w.reserve();
        let b = w.reserve();
        w.write_object(b, "(second)").unwrap();
        w.write_object(a, "(first)").unwrap();
        let pdf = w.finish(a).unwrap();
        let s = text(&pdf);

        let b_at = find(&pdf, "2 0 obj").unwrap();
        let a_at = find(&pdf, "1 0 obj").unwrap();
        assert!(b_at < a_at);
        assert!(s.contains(&format!("{a_at:010} 00000 n \n{b_at:010} 00000 n \n")));
    }

    #[test]
    fn test_duplicate_write_rejected() {
        let mut w = ObjectWriter::new();
        let id = w.reserve();
        w.write_object(id, "null").unwrap();
        assert_eq!(
            w.write_object(id, "null").unwrap_err(),
            DocumentError::DuplicateObject(1)
        );
    }

    #[test]
    fn test_unknown_ids_rejected() {
        let mut w = ObjectWriter::new();
        w.reserve();
        assert_eq!(
            w.write_object(0, "null").unwrap_err(),
            DocumentError::UnknownObject(0)
        );
        assert_eq!(
            w.write_object(2, "null").unwrap_err(),
            DocumentError::UnknownObject(2)
        );
    }

    #[test]
    fn test_missing_object_fails_finish() {
        let mut w = ObjectWriter::new();
        let a = w.reserve();
        w.reserve();
        w.write_object(a, "null").unwrap();
        assert_eq!(w.finish(a).unwrap_err(), DocumentError::MissingObject(2));
    }

    #[test]
    fn test_root_must_exist() {
        let w = ObjectWriter::new();
        assert_eq!(w.finish(1).unwrap_err(), DocumentError::UnknownObject(1));
    }

    #[test]
    fn test_entry_width() {
        assert_eq!("0000000000 65535 f \n".len(), XREF_ENTRY_LEN);
        assert_eq!(format!("{:010} 00000 n \n", 12345).len(), XREF_ENTRY_LEN);
    }
}
