//! Input file readers
//!
//! Opens plain, gzip or bzip2 text inputs (VCF, GTF) behind one `BufRead`,
//! detecting compression by extension first and magic bytes second.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Default buffer size for BufReader (128KB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Compression format of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Plain text (uncompressed)
    Plain,
    /// Gzip or bgzip (.gz)
    Gzip,
    /// Bzip2 (.bz2)
    Bzip2,
}

impl CompressionFormat {
    /// Classify leading bytes
    pub fn from_magic(magic: &[u8]) -> Self {
        match magic {
            [0x1f, 0x8b, ..] => CompressionFormat::Gzip,
            // "BZh"
            [0x42, 0x5a, 0x68, ..] => CompressionFormat::Bzip2,
            _ => CompressionFormat::Plain,
        }
    }
}

/// Detect compression format from file path and/or content
pub fn detect_compression(path: &Path) -> io::Result<CompressionFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") | Some("bgz") => return Ok(CompressionFormat::Gzip),
        Some("bz2") => return Ok(CompressionFormat::Bzip2),
        _ => {}
    }

    let mut file = File::open(path)?;
    let mut magic = [0u8; 3];
    let bytes_read = file.read(&mut magic)?;
    Ok(CompressionFormat::from_magic(&magic[..bytes_read]))
}

/// Open a text input, transparently decompressing it
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let format = detect_compression(path)?;
    let file = File::open(path)?;
    log::debug!("Opening {} as {:?}", path.display(), format);

    Ok(match format {
        // MultiGzDecoder also handles bgzip's concatenated members
        CompressionFormat::Gzip => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            flate2::read::MultiGzDecoder::new(file),
        )),
        CompressionFormat::Bzip2 => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            bzip2::read::BzDecoder::new(file),
        )),
        CompressionFormat::Plain => Box::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file)),
    })
}

/// Byte line iterator reusing one buffer
pub struct ByteLineIterator<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> ByteLineIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(4096),
            line_number: 0,
        }
    }

    /// Read the next line as bytes, without the line terminator, together
    /// with its 1-based line number
    pub fn next_line(&mut self) -> Option<io::Result<(usize, &[u8])>> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                self.line_number += 1;
                if self.buffer.last() == Some(&b'\n') {
                    self.buffer.pop();
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                }
                Some(Ok((self.line_number, &self.buffer)))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// 1-based number of the line last returned
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_magic_detection() {
        assert_eq!(CompressionFormat::from_magic(&[0x1f, 0x8b, 0x08]), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_magic(b"BZh"), CompressionFormat::Bzip2);
        assert_eq!(CompressionFormat::from_magic(b"##f"), CompressionFormat::Plain);
        assert_eq!(CompressionFormat::from_magic(&[]), CompressionFormat::Plain);
    }

    #[test]
    fn test_open_gzip_by_magic() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"line1\nline2\n")?;
        temp.write_all(&encoder.finish()?)?;
        temp.flush()?;

        assert_eq!(detect_compression(temp.path())?, CompressionFormat::Gzip);
        let mut lines = ByteLineIterator::new(open_reader(temp.path())?);
        assert_eq!(lines.next_line().unwrap()?, (1, &b"line1"[..]));
        assert_eq!(lines.next_line().unwrap()?, (2, &b"line2"[..]));
        assert!(lines.next_line().is_none());
        assert_eq!(lines.line_number(), 2);
        Ok(())
    }

    #[test]
    fn test_open_bzip2_by_magic() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(b"a\r\nb")?;
        temp.write_all(&encoder.finish()?)?;
        temp.flush()?;

        let mut lines = ByteLineIterator::new(open_reader(temp.path())?);
        assert_eq!(lines.next_line().unwrap()?.1, b"a");
        assert_eq!(lines.next_line().unwrap()?.1, b"b");
        assert!(lines.next_line().is_none());
        Ok(())
    }
}
