//! VCF variant reader
//!
//! Reads the first five columns of each record and turns every ALT allele
//! into a [`Variant`]. POS is converted from VCF's 1-based convention to
//! the 0-based positions used everywhere else.

use crate::core::error::FormatError;
use crate::core::genome::Variant;
use crate::core::io::{open_reader, ByteLineIterator};
use memchr::memchr;
use std::io::BufRead;
use std::path::Path;

/// CHROM, POS, ID, REF, ALT
const REQUIRED_FIELDS: usize = 5;

/// Zero-copy view of one VCF data line
///
/// Only field boundaries are computed up front; fields are sliced on access.
pub struct VcfRecordView<'a> {
    line: &'a [u8],
    field_bounds: Vec<(usize, usize)>,
    line_number: usize,
}

impl<'a> VcfRecordView<'a> {
    pub fn parse(line: &'a [u8], line_number: usize) -> Result<Self, FormatError> {
        let mut field_bounds = Vec::with_capacity(10);
        let mut start = 0;
        while let Some(tab) = memchr(b'\t', &line[start..]) {
            field_bounds.push((start, start + tab));
            start += tab + 1;
        }
        field_bounds.push((start, line.len()));

        if field_bounds.len() < REQUIRED_FIELDS {
            return Err(FormatError::TooFewFields {
                line: line_number,
                expected: REQUIRED_FIELDS,
                found: field_bounds.len(),
            });
        }
        Ok(Self {
            line,
            field_bounds,
            line_number,
        })
    }

    pub fn field_count(&self) -> usize {
        self.field_bounds.len()
    }

    pub fn field(&self, index: usize) -> Result<&'a str, FormatError> {
        let (start, end) = self.field_bounds.get(index).copied().unwrap_or((0, 0));
        std::str::from_utf8(&self.line[start..end]).map_err(|_| FormatError::InvalidUtf8 {
            line: self.line_number,
        })
    }

    pub fn chrom(&self) -> Result<&'a str, FormatError> {
        self.field(0)
    }

    /// 1-based POS as written
    pub fn pos(&self) -> Result<u64, FormatError> {
        let text = self.field(1)?;
        text.parse().map_err(|_| FormatError::InvalidNumber {
            line: self.line_number,
            field: "POS",
            value: text.to_string(),
        })
    }

    /// ID, or `None` for `.`
    pub fn id(&self) -> Result<Option<&'a str>, FormatError> {
        let id = self.field(2)?;
        Ok((id != "." && !id.is_empty()).then_some(id))
    }

    pub fn ref_allele(&self) -> Result<&'a str, FormatError> {
        self.field(3)
    }

    pub fn alt_alleles(&self) -> Result<impl Iterator<Item = &'a str>, FormatError> {
        Ok(self.field(4)?.split(','))
    }

    /// One variant per concrete ALT allele
    ///
    /// Symbolic (`<DEL>`), breakend, missing (`.`/`*`) and reference-equal
    /// alleles are skipped.
    pub fn to_variants(&self) -> Result<Vec<Variant>, FormatError> {
        let chrom = self.chrom()?;
        let pos = self.pos()?;
        if pos == 0 {
            return Err(FormatError::InvalidNumber {
                line: self.line_number,
                field: "POS",
                value: "0".to_string(),
            });
        }
        let reference = self.ref_allele()?;
        let id = self.id()?;

        let mut variants = Vec::new();
        for alt in self.alt_alleles()? {
            if is_symbolic(alt) || alt.eq_ignore_ascii_case(reference) {
                continue;
            }
            let variant = Variant::new(chrom, pos - 1, reference, alt).map_err(|source| FormatError::InvalidRecord {
                line: self.line_number,
                source,
            })?;
            variants.push(match id {
                Some(id) => variant.with_name(id),
                None => variant,
            });
        }
        Ok(variants)
    }
}

fn is_symbolic(allele: &str) -> bool {
    allele.is_empty()
        || allele == "."
        || allele == "*"
        || allele.starts_with('<')
        || allele.contains('[')
        || allele.contains(']')
}

/// Parse variants from any buffered reader
pub fn parse_variants<R: BufRead>(reader: R) -> Result<Vec<Variant>, FormatError> {
    let mut lines = ByteLineIterator::new(reader);
    let mut variants = Vec::new();
    let mut skipped = 0usize;
    while let Some(line) = lines.next_line() {
        let (line_number, line) = line?;
        if line.is_empty() || line[0] == b'#' {
            continue;
        }
        let record = VcfRecordView::parse(line, line_number)?;
        let parsed = record.to_variants()?;
        if parsed.is_empty() {
            skipped += 1;
        }
        variants.extend(parsed);
    }
    if skipped > 0 {
        log::debug!("Skipped {} records with only symbolic alleles", skipped);
    }
    Ok(variants)
}

/// Read all variants from a VCF file (plain, gzip or bzip2)
pub fn read_variants<P: AsRef<Path>>(path: P) -> Result<Vec<Variant>, FormatError> {
    let path = path.as_ref();
    let variants = parse_variants(open_reader(path)?)?;
    log::info!("Read {} variants from {}", variants.len(), path.display());
    Ok(variants)
}
