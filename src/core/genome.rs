//! Genomic coordinate model
//!
//! Immutable value types for intervals and variants. All coordinates are
//! 0-based and half-open (`[start, end)`); the printed form
//! `chrom:start-end:strand` uses the same numbers, which reads as a 1-based
//! inclusive end.
//!
//! # Tie-breaks
//!
//! `resize` anchors on the floor of half the width difference:
//! for `+`/`.` strands `new_start = start + floor((old_width - width) / 2)`;
//! for `-` the rule is mirrored on `end`. Shrinking by an odd amount trims the
//! extra base from the 3' end; growing by an odd amount puts the extra base
//! on the 5' side. `split(n)` attaches the remainder to the last part.

use crate::core::dna;
use crate::core::error::{CoordinateError, CoordinateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strand orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    #[default]
    #[serde(rename = ".")]
    Unstranded,
}

impl Strand {
    /// Get the complement strand
    ///
    /// # Examples
    /// ```
    /// use seqpredict::core::Strand;
    /// assert_eq!(Strand::Plus.complement(), Strand::Minus);
    /// assert_eq!(Strand::Unstranded.complement(), Strand::Unstranded);
    /// ```
    pub fn complement(&self) -> Self {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
            Strand::Unstranded => Strand::Unstranded,
        }
    }

    /// Parse strand from char
    ///
    /// # Examples
    /// ```
    /// use seqpredict::core::Strand;
    /// assert_eq!(Strand::from_char('+'), Some(Strand::Plus));
    /// assert_eq!(Strand::from_char('.'), Some(Strand::Unstranded));
    /// assert_eq!(Strand::from_char('x'), None);
    /// ```
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            '.' => Some(Strand::Unstranded),
            _ => None,
        }
    }

    /// Convert to char
    pub fn to_char(&self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
            Strand::Unstranded => '.',
        }
    }

    /// Whether a track on this strand applies to a feature on `other`
    ///
    /// Unstranded on either side is compatible with anything.
    pub fn compatible_with(&self, other: Strand) -> bool {
        matches!(
            (self, other),
            (Strand::Unstranded, _) | (_, Strand::Unstranded)
        ) || *self == other
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Compute the intersection of two half-open ranges
///
/// Returns None if the ranges don't overlap.
///
/// # Examples
/// ```
/// use seqpredict::core::intersect_intervals;
/// assert_eq!(intersect_intervals(0, 100, 50, 150), Some((50, 100)));
/// assert_eq!(intersect_intervals(0, 50, 50, 100), None);
/// ```
#[inline]
pub fn intersect_intervals(start1: u64, end1: u64, start2: u64, end2: u64) -> Option<(u64, u64)> {
    if start1 >= end2 || end1 <= start2 {
        return None;
    }
    Some((start1.max(start2), end1.min(end2)))
}

/// Supported model input lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SequenceLength {
    #[serde(rename = "2KB")]
    Kb2,
    #[serde(rename = "16KB")]
    Kb16,
    #[serde(rename = "100KB")]
    Kb100,
    #[serde(rename = "500KB")]
    Kb500,
    #[serde(rename = "1MB")]
    Mb1,
}

impl SequenceLength {
    /// All supported lengths, shortest first
    pub const ALL: [SequenceLength; 5] = [
        SequenceLength::Kb2,
        SequenceLength::Kb16,
        SequenceLength::Kb100,
        SequenceLength::Kb500,
        SequenceLength::Mb1,
    ];

    /// Width in bases
    pub const fn bases(&self) -> u64 {
        match self {
            SequenceLength::Kb2 => 2_048,
            SequenceLength::Kb16 => 16_384,
            SequenceLength::Kb100 => 131_072,
            SequenceLength::Kb500 => 524_288,
            SequenceLength::Mb1 => 1_048_576,
        }
    }

    /// Look up the length matching an exact width
    ///
    /// # Examples
    /// ```
    /// use seqpredict::core::SequenceLength;
    /// assert_eq!(SequenceLength::from_width(16_384), Some(SequenceLength::Kb16));
    /// assert_eq!(SequenceLength::from_width(10_000), None);
    /// ```
    pub fn from_width(width: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|len| len.bases() == width)
    }

    fn label(&self) -> &'static str {
        match self {
            SequenceLength::Kb2 => "2KB",
            SequenceLength::Kb16 => "16KB",
            SequenceLength::Kb100 => "100KB",
            SequenceLength::Kb500 => "500KB",
            SequenceLength::Mb1 => "1MB",
        }
    }
}

impl fmt::Display for SequenceLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SequenceLength {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if let Some(len) = Self::ALL.into_iter().find(|len| len.label() == upper) {
            return Ok(len);
        }
        upper
            .replace([',', '_'], "")
            .parse::<u64>()
            .ok()
            .and_then(Self::from_width)
            .ok_or_else(|| CoordinateError::Parse(s.to_string()))
    }
}

#[derive(Deserialize)]
struct RawInterval {
    chromosome: String,
    start: u64,
    end: u64,
    #[serde(default)]
    strand: Strand,
}

/// Half-open genomic interval `[start, end)` on a chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    chromosome: String,
    start: u64,
    end: u64,
    strand: Strand,
}

impl TryFrom<RawInterval> for Interval {
    type Error = CoordinateError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.chromosome, raw.start, raw.end).map(|i| i.with_strand(raw.strand))
    }
}

impl Interval {
    /// Create an unstranded interval
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> CoordinateResult<Self> {
        let chromosome = chromosome.into();
        if chromosome.is_empty() {
            return Err(CoordinateError::EmptyChromosome);
        }
        if start > end {
            return Err(CoordinateError::InvalidRange { start, end });
        }
        Ok(Self {
            chromosome,
            start,
            end,
            strand: Strand::Unstranded,
        })
    }

    /// Same interval on another strand
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Number of bases covered
    pub fn width(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Midpoint; rounds down on `+`/`.`, up on `-`
    pub fn center(&self) -> u64 {
        match self.strand {
            Strand::Minus => (self.start + self.end + 1) / 2,
            _ => (self.start + self.end) / 2,
        }
    }

    /// Supported sequence length matching this width, if any
    pub fn sequence_length(&self) -> Option<SequenceLength> {
        SequenceLength::from_width(self.width())
    }

    fn from_signed(&self, start: i64, end: i64) -> CoordinateResult<Self> {
        if start < 0 {
            return Err(CoordinateError::NegativeStart {
                interval: self.to_string(),
            });
        }
        Ok(Self {
            chromosome: self.chromosome.clone(),
            start: start as u64,
            end: end as u64,
            strand: self.strand,
        })
    }

    /// Recenter to `width` bases (see module docs for the tie-break)
    ///
    /// # Examples
    /// ```
    /// use seqpredict::core::Interval;
    /// let snp = Interval::new("chr22", 108_000, 108_001).unwrap();
    /// let window = snp.resize(501).unwrap();
    /// assert_eq!((window.start(), window.end()), (107_750, 108_251));
    /// ```
    pub fn resize(&self, width: u64) -> CoordinateResult<Self> {
        let old = self.width() as i64;
        let new = width as i64;
        let shift = (old - new).div_euclid(2);
        match self.strand {
            Strand::Minus => {
                let end = self.end as i64 - shift;
                self.from_signed(end - new, end)
            }
            _ => {
                let start = self.start as i64 + shift;
                self.from_signed(start, start + new)
            }
        }
    }

    /// Pad `upstream` bases on the 5' side and `downstream` on the 3' side
    pub fn expand(&self, upstream: u64, downstream: u64) -> CoordinateResult<Self> {
        let (left, right) = match self.strand {
            Strand::Minus => (downstream, upstream),
            _ => (upstream, downstream),
        };
        self.from_signed(
            self.start as i64 - left as i64,
            (self.end + right) as i64,
        )
    }

    /// Restrict to `boundary`
    ///
    /// Fails if the chromosomes differ or the result would have negative width.
    pub fn clip(&self, boundary: &Interval) -> CoordinateResult<Self> {
        self.same_chromosome(boundary)?;
        let start = self.start.max(boundary.start);
        let end = self.end.min(boundary.end);
        if start > end {
            return Err(CoordinateError::OutOfBounds {
                interval: self.to_string(),
                boundary: boundary.to_string(),
            });
        }
        Ok(Self {
            chromosome: self.chromosome.clone(),
            start,
            end,
            strand: self.strand,
        })
    }

    /// Split into `n` contiguous parts; the remainder goes to the last part
    pub fn split(&self, n: u64) -> CoordinateResult<Vec<Self>> {
        if n == 0 || n > self.width().max(1) {
            return Err(CoordinateError::InvalidSplit {
                interval: self.to_string(),
                parts: n,
            });
        }
        let base = self.width() / n;
        Ok((0..n)
            .map(|i| {
                let start = self.start + i * base;
                let end = if i + 1 == n { self.end } else { start + base };
                Self {
                    chromosome: self.chromosome.clone(),
                    start,
                    end,
                    strand: self.strand,
                }
            })
            .collect())
    }

    /// Consecutive windows of at most `width` bases covering the interval
    pub fn split_by_width(&self, width: u64) -> CoordinateResult<Vec<Self>> {
        if width == 0 {
            return Err(CoordinateError::InvalidSplit {
                interval: self.to_string(),
                parts: 0,
            });
        }
        let mut windows = Vec::with_capacity(self.width().div_ceil(width) as usize);
        let mut start = self.start;
        while start < self.end {
            let end = (start + width).min(self.end);
            windows.push(Self {
                chromosome: self.chromosome.clone(),
                start,
                end,
                strand: self.strand,
            });
            start = end;
        }
        Ok(windows)
    }

    /// Whether both intervals share at least one base
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.chromosome == other.chromosome
            && intersect_intervals(self.start, self.end, other.start, other.end).is_some()
    }

    /// Overlapping part, if any (keeps this interval's strand)
    pub fn intersect(&self, other: &Interval) -> Option<Self> {
        if self.chromosome != other.chromosome {
            return None;
        }
        intersect_intervals(self.start, self.end, other.start, other.end).map(|(start, end)| Self {
            chromosome: self.chromosome.clone(),
            start,
            end,
            strand: self.strand,
        })
    }

    /// Whether `position` lies in `[start, end)`
    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }

    /// Whether this interval lies entirely inside `other`
    pub fn within(&self, other: &Interval) -> bool {
        self.chromosome == other.chromosome && other.start <= self.start && self.end <= other.end
    }

    fn same_chromosome(&self, other: &Interval) -> CoordinateResult<()> {
        if self.chromosome != other.chromosome {
            return Err(CoordinateError::ChromosomeMismatch(
                self.chromosome.clone(),
                other.chromosome.clone(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}:{}", self.chromosome, self.start, self.end, self.strand)
    }
}

fn parse_coordinate(s: &str, whole: &str) -> CoordinateResult<u64> {
    s.replace([',', '_'], "")
        .parse()
        .map_err(|_| CoordinateError::Parse(whole.to_string()))
}

impl FromStr for Interval {
    type Err = CoordinateError;

    /// Parse `chrom:start-end` or `chrom:start-end:strand`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let (chrom, range) = match (parts.next(), parts.next()) {
            (Some(chrom), Some(range)) => (chrom, range),
            _ => return Err(CoordinateError::Parse(s.to_string())),
        };
        let strand = match parts.next() {
            None => Strand::Unstranded,
            Some(st) => {
                let mut chars = st.chars();
                match (chars.next().and_then(Strand::from_char), chars.next()) {
                    (Some(strand), None) => strand,
                    _ => return Err(CoordinateError::InvalidStrand(st.to_string())),
                }
            }
        };
        if parts.next().is_some() {
            return Err(CoordinateError::Parse(s.to_string()));
        }
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| CoordinateError::Parse(s.to_string()))?;
        Interval::new(chrom, parse_coordinate(start, s)?, parse_coordinate(end, s)?)
            .map(|i| i.with_strand(strand))
    }
}

#[derive(Deserialize)]
struct RawVariant {
    chromosome: String,
    position: u64,
    reference_bases: String,
    alternate_bases: String,
    #[serde(default)]
    name: Option<String>,
}

/// Sequence variant anchored at a 0-based position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVariant")]
pub struct Variant {
    chromosome: String,
    position: u64,
    reference_bases: String,
    alternate_bases: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl TryFrom<RawVariant> for Variant {
    type Error = CoordinateError;

    fn try_from(raw: RawVariant) -> Result<Self, Self::Error> {
        let variant = Variant::new(
            raw.chromosome,
            raw.position,
            &raw.reference_bases,
            &raw.alternate_bases,
        )?;
        Ok(match raw.name {
            Some(name) => variant.with_name(name),
            None => variant,
        })
    }
}

impl Variant {
    /// Create a variant, normalizing bases to uppercase
    pub fn new(
        chromosome: impl Into<String>,
        position: u64,
        reference_bases: &str,
        alternate_bases: &str,
    ) -> CoordinateResult<Self> {
        let chromosome = chromosome.into();
        if chromosome.is_empty() {
            return Err(CoordinateError::EmptyChromosome);
        }
        let reference_bases = dna::normalize_bases(reference_bases)?;
        let alternate_bases = dna::normalize_bases(alternate_bases)?;
        if reference_bases == alternate_bases {
            return Err(CoordinateError::NoOpVariant(format!(
                "{}:{}:{}>{}",
                chromosome, position, reference_bases, alternate_bases
            )));
        }
        Ok(Self {
            chromosome,
            position,
            reference_bases,
            alternate_bases,
            name: None,
        })
    }

    /// Attach a display name (e.g. an rsID)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn reference_bases(&self) -> &str {
        &self.reference_bases
    }

    pub fn alternate_bases(&self) -> &str {
        &self.alternate_bases
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Interval spanned by the reference bases (zero-width for insertions)
    pub fn reference_interval(&self) -> Interval {
        Interval {
            chromosome: self.chromosome.clone(),
            start: self.position,
            end: self.position + self.reference_bases.len() as u64,
            strand: Strand::Unstranded,
        }
    }

    /// Interval spanned by the alternate bases, in reference coordinates
    pub fn alternate_interval(&self) -> Interval {
        Interval {
            chromosome: self.chromosome.clone(),
            start: self.position,
            end: self.position + self.alternate_bases.len() as u64,
            strand: Strand::Unstranded,
        }
    }

    pub fn is_snv(&self) -> bool {
        self.reference_bases.len() == 1 && self.alternate_bases.len() == 1
    }

    pub fn is_insertion(&self) -> bool {
        self.alternate_bases.len() > self.reference_bases.len()
    }

    pub fn is_deletion(&self) -> bool {
        self.reference_bases.len() > self.alternate_bases.len()
    }

    /// Whether the reference bases lie inside `interval`
    pub fn is_within(&self, interval: &Interval) -> bool {
        self.reference_interval().within(interval)
    }

    /// Whether the reference bases touch `interval`
    pub fn reference_overlaps(&self, interval: &Interval) -> bool {
        self.reference_interval().overlaps(interval)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}>{}",
            self.chromosome, self.position, self.reference_bases, self.alternate_bases
        )
    }
}

impl FromStr for Variant {
    type Err = CoordinateError;

    /// Parse `chrom:position:REF>ALT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(CoordinateError::Parse(s.to_string()));
        }
        let (reference, alternate) = parts[2]
            .split_once('>')
            .ok_or_else(|| CoordinateError::Parse(s.to_string()))?;
        Variant::new(parts[0], parse_coordinate(parts[1], s)?, reference, alternate)
    }
}
