//! DNA sequence utilities
//!
//! Validation and normalization for the {A, C, G, T, N} alphabet accepted
//! by the prediction service, plus substitution enumeration for in-silico
//! mutagenesis.

use crate::core::error::{CoordinateError, CoordinateResult};

/// Bases a substitution may produce
pub const SUBSTITUTION_BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Check if a byte is an accepted base (case-insensitive)
///
/// # Examples
/// ```
/// use seqpredict::core::dna::is_nucleotide;
///
/// assert!(is_nucleotide(b'A'));
/// assert!(is_nucleotide(b'n'));
/// assert!(!is_nucleotide(b'R')); // IUPAC codes other than N are rejected
/// ```
#[inline]
pub fn is_nucleotide(base: u8) -> bool {
    matches!(
        base,
        b'A' | b'C' | b'G' | b'T' | b'N' | b'a' | b'c' | b'g' | b't' | b'n'
    )
}

/// Check if a string only contains accepted bases
///
/// # Examples
/// ```
/// use seqpredict::core::dna::is_dna;
///
/// assert!(is_dna("ACGTN"));
/// assert!(is_dna("acgt"));
/// assert!(is_dna("")); // Empty is valid (insertions/deletions)
/// assert!(!is_dna("ACGU"));
/// ```
pub fn is_dna(seq: &str) -> bool {
    seq.bytes().all(is_nucleotide)
}

/// Validate and uppercase a base string
///
/// # Examples
/// ```
/// use seqpredict::core::dna::normalize_bases;
///
/// assert_eq!(normalize_bases("acgTn").unwrap(), "ACGTN");
/// assert!(normalize_bases("AXG").is_err());
/// ```
pub fn normalize_bases(seq: &str) -> CoordinateResult<String> {
    if let Some(bad) = seq.chars().find(|c| !c.is_ascii() || !is_nucleotide(*c as u8)) {
        return Err(CoordinateError::InvalidBase(bad));
    }
    Ok(seq.to_ascii_uppercase())
}

/// Bases that substitute `reference` in a single-nucleotide scan
///
/// `N` references yield no substitutions.
pub fn substitutions(reference: u8) -> impl Iterator<Item = u8> {
    let reference = reference.to_ascii_uppercase();
    SUBSTITUTION_BASES
        .into_iter()
        .filter(move |&b| reference != b'N' && b != reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_nucleotide() {
        for b in b"ACGTNacgtn" {
            assert!(is_nucleotide(*b));
        }
        assert!(!is_nucleotide(b'X'));
        assert!(!is_nucleotide(b'Y'));
        assert!(!is_nucleotide(b' '));
    }

    #[test]
    fn test_normalize_bases() {
        assert_eq!(normalize_bases("").unwrap(), "");
        assert_eq!(normalize_bases("a").unwrap(), "A");
        assert_eq!(
            normalize_bases("ACGZ"),
            Err(CoordinateError::InvalidBase('Z'))
        );
        assert_eq!(
            normalize_bases("Aé"),
            Err(CoordinateError::InvalidBase('é'))
        );
    }

    #[test]
    fn test_substitutions() {
        let subs: Vec<u8> = substitutions(b'A').collect();
        assert_eq!(subs, vec![b'C', b'G', b'T']);
        let subs: Vec<u8> = substitutions(b'g').collect();
        assert_eq!(subs, vec![b'A', b'C', b'T']);
        assert_eq!(substitutions(b'N').count(), 0);
    }
}
