//! Gene annotations and their interval index
//!
//! Uses rust-lapper for O(log n + k) overlap queries per chromosome.

use crate::core::genome::{Interval, Strand};
use rust_lapper::{Interval as LapperInterval, Lapper};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One annotated gene with its exons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub gene_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_type: Option<String>,
    /// Gene body, stranded
    pub interval: Interval,
    /// Exons in any order, possibly overlapping between transcripts
    pub exons: Vec<Interval>,
}

impl GeneAnnotation {
    pub fn strand(&self) -> Strand {
        self.interval.strand()
    }

    /// Display label: name when known, else id
    pub fn label(&self) -> &str {
        self.gene_name.as_deref().unwrap_or(&self.gene_id)
    }

    /// Union of exons clipped to `boundary`, sorted and merged
    pub fn exon_union_within(&self, boundary: &Interval) -> Vec<Interval> {
        let mut clipped: Vec<Interval> = self
            .exons
            .iter()
            .filter_map(|e| e.intersect(boundary))
            .collect();
        clipped.sort_by_key(|e| (e.start(), e.end()));

        let mut merged: Vec<Interval> = Vec::with_capacity(clipped.len());
        for exon in clipped {
            if let Some(last) = merged.last_mut() {
                if exon.start() <= last.end() {
                    if exon.end() > last.end() {
                        if let Ok(joined) = Interval::new(last.chromosome(), last.start(), exon.end()) {
                            *last = joined.with_strand(last.strand());
                        }
                    }
                    continue;
                }
            }
            merged.push(exon);
        }
        merged
    }

    /// Gene body clipped to `boundary`, if they overlap
    pub fn body_within(&self, boundary: &Interval) -> Option<Interval> {
        self.interval.intersect(boundary)
    }
}

type GeneInterval = LapperInterval<u64, usize>;

/// Gene annotations indexed by chromosome
pub struct GeneIndex {
    genes: Vec<GeneAnnotation>,
    maps: HashMap<String, Lapper<u64, usize>>,
    /// Normalized chromosome name mapping (lowercase, no chr prefix -> original)
    chrom_aliases: HashMap<String, String>,
}

impl GeneIndex {
    pub fn new(genes: Vec<GeneAnnotation>) -> Self {
        let mut by_chrom: HashMap<String, Vec<GeneInterval>> = HashMap::new();
        for (i, gene) in genes.iter().enumerate() {
            by_chrom
                .entry(gene.interval.chromosome().to_string())
                .or_default()
                .push(LapperInterval {
                    start: gene.interval.start(),
                    stop: gene.interval.end(),
                    val: i,
                });
        }

        let mut maps = HashMap::new();
        let mut chrom_aliases = HashMap::new();
        for (chrom, intervals) in by_chrom {
            chrom_aliases.insert(normalize_chrom_key(&chrom), chrom.clone());
            maps.insert(chrom, Lapper::new(intervals));
        }

        log::debug!("Indexed {} genes on {} chromosomes", genes.len(), maps.len());
        Self {
            genes,
            maps,
            chrom_aliases,
        }
    }

    fn find_lapper(&self, chrom: &str) -> Option<&Lapper<u64, usize>> {
        self.maps.get(chrom).or_else(|| {
            self.chrom_aliases
                .get(&normalize_chrom_key(chrom))
                .and_then(|original| self.maps.get(original))
        })
    }

    /// Genes whose body overlaps `interval`, ordered by start then id
    pub fn genes_overlapping(&self, interval: &Interval) -> Vec<&GeneAnnotation> {
        let Some(lapper) = self.find_lapper(interval.chromosome()) else {
            return vec![];
        };
        let mut hits: Vec<&GeneAnnotation> = lapper
            .find(interval.start(), interval.end())
            .map(|iv| &self.genes[iv.val])
            .collect();
        hits.sort_by(|a, b| {
            (a.interval.start(), &a.gene_id).cmp(&(b.interval.start(), &b.gene_id))
        });
        hits
    }

    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.find_lapper(chrom).is_some()
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn genes(&self) -> &[GeneAnnotation] {
        &self.genes
    }
}

/// Normalize chromosome name for flexible matching
fn normalize_chrom_key(chrom: &str) -> String {
    let lower = chrom.to_lowercase();
    match lower.strip_prefix("chr") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}
