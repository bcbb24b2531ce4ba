//! GTF/GFF3 gene annotation reader
//!
//! Collects `gene` and `exon` features into [`GeneAnnotation`]s. GTF links
//! exons to genes through the `gene_id` attribute; GFF3 links exons to
//! transcripts and transcripts to genes through `Parent`. Coordinates are
//! 1-based closed in the file and 0-based half-open in memory.

use crate::core::annotation::{GeneAnnotation, GeneIndex};
use crate::core::error::{CoordinateError, FormatError};
use crate::core::genome::{Interval, Strand};
use crate::core::io::{open_reader, ByteLineIterator};
use memchr::memchr;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

const GFF_FIELDS: usize = 9;

/// Zero-copy view of one GTF/GFF3 feature line
pub struct GffRecordView<'a> {
    pub seqname: &'a str,
    pub feature: &'a str,
    /// 1-based inclusive
    pub start: u64,
    /// 1-based inclusive
    pub end: u64,
    pub strand: Strand,
    pub attributes: &'a str,
}

impl<'a> GffRecordView<'a> {
    pub fn parse(line: &'a [u8], line_number: usize) -> Result<Self, FormatError> {
        let mut field_bounds = Vec::with_capacity(GFF_FIELDS);
        let mut start = 0;
        while let Some(tab) = memchr(b'\t', &line[start..]) {
            field_bounds.push((start, start + tab));
            start += tab + 1;
        }
        field_bounds.push((start, line.len()));
        if field_bounds.len() < GFF_FIELDS {
            return Err(FormatError::TooFewFields {
                line: line_number,
                expected: GFF_FIELDS,
                found: field_bounds.len(),
            });
        }

        let field = |idx: usize| -> Result<&'a str, FormatError> {
            let (s, e) = field_bounds[idx];
            std::str::from_utf8(&line[s..e]).map_err(|_| FormatError::InvalidUtf8 { line: line_number })
        };
        let number = |idx: usize, name: &'static str| -> Result<u64, FormatError> {
            let text = field(idx)?;
            text.parse().map_err(|_| FormatError::InvalidNumber {
                line: line_number,
                field: name,
                value: text.to_string(),
            })
        };

        let strand_text = field(6)?;
        let strand = match strand_text {
            "+" => Strand::Plus,
            "-" => Strand::Minus,
            "." | "?" => Strand::Unstranded,
            other => {
                return Err(FormatError::InvalidRecord {
                    line: line_number,
                    source: CoordinateError::InvalidStrand(other.to_string()),
                })
            }
        };

        Ok(Self {
            seqname: field(0)?,
            feature: field(2)?,
            start: number(3, "start")?,
            end: number(4, "end")?,
            strand,
            attributes: field(8)?,
        })
    }

    /// 0-based half-open stranded interval
    pub fn interval(&self, line_number: usize) -> Result<Interval, FormatError> {
        Interval::new(self.seqname, self.start.saturating_sub(1), self.end)
            .map(|iv| iv.with_strand(self.strand))
            .map_err(|source| FormatError::InvalidRecord {
                line: line_number,
                source,
            })
    }

    /// Attribute value by key, for GTF (`key "value";`) or GFF3 (`key=value;`)
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.attributes.split(';').find_map(|item| {
            let item = item.trim();
            if let Some((k, v)) = item.split_once('=') {
                return (k.trim() == key).then(|| v.trim());
            }
            let (k, v) = item.split_once(' ')?;
            (k == key).then(|| v.trim().trim_matches('"'))
        })
    }
}

/// Strip GFF3 type prefixes such as `gene:` from identifiers
fn bare_id(id: &str) -> &str {
    id.split_once(':').map(|(_, rest)| rest).unwrap_or(id)
}

#[derive(Default)]
struct GeneBuilder {
    name: Option<String>,
    gene_type: Option<String>,
    body: Option<Interval>,
    exons: Vec<Interval>,
}

impl GeneBuilder {
    /// Gene body, falling back to the span of its exons
    fn build(self, gene_id: String) -> Option<GeneAnnotation> {
        let interval = match self.body {
            Some(body) => body,
            None => {
                let first = self.exons.first()?;
                let start = self.exons.iter().map(|e| e.start()).min()?;
                let end = self.exons.iter().map(|e| e.end()).max()?;
                Interval::new(first.chromosome(), start, end)
                    .ok()?
                    .with_strand(first.strand())
            }
        };
        Some(GeneAnnotation {
            gene_id,
            gene_name: self.name,
            gene_type: self.gene_type,
            interval,
            exons: self.exons,
        })
    }
}

#[derive(Default)]
struct AnnotationCollector {
    order: Vec<String>,
    genes: HashMap<String, GeneBuilder>,
    /// GFF3 transcript id -> gene id
    transcripts: HashMap<String, String>,
    /// GFF3 exons whose transcript was not seen yet
    orphan_exons: Vec<(String, Interval)>,
}

impl AnnotationCollector {
    fn gene(&mut self, gene_id: &str) -> &mut GeneBuilder {
        if !self.genes.contains_key(gene_id) {
            self.order.push(gene_id.to_string());
        }
        self.genes.entry(gene_id.to_string()).or_default()
    }

    fn add(&mut self, record: &GffRecordView<'_>, line_number: usize) -> Result<(), FormatError> {
        let is_gff3 = record.attribute("ID").is_some() || record.attribute("Parent").is_some();
        match record.feature {
            "gene" => {
                let id = record.attribute("gene_id").or_else(|| record.attribute("ID").map(bare_id));
                let Some(id) = id else { return Ok(()) };
                let interval = record.interval(line_number)?;
                let name = record.attribute("gene_name").or_else(|| record.attribute("Name"));
                let gene_type = record
                    .attribute("gene_type")
                    .or_else(|| record.attribute("gene_biotype"))
                    .or_else(|| record.attribute("biotype"));
                let gene = self.gene(id);
                gene.body = Some(interval);
                gene.name = name.map(str::to_string);
                gene.gene_type = gene_type.map(str::to_string);
            }
            "transcript" | "mRNA" if is_gff3 => {
                if let (Some(id), Some(parent)) = (record.attribute("ID"), record.attribute("Parent")) {
                    self.transcripts.insert(bare_id(id).to_string(), bare_id(parent).to_string());
                }
            }
            "exon" => {
                let interval = record.interval(line_number)?;
                if let Some(gene_id) = record.attribute("gene_id") {
                    self.gene(gene_id).exons.push(interval);
                } else if let Some(parents) = record.attribute("Parent") {
                    for parent in parents.split(',') {
                        self.orphan_exons.push((bare_id(parent).to_string(), interval.clone()));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<GeneAnnotation> {
        for (parent, exon) in std::mem::take(&mut self.orphan_exons) {
            let gene_id = self.transcripts.get(&parent).cloned().unwrap_or(parent);
            self.gene(&gene_id).exons.push(exon);
        }
        let mut genes = Vec::with_capacity(self.order.len());
        for id in self.order {
            if let Some(builder) = self.genes.remove(&id) {
                if let Some(gene) = builder.build(id) {
                    genes.push(gene);
                }
            }
        }
        genes
    }
}

/// Parse gene annotations from any buffered reader
pub fn parse_genes<R: BufRead>(reader: R) -> Result<Vec<GeneAnnotation>, FormatError> {
    let mut lines = ByteLineIterator::new(reader);
    let mut collector = AnnotationCollector::default();
    while let Some(line) = lines.next_line() {
        let (line_number, line) = line?;
        if line.is_empty() || line[0] == b'#' {
            continue;
        }
        let record = GffRecordView::parse(line, line_number)?;
        collector.add(&record, line_number)?;
    }
    Ok(collector.finish())
}

/// Read gene annotations from a GTF/GFF3 file (plain, gzip or bzip2)
pub fn read_genes<P: AsRef<Path>>(path: P) -> Result<Vec<GeneAnnotation>, FormatError> {
    let path = path.as_ref();
    let genes = parse_genes(open_reader(path)?)?;
    log::info!("Read {} genes from {}", genes.len(), path.display());
    Ok(genes)
}

/// Read and index gene annotations
pub fn load_gene_index<P: AsRef<Path>>(path: P) -> Result<GeneIndex, FormatError> {
    Ok(GeneIndex::new(read_genes(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GTF: &str = "#!genome-build GRCh38\n\
        chr22\tHAVANA\tgene\t100001\t110000\t.\t+\t.\tgene_id \"ENSG1\"; gene_name \"ABC\"; gene_type \"protein_coding\";\n\
        chr22\tHAVANA\ttranscript\t100001\t110000\t.\t+\t.\tgene_id \"ENSG1\"; transcript_id \"ENST1\";\n\
        chr22\tHAVANA\texon\t100001\t100500\t.\t+\t.\tgene_id \"ENSG1\"; transcript_id \"ENST1\";\n\
        chr22\tHAVANA\texon\t109001\t110000\t.\t+\t.\tgene_id \"ENSG1\"; transcript_id \"ENST1\";\n\
        chr22\tHAVANA\texon\t120001\t120100\t.\t-\t.\tgene_id \"ENSG2\"; transcript_id \"ENST2\";\n";

    const GFF3: &str = "##gff-version 3\n\
        chr1\tensembl\tgene\t1001\t2000\t.\t-\t.\tID=gene:G1;Name=XYZ;biotype=lncRNA\n\
        chr1\tensembl\texon\t1001\t1100\t.\t-\t.\tParent=transcript:T1\n\
        chr1\tensembl\tmRNA\t1001\t2000\t.\t-\t.\tID=transcript:T1;Parent=gene:G1\n";

    #[test]
    fn test_gtf_genes() {
        let genes = parse_genes(Cursor::new(GTF)).unwrap();
        assert_eq!(genes.len(), 2);
        let abc = &genes[0];
        assert_eq!(abc.gene_id, "ENSG1");
        assert_eq!(abc.label(), "ABC");
        assert_eq!(abc.gene_type.as_deref(), Some("protein_coding"));
        assert_eq!(abc.interval.start(), 100_000);
        assert_eq!(abc.interval.end(), 110_000);
        assert_eq!(abc.strand(), Strand::Plus);
        assert_eq!(abc.exons.len(), 2);

        // No gene line: body spans the exons
        let second = &genes[1];
        assert_eq!(second.interval.start(), 120_000);
        assert_eq!(second.strand(), Strand::Minus);
    }

    #[test]
    fn test_gff3_parent_chain() {
        let genes = parse_genes(Cursor::new(GFF3)).unwrap();
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0].gene_id, "G1");
        assert_eq!(genes[0].label(), "XYZ");
        assert_eq!(genes[0].exons.len(), 1);
    }

    #[test]
    fn test_invalid_strand() {
        let line = "chr1\ts\texon\t1\t10\t.\tx\t.\tgene_id \"G\";\n";
        assert!(matches!(
            parse_genes(Cursor::new(line)),
            Err(FormatError::InvalidRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_attribute_lookup() {
        let line = b"chr1\ts\tgene\t1\t10\t.\t+\t.\tgene_id \"G\"; gene_name \"N\";";
        let record = GffRecordView::parse(line, 1).unwrap();
        assert_eq!(record.attribute("gene_name"), Some("N"));
        assert_eq!(record.attribute("missing"), None);
    }
}
