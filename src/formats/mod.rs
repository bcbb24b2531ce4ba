//! Input file readers
//!
//! Variants from VCF and gene annotations from GTF/GFF3, each accepting
//! plain, gzip or bzip2 input.

pub mod gtf;
pub mod vcf;

pub use gtf::{load_gene_index, parse_genes, read_genes, GffRecordView};
pub use vcf::{parse_variants, read_variants, VcfRecordView};
