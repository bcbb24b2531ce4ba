//! seqpredict CLI entry point
//!
//! Plans, runs and scores requests against the remote sequence model.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use seqpredict::core::{GeneIndex, Interval, Output, OutputType, SequenceLength, Variant};
use seqpredict::formats;
use seqpredict::rpc::{self, ApiKey, ClientConfig, DnaClient, HttpTransport, LogicalRequest, Organism, OutputSelection, ScriptedTransport, Transport};
use seqpredict::scoring::{
    tidy_scores, AggregationType, CenterMaskScorer, GeneMaskMode, GeneMaskScorer, VariantScorer,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "seqpredict")]
#[command(about = "Client for a remote genomic sequence model")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand; flags override the config file
#[derive(Args)]
struct ClientArgs {
    /// JSON client configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Service endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Environment variable holding the API key
    #[arg(long = "api-key-env", global = true)]
    api_key_env: Option<String>,
    /// Organism of the coordinates
    #[arg(long, global = true)]
    organism: Option<Organism>,
    /// Chunks in flight at once
    #[arg(long = "max-parallel-chunks", global = true)]
    max_parallel_chunks: Option<usize>,
    /// Answer from the built-in synthetic model instead of the service
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Args)]
struct SelectionArgs {
    /// Output types to predict
    #[arg(short = 'o', long = "output", value_delimiter = ',', required = true)]
    outputs: Vec<OutputType>,
    /// Ontology CURIEs (e.g. UBERON:0001157)
    #[arg(long = "ontology", value_delimiter = ',')]
    ontology_terms: Vec<String>,
}

#[derive(Args)]
struct ScoreArgs {
    /// Input VCF (plain, gzip or bzip2)
    vcf: PathBuf,
    /// Output types to score with CenterMask scorers
    #[arg(short = 'o', long = "output", value_delimiter = ',', required = true)]
    outputs: Vec<OutputType>,
    /// CenterMask window width in bases
    #[arg(short = 'w', long, default_value = "501")]
    width: u64,
    /// Aggregation applied inside the window
    #[arg(short = 'a', long, default_value_t = AggregationType::DiffMean)]
    aggregation: AggregationType,
    /// Context window centred on each variant
    #[arg(short = 'l', long = "sequence-length", default_value = "16KB")]
    sequence_length: SequenceLength,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the chunk plan for VCF scoring as JSON, without contacting the service
    Plan {
        #[command(flatten)]
        score: ScoreArgs,
    },
    /// Predict tracks for intervals and print a summary
    Predict {
        /// Intervals as chrom:start-end[:strand]
        #[arg(required = true)]
        intervals: Vec<Interval>,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Predict a locus of any width by tiling it
    Locus {
        /// Locus as chrom:start-end[:strand]
        locus: Interval,
        /// Tile length
        #[arg(short = 'l', long = "tile-length", default_value = "500KB")]
        tile_length: SequenceLength,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Score VCF variants and write tidy scores as JSON
    Score {
        #[command(flatten)]
        score: ScoreArgs,
        /// Gene annotations (GTF/GFF3) for gene-level scorers
        #[arg(short = 'g', long)]
        genes: Option<PathBuf>,
        /// Output file (stdout if not specified)
        #[arg(short = 'O', long = "out")]
        out: Option<PathBuf>,
    },
}

fn load_config(args: &ClientArgs) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(var) = &args.api_key_env {
        config.api_key_env = var.clone();
    }
    if let Some(organism) = args.organism {
        config.organism = organism;
    }
    if let Some(n) = args.max_parallel_chunks {
        config.max_parallel_chunks = n;
    }
    config.validate()?;
    Ok(config)
}

fn build_client(args: &ClientArgs, genes: Option<GeneIndex>) -> anyhow::Result<DnaClient> {
    let config = load_config(args)?;
    let (transport, key): (Arc<dyn Transport>, Option<ApiKey>) = if args.offline {
        log::info!("Offline mode: answering from the synthetic model");
        (Arc::new(ScriptedTransport::healthy()), Some(ApiKey::new("offline")?))
    } else {
        let transport = HttpTransport::new(&config.endpoint, config.attempt_timeout())?;
        // A missing key is reported by the first call, before any network traffic
        let key = ApiKey::from_env(&config.api_key_env).ok();
        (Arc::new(transport), key)
    };
    let mut client = DnaClient::new(config, key, transport)?;
    if let Some(genes) = genes {
        client = client.with_gene_index(Arc::new(genes));
    }
    Ok(client)
}

/// Context intervals and scorers for every VCF variant
///
/// With gene annotations, each track output also gets a gene-level log fold
/// change scorer.
fn scoring_inputs(
    score: &ScoreArgs,
    gene_level: bool,
) -> anyhow::Result<(Vec<(Interval, Variant)>, Vec<VariantScorer>)> {
    let variants = formats::read_variants(&score.vcf)
        .with_context(|| format!("Failed to read {}", score.vcf.display()))?;
    let pairs = variants
        .into_iter()
        .map(|variant| {
            let interval = variant
                .reference_interval()
                .resize(score.sequence_length.bases())
                .with_context(|| format!("No {} context fits around {}", score.sequence_length, variant))?;
            Ok((interval, variant))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut scorers: Vec<VariantScorer> = score
        .outputs
        .iter()
        .map(|output| CenterMaskScorer::new(*output, Some(score.width), score.aggregation).into())
        .collect();
    if gene_level {
        scorers.extend(
            score
                .outputs
                .iter()
                .filter(|output| output.is_track())
                .map(|output| GeneMaskScorer::new(*output, GeneMaskMode::LogFoldChange).into()),
        );
    }
    Ok((pairs, scorers))
}

fn print_summary(label: &str, output: &Output) {
    println!("{}", label);
    for (output_type, track) in &output.tracks {
        let means = track.channel_means();
        let overall = means.iter().sum::<f32>() / means.len().max(1) as f32;
        println!(
            "  {:<20} {:>8} rows x {:>3} channels @ {:>4} bp  mean {:.4}",
            output_type.to_string(),
            track.num_rows(),
            track.num_channels(),
            track.resolution(),
            overall
        );
    }
    if let Some(junctions) = &output.splice_junctions {
        println!("  {:<20} {:>8} junctions x {:>3} channels", "SPLICE_JUNCTIONS", junctions.junctions().len(), junctions.num_channels());
    }
    if let Some(map) = &output.contact_maps {
        println!("  {:<20} {:>8} bins @ {} bp", "CONTACT_MAPS", map.num_bins(), map.resolution());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    match &cli.command {
        Commands::Plan { score } => {
            let config = load_config(&cli.client)?;
            let (pairs, scorers) = scoring_inputs(score, false)?;
            let request = LogicalRequest::ScoreVariants { pairs, scorers };
            let selection = OutputSelection {
                organism: config.organism,
                requested_outputs: vec![],
                ontology_terms: vec![],
            };
            let plan = rpc::plan(&request, &selection, &config.limits)?;
            serde_json::to_writer_pretty(std::io::stdout().lock(), &plan)?;
            println!();
            eprintln!("Planned {} chunks for {} variants", plan.len(), plan.groups);
        }

        Commands::Predict { intervals, selection } => {
            let client = build_client(&cli.client, None)?;
            let outputs = client
                .predict_intervals(intervals, &selection.outputs, &selection.ontology_terms)
                .await?;
            for (interval, output) in intervals.iter().zip(&outputs) {
                print_summary(&interval.to_string(), output);
            }
        }

        Commands::Locus { locus, tile_length, selection } => {
            let client = build_client(&cli.client, None)?;
            let output = client
                .predict_locus(locus, *tile_length, &selection.outputs, &selection.ontology_terms)
                .await?;
            print_summary(&locus.to_string(), &output);
        }

        Commands::Score { score, genes, out } => {
            let genes = match genes {
                Some(path) => Some(
                    formats::load_gene_index(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let gene_level = genes.is_some();
            let client = build_client(&cli.client, genes)?;
            let (pairs, scorers) = scoring_inputs(score, gene_level)?;
            eprintln!("Scoring {} variants with {} scorers", pairs.len(), scorers.len());
            let results = client.score_variants(&pairs, &scorers).await?;
            let tidy = tidy_scores(results.iter().flatten());

            let mut writer: Box<dyn Write> = match out {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(std::io::stdout().lock())),
            };
            serde_json::to_writer_pretty(&mut writer, &tidy)?;
            writeln!(writer)?;
            writer.flush()?;
            eprintln!("Wrote {} scores", tidy.len());
        }
    }

    eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_score_defaults() {
        let cli = Cli::try_parse_from(["seqpredict", "score", "calls.vcf", "-o", "DNASE"]).unwrap();
        match cli.command {
            Commands::Score { score, genes, out } => {
                assert_eq!(score.vcf, PathBuf::from("calls.vcf"));
                assert_eq!(score.outputs, vec![OutputType::Dnase]);
                assert_eq!(score.width, 501);
                assert_eq!(score.aggregation, AggregationType::DiffMean);
                assert_eq!(score.sequence_length, SequenceLength::Kb16);
                assert!(genes.is_none());
                assert!(out.is_none());
            }
            _ => panic!("expected score"),
        }
        assert!(!cli.client.offline);
    }

    #[test]
    fn test_score_explicit_flags() {
        let cli = Cli::try_parse_from([
            "seqpredict", "score", "calls.vcf", "-o", "DNASE,RNA_SEQ", "-a", "L2_DIFF", "-w", "2001",
            "-l", "1MB", "--offline",
        ])
        .unwrap();
        match cli.command {
            Commands::Score { score, .. } => {
                assert_eq!(score.outputs, vec![OutputType::Dnase, OutputType::RnaSeq]);
                assert_eq!(score.aggregation, AggregationType::L2Diff);
                assert_eq!(score.width, 2001);
                assert_eq!(score.sequence_length, SequenceLength::Mb1);
            }
            _ => panic!("expected score"),
        }
        assert!(cli.client.offline);
    }

    #[test]
    fn test_locus_and_predict_parse() {
        let cli = Cli::try_parse_from(["seqpredict", "locus", "chr1:1000-5000", "-o", "ATAC"]).unwrap();
        match cli.command {
            Commands::Locus { locus, tile_length, selection } => {
                assert_eq!((locus.start(), locus.end()), (1000, 5000));
                assert_eq!(tile_length, SequenceLength::Kb500);
                assert_eq!(selection.outputs, vec![OutputType::Atac]);
            }
            _ => panic!("expected locus"),
        }

        let cli = Cli::try_parse_from([
            "seqpredict", "predict", "chr1:0-2048", "chr2:0-2048:-", "-o", "CAGE", "--ontology",
            "UBERON:0001157,CL:0000084",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict { intervals, selection } => {
                assert_eq!(intervals.len(), 2);
                assert_eq!(selection.ontology_terms.len(), 2);
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_invalid_aggregation_rejected() {
        assert!(Cli::try_parse_from(["seqpredict", "score", "calls.vcf", "-o", "DNASE", "-a", "bogus"]).is_err());
        assert!(Cli::try_parse_from(["seqpredict", "score", "calls.vcf"]).is_err());
    }

    #[test]
    fn test_scoring_inputs_add_gene_scorers() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("calls.vcf");
        std::fs::write(&vcf, "#CHROM\tPOS\tID\tREF\tALT\nchr22\t108001\trs1\tA\tC\n").unwrap();
        let cli = Cli::try_parse_from(["seqpredict", "score", vcf.to_str().unwrap(), "-o", "DNASE,CONTACT_MAPS"]).unwrap();
        let Commands::Score { score, .. } = cli.command else {
            panic!("expected score");
        };

        let (pairs, scorers) = scoring_inputs(&score, false).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.width(), 16_384);
        assert_eq!(scorers.len(), 2);

        // Contact maps are not a track, so only DNASE gets a gene scorer
        let (_, scorers) = scoring_inputs(&score, true).unwrap();
        assert_eq!(scorers.len(), 3);
        assert!(scorers[2].needs_genes());
    }
}
