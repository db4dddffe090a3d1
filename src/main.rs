use clap::Parser;
use log::info;
use spanseq::pipeline::{run, RunConfig, SlicerKind};
use spanseq::region::RegionIndex;
use spanseq::tools::{HaplotypeCallerParams, ProcessRunner};
use spanseq::trf::HeaderLayout;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TRF_PARAMS: &str = "2 7 7 80 10 50 200 -ngs -h";

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Path to the BED-like file with the regions of interest (chrom, start, end).
    #[clap(short = 'r', long, value_parser)]
    regions: PathBuf,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Extract spanning-read sequences over regions of interest and annotate their tandem repeats.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Extract, detect repeats, and write the merged table
    Run {
        #[clap(flatten)]
        common: CommonOpts,

        /// Alignment input: a BAM file, a directory of BAM files, or a comma separated list
        #[clap(short = 'a', long, value_parser)]
        alignments: String,

        /// Reference FASTA (indexed with a .fai next to it)
        #[clap(short = 'f', long, value_parser)]
        reference: PathBuf,

        /// Directory receiving intermediate files and the final table
        #[clap(short = 'o', long, value_parser)]
        output_dir: PathBuf,

        /// Flank size added on both sides of each region
        #[clap(short = 'w', long, value_parser, default_value_t = 50)]
        window: u32,

        /// Number of threads for parallel processing.
        #[clap(short = 't', long, value_parser, default_value_t = default_threads())]
        threads: NonZeroUsize,

        /// Two-column table (READ_NAME, HAPLOTAG) joined onto the output by read name
        #[clap(long, value_parser)]
        haplotags: Option<PathBuf>,

        /// samtools executable
        #[clap(long, value_parser, default_value = "samtools")]
        samtools: String,

        /// Tandem repeat finder executable
        #[clap(long, value_parser, default_value = "trf")]
        trf: String,

        /// Tandem repeat finder parameters, whitespace separated
        #[clap(long, value_parser, default_value = DEFAULT_TRF_PARAMS, allow_hyphen_values = true)]
        trf_params: String,

        /// Layout of the sequence headers handed to the repeat finder
        #[clap(long, value_enum, default_value_t = HeaderLayout::Reads)]
        header_layout: HeaderLayout,

        /// Read the alignment files directly instead of subsetting them to the regions first
        #[clap(long, action)]
        no_subset: bool,

        /// Backend used to slice the reference baseline
        #[clap(long, value_enum, default_value_t = SlicerKind::Htslib)]
        reference_slicer: SlicerKind,

        /// Seconds before an external tool invocation is killed
        #[clap(long, value_parser)]
        tool_timeout: Option<u64>,

        /// Extra attempts for a failing external tool invocation
        #[clap(long, value_parser, default_value_t = 0)]
        tool_retries: u32,

        /// Haplotype caller executable run on the merged table
        #[clap(long, value_parser)]
        haplotype_caller: Option<String>,

        /// Allowed length deviation forwarded to the haplotype caller
        #[clap(long, value_parser, default_value_t = 0.1)]
        haplo_deviation: f64,

        /// Minimum read support forwarded to the haplotype caller
        #[clap(long, value_parser, default_value_t = 2)]
        min_support: u32,

        /// Minimum coverage forwarded to the haplotype caller
        #[clap(long, value_parser, default_value_t = 5)]
        min_coverage: u32,
    },
    /// Print region statistics
    Stats {
        #[clap(flatten)]
        common: CommonOpts,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Run {
            common,
            alignments,
            reference,
            output_dir,
            window,
            threads,
            haplotags,
            samtools,
            trf,
            trf_params,
            header_layout,
            no_subset,
            reference_slicer,
            tool_timeout,
            tool_retries,
            haplotype_caller,
            haplo_deviation,
            min_support,
            min_coverage,
        } => {
            initialize_logger(&common);

            let config = RunConfig {
                alignments,
                regions: common.regions,
                reference,
                output_dir,
                window: i64::from(window),
                threads: threads.get(),
                haplotags,
                samtools,
                trf,
                trf_params: trf_params.split_whitespace().map(str::to_string).collect(),
                header_layout,
                subset: !no_subset,
                reference_slicer,
                haplotype_caller: haplotype_caller.map(|program| HaplotypeCallerParams {
                    program,
                    deviation: haplo_deviation,
                    min_support,
                    min_coverage,
                }),
            };
            let runner = ProcessRunner::new(tool_timeout.map(Duration::from_secs), tool_retries);

            let summary = run(&config, &runner)?;
            info!(
                "{} samples, {} rows in {}",
                summary.samples,
                summary.rows,
                summary.table.display()
            );
            if !summary.failures.is_empty() {
                return Err(io::Error::other(format!(
                    "{} sample(s) failed",
                    summary.failures.len()
                )));
            }
        }
        Args::Stats { common } => {
            initialize_logger(&common);

            let index = RegionIndex::from_path(&common.regions)?;
            print_stats(&index);
        }
    }

    Ok(())
}

fn initialize_logger(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();
}

fn print_stats(index: &RegionIndex) {
    let regions = index.regions();
    let total_length: i64 = regions.iter().map(|r| r.len()).sum();
    println!("Number of regions: {}", index.region_count());
    println!("Number of chromosomes: {}", index.chrom_count());
    println!("Total region length: {} bp", total_length);

    if regions.is_empty() {
        return;
    }

    let mut lengths: Vec<i64> = regions.iter().map(|r| r.len()).collect();
    lengths.sort_unstable();
    let mean = total_length as f64 / lengths.len() as f64;
    let median = if lengths.len() % 2 == 0 {
        let mid = lengths.len() / 2;
        (lengths[mid - 1] + lengths[mid]) as f64 / 2.0
    } else {
        lengths[lengths.len() / 2] as f64
    };
    println!("Mean region length: {:.2} bp", mean);
    println!("Median region length: {:.2} bp", median);
    println!("Shortest region: {} bp", lengths[0]);
    println!("Longest region: {} bp", lengths[lengths.len() - 1]);
}
