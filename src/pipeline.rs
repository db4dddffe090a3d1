//! End-to-end run: subset, extract, reference baseline, repeat detection,
//! merge, haplotag join and the optional haplotype-calling hand-off.
//!
//! Configuration problems fail before any sample is touched. After that a
//! failing sample is recorded and the remaining samples carry on.

use crate::extract::{ExtractionCoordinator, ExtractionRecord};
use crate::faidx::ReferenceFasta;
use crate::haplotag::Haplotags;
use crate::input::{discover_alignments, sample_name};
use crate::merge::{attach_haplotags, merge_repeat_matches, MergedRecord};
use crate::output::{write_detector_fasta_file, write_merged_table_file};
use crate::read::read_alignments;
use crate::reference::{extract_reference, SamtoolsSlicer, SequenceSlicer, REFERENCE_SAMPLE};
use crate::region::RegionIndex;
use crate::tools::{
    call_haplotypes, run_repeat_finder, subset_alignment, HaplotypeCallerParams, ToolRunner,
};
use crate::trf::{parse_trf_output, HeaderLayout};
use log::{error, info};
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const TABLE_FILE: &str = "spanning_reads_trf_phasing.txt";

/// Where reference slices come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SlicerKind {
    /// In-process through htslib's faidx
    Htslib,
    /// `samtools faidx -r`
    Samtools,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub alignments: String,
    pub regions: PathBuf,
    pub reference: PathBuf,
    pub output_dir: PathBuf,
    pub window: i64,
    pub threads: usize,
    pub haplotags: Option<PathBuf>,
    pub samtools: String,
    pub trf: String,
    pub trf_params: Vec<String>,
    pub header_layout: HeaderLayout,
    pub subset: bool,
    pub reference_slicer: SlicerKind,
    pub haplotype_caller: Option<HaplotypeCallerParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Subset,
    Extraction,
    Reference,
    RepeatDetection,
    HaplotypeCalling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Subset => "region subsetting",
            Stage::Extraction => "sequence extraction",
            Stage::Reference => "reference extraction",
            Stage::RepeatDetection => "repeat detection",
            Stage::HaplotypeCalling => "haplotype calling",
        };
        f.write_str(name)
    }
}

/// A sample that could not be carried through a stage
#[derive(Debug)]
pub struct SampleFailure {
    pub sample: String,
    pub stage: Stage,
    pub message: String,
}

impl SampleFailure {
    fn new(sample: &str, stage: Stage, message: impl fmt::Display) -> Self {
        let failure = SampleFailure {
            sample: sample.to_string(),
            stage,
            message: message.to_string(),
        };
        error!("{failure}");
        failure
    }
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.sample, self.stage, self.message)
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub table: PathBuf,
    pub rows: usize,
    pub samples: usize,
    pub failures: Vec<SampleFailure>,
}

/// Extracted sequences of one sample and the detector input written for it
struct SampleSequences {
    name: String,
    fasta: PathBuf,
    records: Vec<ExtractionRecord>,
}

fn check_config(config: &RunConfig) -> io::Result<()> {
    if config.window < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Window must be non-negative, got {}", config.window),
        ));
    }
    if !config.reference.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Reference '{}' not found", config.reference.display()),
        ));
    }
    if !config.output_dir.is_dir() {
        info!("Output directory not found, will create");
        std::fs::create_dir_all(&config.output_dir)?;
    } else {
        info!("Output directory found, will add outputs there");
    }
    Ok(())
}

fn extract_alignment_sample(
    config: &RunConfig,
    runner: &dyn ToolRunner,
    coordinator: &ExtractionCoordinator,
    index: &RegionIndex,
    alignment: &Path,
) -> Result<SampleSequences, SampleFailure> {
    let name = sample_name(alignment);

    let source = if config.subset {
        subset_alignment(
            runner,
            &config.samtools,
            alignment,
            &config.regions,
            &config.output_dir,
            config.threads,
        )
        .map_err(|e| SampleFailure::new(&name, Stage::Subset, e))?
    } else {
        alignment.to_path_buf()
    };

    let reads = read_alignments(&source)
        .map_err(|e| SampleFailure::new(&name, Stage::Extraction, e))?;
    let extraction = coordinator.extract_sample(&name, &reads, index);

    let fasta = config.output_dir.join(format!("tmp_{name}.fa"));
    write_detector_fasta_file(&fasta, &extraction.records, config.header_layout)
        .map_err(|e| SampleFailure::new(&name, Stage::Extraction, e))?;

    Ok(SampleSequences {
        name,
        fasta,
        records: extraction.records,
    })
}

fn extract_reference_sample(
    config: &RunConfig,
    runner: &dyn ToolRunner,
    index: &RegionIndex,
) -> Result<SampleSequences, SampleFailure> {
    let fail = |e: io::Error| SampleFailure::new(REFERENCE_SAMPLE, Stage::Reference, e);

    let slicer: Box<dyn SequenceSlicer + '_> = match config.reference_slicer {
        SlicerKind::Htslib => Box::new(ReferenceFasta::open(&config.reference).map_err(fail)?),
        SlicerKind::Samtools => Box::new(SamtoolsSlicer {
            runner,
            samtools: config.samtools.clone(),
            reference: config.reference.clone(),
            work_dir: config.output_dir.clone(),
        }),
    };
    let records = extract_reference(index.regions(), config.window, slicer.as_ref()).map_err(fail)?;

    let fasta = config.output_dir.join(format!("{REFERENCE_SAMPLE}.fa"));
    write_detector_fasta_file(&fasta, &records, config.header_layout).map_err(fail)?;

    Ok(SampleSequences {
        name: REFERENCE_SAMPLE.to_string(),
        fasta,
        records,
    })
}

fn detect_repeats(
    config: &RunConfig,
    runner: &dyn ToolRunner,
    sample: SampleSequences,
) -> Result<Vec<MergedRecord>, SampleFailure> {
    let report = run_repeat_finder(runner, &config.trf, &config.trf_params, &sample.fasta)
        .map_err(|e| SampleFailure::new(&sample.name, Stage::RepeatDetection, e))?;
    let matches = parse_trf_output(&report, config.header_layout)
        .map_err(|e| SampleFailure::new(&sample.name, Stage::RepeatDetection, e))?;
    info!("{}: {} repeat matches", sample.name, matches.len());
    Ok(merge_repeat_matches(&sample.name, sample.records, matches))
}

/// Run the whole analysis described by `config`.
pub fn run(config: &RunConfig, runner: &dyn ToolRunner) -> io::Result<RunSummary> {
    let started = Instant::now();

    check_config(config)?;
    let index = RegionIndex::from_path(&config.regions)?;
    let alignments = discover_alignments(&config.alignments)?;
    let haplotags = match &config.haplotags {
        Some(path) => Some(Haplotags::from_path(path)?),
        None => {
            info!("Phasing not selected (no haplotag table given)");
            None
        }
    };
    let coordinator = ExtractionCoordinator::new(config.threads, config.window)?;

    let mut failures = Vec::new();
    let mut samples = Vec::new();

    let stage_start = Instant::now();
    for alignment in &alignments {
        match extract_alignment_sample(config, runner, &coordinator, &index, alignment) {
            Ok(sample) => samples.push(sample),
            Err(failure) => failures.push(failure),
        }
    }
    match extract_reference_sample(config, runner, &index) {
        Ok(sample) => samples.push(sample),
        Err(failure) => failures.push(failure),
    }
    info!(
        "Exact sequences extracted in {:.0} seconds",
        stage_start.elapsed().as_secs_f64()
    );

    let stage_start = Instant::now();
    let sample_count = samples.len();
    let detected: Vec<Result<Vec<MergedRecord>, SampleFailure>> = coordinator.install(|| {
        samples
            .into_par_iter()
            .map(|sample| detect_repeats(config, runner, sample))
            .collect()
    });
    let mut rows = Vec::new();
    for result in detected {
        match result {
            Ok(sample_rows) => rows.extend(sample_rows),
            Err(failure) => failures.push(failure),
        }
    }
    info!(
        "Repeat detection done on all samples in {:.0} seconds",
        stage_start.elapsed().as_secs_f64()
    );

    if let Some(haplotags) = &haplotags {
        attach_haplotags(&mut rows, haplotags);
    }
    let table = config.output_dir.join(TABLE_FILE);
    write_merged_table_file(&table, &rows)?;
    info!("Data combined, {} rows written to {}", rows.len(), table.display());

    if let Some(params) = &config.haplotype_caller {
        let called = call_haplotypes(runner, params, &table, &config.output_dir, config.threads);
        if let Err(e) = called {
            failures.push(SampleFailure::new("all samples", Stage::HaplotypeCalling, e));
        }
    }

    info!(
        "Analysis completed in {:.0} seconds",
        started.elapsed().as_secs_f64()
    );
    Ok(RunSummary {
        table,
        rows: rows.len(),
        samples: sample_count,
        failures,
    })
}
