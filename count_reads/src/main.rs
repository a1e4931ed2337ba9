//! count_reads
#![deny(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pararead::{BamReadsFile, ChunkContext, ChunkKey, ParaReadProcessor, ProcessorConfig, ReadsFile};
use std::path::PathBuf;
use std::process::ExitCode;

mod mylog;

const ACTION: &str = "CountReads";

/// Count the reads on each reference sequence of a BAM file, one worker per
/// reference, and write one "<reference>\t<count>" line per reference.
#[derive(Parser, Debug)]
#[clap(name = "count_reads")]
struct CountReads {
    /// Coordinate-sorted BAM file; an index speeds up every chunk.
    readsfile: PathBuf,

    /// Output file [default: <readsfile stem>_CountReads.txt next to the input]
    #[clap(short = 'O', long)]
    outfile: Option<PathBuf>,

    /// Number of worker threads.
    #[clap(short = 'C', long)]
    cores: Option<usize>,

    /// Only count these reference sequences.
    #[clap(long, num_args = 1..)]
    limit: Vec<ChunkKey>,

    /// Processor settings in TOML. Options given on the command line win.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Keep the per-reference files after combining.
    #[clap(long)]
    keep_temp: bool,

    /// Log at debug level.
    #[clap(short, long)]
    verbose: bool,
}

impl CountReads {
    fn processor_config(&self) -> Result<ProcessorConfig> {
        let mut config = match &self.config {
            Some(path) => ProcessorConfig::from_toml_file(path)?,
            None => ProcessorConfig::default(),
        };
        config.action = Some(ACTION.to_string());
        if let Some(outfile) = &self.outfile {
            config.outfile = Some(outfile.clone());
        }
        if let Some(cores) = self.cores {
            config.cores = cores;
        }
        if !self.limit.is_empty() {
            config.limit = Some(self.limit.clone());
        }
        config.keep_temp |= self.keep_temp;
        Ok(config)
    }
}

fn count_chunk(chrom: &str, ctx: &mut ChunkContext<'_, BamReadsFile>) -> Result<ChunkKey> {
    let n_reads = ctx.reads().count(chrom)?;
    std::fs::write(ctx.output(), format!("{chrom}\t{n_reads}"))
        .with_context(|| format!("failed to write {}", ctx.output().display()))?;
    Ok(chrom.to_string())
}

fn inner_main(args: &CountReads) -> Result<()> {
    let mut counter = ParaReadProcessor::for_bam(&args.readsfile, args.processor_config()?)?;
    counter.register()?;

    info!("Counting reads: {}", args.readsfile.display());
    let good_chromosomes = counter.run(&count_chunk, None)?;

    info!("Collecting read counts: {}", counter.output().display());
    let report = counter.combine(&good_chromosomes, false, Some("\n"))?;
    info!(
        "wrote {} reference(s) to {}",
        report.merged.len(),
        counter.output().display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = CountReads::parse();
    mylog::init_log(args.verbose);
    match inner_main(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("count_reads: {e:#}");
            ExitCode::FAILURE
        }
    }
}
