use std::fs::File;
use std::io::prelude::*;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{Parser, Subcommand};
use log::error;

use lyso_bam::bai::{parse_bai, RegionQuery};
use lyso_bam::reader::{RecordStream, StreamItem};
use lyso_bam::ReaderConfig;
use lyso_fasta::reader::FastaReader;
use lyso_fastq::index::FastqIndexer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate various file indices
    Faidx {
        /// Input file
        f_path: Option<PathBuf>,
    },
    /// Print every record of a BAM file as tab-separated SAM-style lines
    View {
        f_path: Option<PathBuf>,
    },
    /// Print every record of a BAM file overlapping `ref:start-end`, using its `.bai` index
    Query {
        f_path: PathBuf,
        region: String,
    },
    FaPrint {
        f_path: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Faidx { f_path }) => {
            if let Some(p) = f_path.as_deref() {
                index_fastq(p);
            }
        }
        Some(Commands::View { f_path }) => {
            if let Some(p) = f_path.as_deref() {
                view_bam(p);
            }
        }
        Some(Commands::Query { f_path, region }) => {
            query_bam(f_path, region);
        }
        Some(Commands::FaPrint { f_path }) => {
            if let Some(p) = f_path.as_deref() {
                test_read_fasta(p);
            }
        }
        None => {}
    }
}

fn test_read_fasta<P: AsRef<Path>>(fpath: P) {
    let mut in_file = File::open(&fpath).expect("unable to open file.");
    let mut buf_in = std::io::BufReader::new(&mut in_file);
    let fa_reader = FastaReader::new(&mut buf_in);
    let stdout = stdout();
    let mut handle = stdout.lock();
    for rec in fa_reader {
        if let Err(e) = writeln!(handle, "{}", rec.unwrap()) {
            match e.kind() {
                std::io::ErrorKind::BrokenPipe => exit(141),
                _ => panic!("{e}"),
            }
        }
    }
}

fn index_fastq<P: AsRef<Path>>(fpath: P) {
    let mut in_file = File::open(&fpath).expect("unable to open file.");
    let mut buf_in = std::io::BufReader::new(&mut in_file);
    let fq_idxr = FastqIndexer::new(&mut buf_in);
    let out_f = File::create("test.fai").unwrap();
    let mut buf_out = std::io::BufWriter::new(out_f);
    let mut idx_str;
    for idx in fq_idxr {
        idx_str = format!("{}\n", idx.unwrap());
        buf_out.write(idx_str.as_bytes()).unwrap();
    }
    buf_out.flush().unwrap();
}

fn view_bam<P: AsRef<Path>>(fpath: P) {
    let in_file = File::open(&fpath).expect("unable to open file.");
    let mut stream = RecordStream::new(in_file, ReaderConfig::default());
    let stdout = stdout();
    let mut handle = stdout.lock();

    for item in &mut stream {
        match item {
            Ok(StreamItem::Record(rec)) => {
                if let Err(e) = writeln!(handle, "{rec}") {
                    match e.kind() {
                        std::io::ErrorKind::BrokenPipe => exit(141),
                        _ => panic!("{e}"),
                    }
                }
            }
            Ok(StreamItem::Warning(w)) => error!("{w}"),
            Ok(StreamItem::Header(_) | StreamItem::End) => {}
            Err(e) => {
                eprintln!("error reading BAM: {e}");
                exit(1);
            }
        }
    }
}

/// Parse `name:start-end` (1-based, inclusive, samtools-style) into
/// `(name, 0-based start, 0-based end)`.
fn parse_region(region: &str) -> Option<(&str, i64, i64)> {
    let (name, coords) = region.split_once(':')?;
    let (start, end) = coords.split_once('-')?;
    let start: i64 = start.replace(',', "").parse().ok()?;
    let end: i64 = end.replace(',', "").parse().ok()?;
    Some((name, start - 1, end))
}

fn query_bam(fpath: &Path, region: &str) {
    let Some((ref_name, start, end)) = parse_region(region) else {
        eprintln!("could not parse region {region:?}, expected name:start-end");
        exit(2);
    };

    let bai_path = format!("{}.bai", fpath.display());
    let bai_bytes = std::fs::read(&bai_path).unwrap_or_else(|e| {
        eprintln!("unable to read index {bai_path}: {e}");
        exit(1);
    });
    let mut index_warnings = Vec::new();
    let bai = parse_bai(&bai_bytes, &mut index_warnings).unwrap_or_else(|e| {
        eprintln!("malformed index {bai_path}: {e}");
        exit(1);
    });
    for w in &index_warnings {
        error!("{w}");
    }

    let in_file = File::open(fpath).expect("unable to open file.");
    let mut stream = RecordStream::new(in_file, ReaderConfig::default());
    let references = loop {
        match stream.next() {
            Some(Ok(StreamItem::Header(info))) => break info.references,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                eprintln!("error reading BAM header: {e}");
                exit(1);
            }
            None => {
                eprintln!("BAM file ended before a header was read");
                exit(1);
            }
        }
    };

    let query = RegionQuery::new(&bai, &references, ReaderConfig::default());
    let Some(ref_id) = query.resolve_reference(ref_name) else {
        eprintln!("unknown reference {ref_name:?}");
        exit(1);
    };
    let Some(chunks) = query.chunks(ref_id, start, end) else {
        eprintln!("no index entries for reference {ref_name:?}");
        exit(1);
    };

    let stdout = stdout();
    let mut handle = stdout.lock();
    for rec in stream.query_chunks(chunks, ref_id, start, end) {
        match rec {
            Ok(rec) => {
                if let Err(e) = writeln!(handle, "{rec}") {
                    match e.kind() {
                        std::io::ErrorKind::BrokenPipe => exit(141),
                        _ => panic!("{e}"),
                    }
                }
            }
            Err(e) => {
                eprintln!("error reading BAM record: {e}");
                exit(1);
            }
        }
    }
}
