use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::error::NormalizeError;
use crate::normalize::money::Scale;
use crate::normalize::normalize_record;
use crate::record::{self, NormalizedRecord};
use crate::store::EntityStore;

pub struct LoadOptions {
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub show_progress: bool,
}

/// Counters for one `load` run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub lines: usize,
    pub malformed_lines: usize,
    pub records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub stored: usize,
    pub failed: usize,
    pub films_created: usize,
    pub entities_created: usize,
    pub links_created: usize,
    pub raw_unit_amounts: usize,
}

impl RunStats {
    pub fn print(&self) {
        println!(
            "Read {} lines ({} malformed) -> {} records: {} accepted, {} rejected.",
            self.lines, self.malformed_lines, self.records, self.accepted, self.rejected,
        );
        println!(
            "Stored {} ({} failed): {} new films, {} new people/companies, {} new associations.",
            self.stored, self.failed, self.films_created, self.entities_created, self.links_created,
        );
        if self.raw_unit_amounts > 0 {
            println!(
                "{} amounts had no unit word and were scaled as raw currency units.",
                self.raw_unit_amounts
            );
        }
    }
}

/// Output of the pure stages for one input line.
enum Prepared {
    Malformed(String),
    Records(Vec<Result<NormalizedRecord, NormalizeError>>),
}

fn prepare_line(line: &str) -> Prepared {
    match record::parse_line(line) {
        Ok(input) => Prepared::Records(
            record::build_records(input)
                .into_iter()
                .map(normalize_record)
                .collect(),
        ),
        Err(e) => Prepared::Malformed(e.to_string()),
    }
}

pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open input {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse, normalize and persist every record in `reader`.
///
/// Lines are parsed and normalized in parallel batches; records are then
/// written one at a time, in input order, each in its own transaction.
/// Without a store the accepted records are printed as JSON instead.
pub fn run<R: BufRead>(
    reader: R,
    store: Option<&EntityStore<'_>>,
    opts: &LoadOptions,
) -> Result<RunStats> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if !line.trim().is_empty() {
            lines.push((idx + 1, line));
        }
    }
    if let Some(n) = opts.limit {
        lines.truncate(n);
    }

    let pb = if opts.show_progress {
        let pb = ProgressBar::new(lines.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut stats = RunStats {
        lines: lines.len(),
        ..RunStats::default()
    };

    for chunk in lines.chunks(opts.batch_size.max(1)) {
        let prepared: Vec<Prepared> = chunk.par_iter().map(|(_, line)| prepare_line(line)).collect();

        for ((line_no, _), outcome) in chunk.iter().zip(prepared) {
            let records = match outcome {
                Prepared::Malformed(reason) => {
                    stats.malformed_lines += 1;
                    warn!(line = line_no, %reason, "skipping malformed input line");
                    continue;
                }
                Prepared::Records(records) => records,
            };
            for record in records {
                stats.records += 1;
                match record {
                    Ok(rec) => {
                        stats.accepted += 1;
                        stats.raw_unit_amounts += raw_unit_amounts(&rec);
                        persist(store, &rec, *line_no, &mut stats)?;
                    }
                    Err(reason) => {
                        stats.rejected += 1;
                        warn!(line = line_no, %reason, "record rejected");
                    }
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        lines = stats.lines,
        records = stats.records,
        stored = stats.stored,
        rejected = stats.rejected,
        failed = stats.failed,
        "load finished"
    );
    Ok(stats)
}

fn persist(
    store: Option<&EntityStore<'_>>,
    rec: &NormalizedRecord,
    line_no: usize,
    stats: &mut RunStats,
) -> Result<()> {
    let Some(store) = store else {
        println!("{}", serde_json::to_string(rec)?);
        return Ok(());
    };
    match store.store(rec) {
        Ok(outcome) => {
            stats.stored += 1;
            stats.films_created += usize::from(outcome.film_created);
            stats.entities_created += usize::from(outcome.entity_created);
            stats.links_created += usize::from(outcome.linked);
        }
        Err(e) => {
            stats.failed += 1;
            error!(line = line_no, title = rec.title(), error = %e, "failed to store record");
        }
    }
    Ok(())
}

fn raw_unit_amounts(rec: &NormalizedRecord) -> usize {
    match rec {
        NormalizedRecord::Movie(m) => [m.budget, m.box_office]
            .iter()
            .flatten()
            .filter(|a| a.scale == Scale::RawUnits)
            .count(),
        NormalizedRecord::Association(_) => 0,
    }
}
