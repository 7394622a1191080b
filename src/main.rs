use csv_core::{ReadFieldResult, ReaderBuilder};
use lasso::{Rodeo, Spur};
use piepho::*;
use std::collections::HashMap;
use std::io;
use std::str;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: piepho (tukey|dunn|pvalues) [alpha] [cycles] [metric] [seed]";

fn invalid<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Calls `on_record` with every tab-separated record in `input`, along with its line number.
/// Empty lines are skipped.
fn read_records<I: io::Read, F>(mut input: I, mut on_record: F) -> io::Result<()>
where
    F: FnMut(u64, &[&str]) -> io::Result<()>,
{
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut ends = Vec::new();
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(invalid(format!("record too long on line {}", tsv.line())));
                }
                ReadFieldResult::Field { record_end } => {
                    ends.push(fieldlen);
                    if record_end {
                        let record = str::from_utf8(&fieldbuf[..fieldlen]).map_err(invalid)?;
                        let mut start = 0;
                        let fields: Vec<&str> = ends
                            .iter()
                            .map(|&end| {
                                let field = record[start..end].trim();
                                start = end;
                                field
                            })
                            .collect();
                        if fields.iter().any(|field| !field.is_empty()) {
                            on_record(tsv.line(), &fields)?;
                        }
                        fieldlen = 0;
                        ends.clear();
                    }
                }
                ReadFieldResult::End => return Ok(()),
            }
        }
    }
}

/// Reads `group<TAB>value` rows. A first row whose value isn't a number is a header.
fn load_samples<I: io::Read>(input: I, rodeo: &mut Rodeo) -> io::Result<Samples<Spur>> {
    let mut samples = Samples::new();
    let mut first = true;
    read_records(input, |line, fields| {
        let header = first;
        first = false;
        let (group, value) = match fields {
            [group, value] => (group, value),
            _ => return Err(invalid(format!("expected 2 fields on line {}", line))),
        };
        match value.parse() {
            Ok(value) => {
                samples
                    .add(rodeo.get_or_intern(group), value)
                    .map_err(invalid)?;
                Ok(())
            }
            Err(_) if header => Ok(()),
            Err(e) => Err(invalid(format!("line {}: {}", line, e))),
        }
    })?;
    Ok(samples)
}

/// Reads `group1<TAB>group2<TAB>p` rows. A first row whose p-value isn't a number is a header.
fn load_p_values<I: io::Read>(
    input: I,
    rodeo: &mut Rodeo,
) -> io::Result<Vec<(Spur, Spur, f64)>> {
    let mut rows = Vec::new();
    let mut first = true;
    read_records(input, |line, fields| {
        let header = first;
        first = false;
        let (group1, group2, p) = match fields {
            [group1, group2, p] => (group1, group2, p),
            _ => return Err(invalid(format!("expected 3 fields on line {}", line))),
        };
        match p.parse() {
            Ok(p) => {
                rows.push((rodeo.get_or_intern(group1), rodeo.get_or_intern(group2), p));
                Ok(())
            }
            Err(_) if header => Ok(()),
            Err(e) => Err(invalid(format!("line {}: {}", line, e))),
        }
    })?;
    Ok(rows)
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let mode = args.next().ok_or_else(|| invalid(USAGE))?;
    let alpha = match args.next() {
        Some(alpha) => alpha.parse().map_err(|_| invalid(USAGE))?,
        None => DEFAULT_ALPHA,
    };
    let mut config = LetterConfig::default();
    if let Some(cycles) = args.next() {
        config = config.with_cycles(cycles.parse().map_err(|_| invalid(USAGE))?);
    }
    if let Some(metric) = args.next() {
        config = config.with_metric(metric.parse().map_err(invalid)?);
    }
    if let Some(seed) = args.next() {
        config = config.with_seed(seed.parse().map_err(|_| invalid(USAGE))?);
    }

    let mut rodeo = Rodeo::new();
    let (comparisons, ordering): (Comparisons<Spur>, Option<HashMap<Spur, f64>>) =
        if mode == "pvalues" {
            let rows = load_p_values(io::stdin().lock(), &mut rodeo)?;
            (Comparisons::from_p_values(rows, alpha).map_err(invalid)?, None)
        } else {
            let test: PostHoc = mode.parse().map_err(invalid)?;
            let samples = load_samples(io::stdin().lock(), &mut rodeo)?;
            info!(
                groups = samples.groups().len(),
                observations = samples.len(),
                ?test,
                "loaded samples"
            );
            (
                test.compare(&samples, alpha).map_err(invalid)?,
                Some(samples.medians()),
            )
        };
    comparisons.require_complete().map_err(invalid)?;

    let letters = assign_letters(&comparisons, ordering.as_ref(), &config).map_err(invalid)?;
    info!(fitness = ?letters.fitness(), "assigned letters");

    let resolver = rodeo.into_resolver();
    for (group, string) in letters.iter() {
        println!("{}\t{}", resolver.resolve(group), string);
    }
    Ok(())
}
