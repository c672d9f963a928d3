//! Rule index and rules file formats.
//!
//! The rule index holds one entry per qualified template:
//!
//! ```text
//! ABS: <id>\t<CAR|OAR>\t<rule>\t<standardConf>\t<smoothedConf>\t<pcaConf>\t<apcaConf>\t<headCoverage>\t<validPrecision>
//! <record>\t<record>\t...            (open templates only)
//! ```
//!
//! where a record is `0,<anchor>,<measures>` or `2,<head>,<tail>,<measures>`.
//! The rules file holds one line per qualified rule:
//! `<CAR|OAR>\t<rule>\t<quality>\t<headCoverage>\t<validPrecision>\t<support>\t<totalPredictions>`.

use crate::error::MineError;
use crate::rule::{InsRuleSummary, RuleKind, Template};
use crate::stats::{Measures, QualityMeasure, RuleStats};
use std::cmp::Ordering;
use std::path::Path;

const ENTRY_PREFIX: &str = "ABS: ";

/// At most five fraction digits, trailing zeros removed.
pub fn format_measure(value: f64) -> String {
    let text = format!("{value:.5}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn join_measures(measures: &Measures) -> String {
    measures
        .columns()
        .iter()
        .map(|v| format_measure(*v))
        .collect::<Vec<_>>()
        .join("\t")
}

/// The `ABS:` line of a template entry.
pub fn index_line(id: u32, template: &Template, measures: &Measures) -> String {
    format!(
        "{ENTRY_PREFIX}{id}\t{}\t{}",
        template.index_string(),
        join_measures(measures)
    )
}

/// A full open-template entry: the `ABS:` line plus its record line.
pub fn open_index_entry(
    id: u32,
    template: &Template,
    measures: &Measures,
    records: &[InsRuleSummary],
) -> String {
    let records: Vec<String> = records.iter().map(InsRuleSummary::to_record).collect();
    format!("{}\n{}", index_line(id, template, measures), records.join("\t"))
}

/// One rules-file line.
pub fn rules_line(kind: RuleKind, rule_text: &str, stats: &RuleStats, measure: QualityMeasure) -> String {
    format!(
        "{}\t{rule_text}\t{}\t{}\t{}\t{}\t{}",
        kind.header(),
        format_measure(stats.quality(measure)),
        format_measure(stats.measures.head_coverage),
        format_measure(stats.measures.valid_precision),
        stats.support,
        stats.total_predictions,
    )
}

fn measure_column(measure: QualityMeasure) -> usize {
    match measure {
        QualityMeasure::StandardConf => 0,
        QualityMeasure::SmoothedConf => 1,
        QualityMeasure::PcaConf => 2,
        QualityMeasure::ApcaConf => 3,
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, MineError> {
    let text = std::fs::read_to_string(path).map_err(|e| MineError::io(path, e))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), MineError> {
    let mut text = lines.join("\n");
    if !lines.is_empty() {
        text.push('\n');
    }
    std::fs::write(path, text).map_err(|e| MineError::io(path, e))
}

fn index_error(path: &Path, line: usize, message: impl Into<String>) -> MineError {
    MineError::Index {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

fn parse_float(path: &Path, line: usize, field: &str) -> Result<f64, MineError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| index_error(path, line, format!("expected a number, got {field:?}")))
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

// ============================================================================
// Re-sorting
// ============================================================================

/// Re-sort a rule index descending by `measure`.
///
/// Closed entries are keyed by their own measure. Open entries are keyed by
/// the mean of their records' measure, which is appended to the `ABS:` line;
/// open entries without records are dropped. Ties keep file order.
pub fn order_rule_index_file(path: &Path, measure: QualityMeasure) -> Result<usize, MineError> {
    let lines = read_lines(path)?;
    let column = measure_column(measure);
    let mut entries: Vec<(f64, String)> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let lineno = i + 1;
        i += 1;
        if !line.starts_with(ENTRY_PREFIX) {
            continue;
        }
        let words: Vec<&str> = line.split('\t').collect();
        if words.len() < 9 {
            return Err(index_error(path, lineno, "entry has fewer than 9 fields"));
        }
        match RuleKind::from_header(words[1])? {
            RuleKind::Closed => {
                let score = parse_float(path, lineno, words[3 + column])?;
                entries.push((score, line.clone()));
            }
            RuleKind::Open => {
                let records = match lines.get(i) {
                    Some(next) if !next.starts_with(ENTRY_PREFIX) => {
                        i += 1;
                        next.as_str()
                    }
                    _ => "",
                };
                let summaries = records
                    .split('\t')
                    .filter(|r| !r.trim().is_empty())
                    .map(InsRuleSummary::parse_record)
                    .collect::<Result<Vec<_>, _>>()?;
                if summaries.is_empty() {
                    continue;
                }
                let score = summaries
                    .iter()
                    .map(|s| s.measures.quality(measure))
                    .sum::<f64>()
                    / summaries.len() as f64;
                let head: String = words[..9].join("\t");
                entries.push((score, format!("{head}\t{}\n{records}", format_measure(score))));
            }
        }
    }

    entries.sort_by(|a, b| descending(a.0, b.0));
    let count = entries.len();
    write_lines(path, &entries.into_iter().map(|(_, e)| e).collect::<Vec<_>>())?;
    Ok(count)
}

/// Re-sort a rules file descending by its quality column.
pub fn order_rule_file(path: &Path) -> Result<usize, MineError> {
    let lines = read_lines(path)?;
    let mut entries = Vec::with_capacity(lines.len());
    for (i, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let quality = match line.split('\t').nth(2) {
            Some(field) => parse_float(path, i + 1, field)?,
            None => return Err(index_error(path, i + 1, "rule line has no quality column")),
        };
        entries.push((quality, line));
    }
    entries.sort_by(|a, b| descending(a.0, b.0));
    let count = entries.len();
    write_lines(path, &entries.into_iter().map(|(_, l)| l).collect::<Vec<_>>())?;
    Ok(count)
}

// ============================================================================
// Reading
// ============================================================================

/// A template entry read back from a rule index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: u32,
    pub template: Template,
    pub measures: Measures,
    /// Empty for closed templates.
    pub ins_rules: Vec<InsRuleSummary>,
}

pub fn read_rule_index(path: &Path) -> Result<Vec<IndexEntry>, MineError> {
    let lines = read_lines(path)?;
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let lineno = i + 1;
        i += 1;
        let Some(rest) = line.strip_prefix(ENTRY_PREFIX) else {
            continue;
        };
        let words: Vec<&str> = rest.split('\t').collect();
        if words.len() < 9 {
            return Err(index_error(path, lineno, "entry has fewer than 9 fields"));
        }
        let id = words[0]
            .trim()
            .parse::<u32>()
            .map_err(|_| index_error(path, lineno, format!("bad entry id {:?}", words[0])))?;
        let template = Template::parse_line(rest)?;
        let mut columns = [0.0; 6];
        for (slot, field) in columns.iter_mut().zip(&words[3..9]) {
            *slot = parse_float(path, lineno, field)?;
        }

        let mut ins_rules = Vec::new();
        if !template.is_closed() {
            if let Some(next) = lines.get(i).filter(|l| !l.starts_with(ENTRY_PREFIX)) {
                i += 1;
                for record in next.split('\t').filter(|r| !r.trim().is_empty()) {
                    ins_rules.push(InsRuleSummary::parse_record(record)?);
                }
            }
        }

        out.push(IndexEntry {
            id,
            template,
            measures: Measures::from_columns(columns),
            ins_rules,
        });
    }
    Ok(out)
}
