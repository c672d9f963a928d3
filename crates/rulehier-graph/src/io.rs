//! Triple file reading.
//!
//! Files hold one fact per line, `subject<TAB>predicate<TAB>object`. Blank
//! lines are skipped; any other line without exactly three fields is an error.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A named fact as it appears in a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub sub: String,
    pub pred: String,
    pub obj: String,
}

impl Triple {
    pub fn new(sub: impl Into<String>, pred: impl Into<String>, obj: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            pred: pred.into(),
            obj: obj.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split('\t').map(str::trim);
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(sub), Some(pred), Some(obj), None)
                if !sub.is_empty() && !pred.is_empty() && !obj.is_empty() =>
            {
                Ok(Self::new(sub, pred, obj))
            }
            _ => Err(anyhow!("expected `subject<TAB>predicate<TAB>object`, got {line:?}")),
        }
    }
}

/// Read every triple of a dataset file.
pub fn read_triples(path: &Path) -> Result<Vec<Triple>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let triple = Triple::parse(&line)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        out.push(triple);
    }
    Ok(out)
}
