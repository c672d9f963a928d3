//! Rule writers: bounded line queues drained into append-only files.

use crate::error::MineError;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

/// Producer end of a rule writer queue. Sending blocks while the queue is full.
#[derive(Debug, Clone)]
pub struct RuleSink {
    path: Arc<PathBuf>,
    tx: SyncSender<String>,
}

impl RuleSink {
    pub fn send(&self, line: String) -> Result<(), MineError> {
        self.tx
            .send(line)
            .map_err(|_| MineError::WriterClosed(self.path.as_ref().clone()))
    }
}

/// Consumer end: appends every received line to one file.
///
/// Runs until every [`RuleSink`] has been dropped and the queue is empty.
#[derive(Debug)]
pub struct RuleWriter {
    path: PathBuf,
    rx: Receiver<String>,
}

impl RuleWriter {
    pub fn channel(path: impl Into<PathBuf>, capacity: usize) -> (RuleSink, RuleWriter) {
        let path = path.into();
        let (tx, rx) = mpsc::sync_channel(capacity);
        (
            RuleSink {
                path: Arc::new(path.clone()),
                tx,
            },
            RuleWriter { path, rx },
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain the queue into the file; returns the number of lines written.
    pub fn run(self) -> Result<usize, MineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MineError::io(&self.path, e))?;
        let mut out = BufWriter::new(file);
        let mut written = 0;
        for line in self.rx.iter() {
            writeln!(out, "{line}").map_err(|e| MineError::io(&self.path, e))?;
            written += 1;
        }
        out.flush().map_err(|e| MineError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), lines = written, "rule writer finished");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_drains_after_producers_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.txt");
        let (sink, writer) = RuleWriter::channel(&path, 1);

        let written = std::thread::scope(|scope| {
            let handle = scope.spawn(|| writer.run());
            for producer in 0..3 {
                let sink = sink.clone();
                scope.spawn(move || {
                    for i in 0..10 {
                        sink.send(format!("{producer}-{i}")).unwrap();
                    }
                });
            }
            drop(sink);
            handle.join().unwrap()
        });

        assert_eq!(written.unwrap(), 30);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 30);
    }

    #[test]
    fn send_fails_once_writer_is_gone() {
        let (sink, writer) = RuleWriter::channel("unused.txt", 4);
        drop(writer);
        assert!(matches!(
            sink.send("x".into()),
            Err(MineError::WriterClosed(_))
        ));
    }
}
