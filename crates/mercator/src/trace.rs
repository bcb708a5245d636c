//! Per-request debug trace.
//!
//! Components receive a `&dyn SearchTrace` and report their intermediate state to it.
//! [`NoopTrace`] discards everything, [`TracingTrace`] forwards to `tracing` debug events
//! and [`TextTrace`] collects a plain-text report.

use std::{
    fmt::{self, Write as _},
    sync::Mutex,
};

use tracing::debug;

pub trait SearchTrace: Send + Sync {
    /// Whether reports are recorded at all. Callers skip building expensive reports
    /// when this is false.
    fn is_enabled(&self) -> bool {
        false
    }

    fn section(&self, _heading: &str) {}

    fn comment(&self, _text: &str) {}

    fn var_dump(&self, _heading: &str, _value: &dyn fmt::Debug) {}

    fn table_dump(&self, _heading: &str, _rows: &[Vec<String>]) {}

    /// Results as `(ranking, description)` pairs.
    fn result_dump(&self, _heading: &str, _results: &[(f64, String)]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrace;

impl SearchTrace for NoopTrace {}

pub(crate) static NOOP_TRACE: NoopTrace = NoopTrace;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTrace;

impl SearchTrace for TracingTrace {
    fn is_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }

    fn section(&self, heading: &str) {
        debug!(section = heading, "trace");
    }

    fn comment(&self, text: &str) {
        debug!("{text}");
    }

    fn var_dump(&self, heading: &str, value: &dyn fmt::Debug) {
        debug!(heading, value = ?value);
    }

    fn table_dump(&self, heading: &str, rows: &[Vec<String>]) {
        for row in rows {
            debug!(heading, row = %row.join(" | "));
        }
    }

    fn result_dump(&self, heading: &str, results: &[(f64, String)]) {
        for (ranking, description) in results {
            debug!(heading, ranking, "{description}");
        }
    }
}

/// Collects the trace as text.
#[derive(Debug, Default)]
pub struct TextTrace {
    buffer: Mutex<String>,
}

impl TextTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The report so far.
    pub fn get_buffer(&self) -> String {
        self.buffer
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn write(&self, f: impl FnOnce(&mut String) -> fmt::Result) {
        let mut guard = self
            .buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Writing to a String cannot fail.
        let _ = f(&mut guard);
    }
}

impl SearchTrace for TextTrace {
    fn is_enabled(&self) -> bool {
        true
    }

    fn section(&self, heading: &str) {
        self.write(|b| writeln!(b, "\n# {heading}\n"));
    }

    fn comment(&self, text: &str) {
        self.write(|b| writeln!(b, "{text}"));
    }

    fn var_dump(&self, heading: &str, value: &dyn fmt::Debug) {
        self.write(|b| writeln!(b, "{heading}:\n  {value:?}"));
    }

    fn table_dump(&self, heading: &str, rows: &[Vec<String>]) {
        self.write(|b| {
            writeln!(b, "{heading}:")?;
            for row in rows {
                writeln!(b, "  {}", row.join(" | "))?;
            }
            Ok(())
        });
    }

    fn result_dump(&self, heading: &str, results: &[(f64, String)]) {
        self.write(|b| {
            writeln!(b, "{heading}:")?;
            for (ranking, description) in results {
                writeln!(b, "  [{ranking:.3}] {description}")?;
            }
            Ok(())
        });
    }
}
