//! The textual transition trace.
//!
//! Every capacity transition produces one line `"<simulatedSeconds>s: <event>: <value>"`, e.g.
//! `10s: switch to low bandwidth: 1Mbps`. Scenario checks read these lines, so the format is
//! part of the public surface.

use std::{
    fmt::{self, Display},
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::time::SimTime;

#[derive(Default)]
enum Sink {
    #[default]
    Disabled,
    Stdout,
    Memory(Vec<String>),
    Writer(Box<dyn Write + Send>),
}

/// A cloneable handle to a trace sink. Clones write to the same sink.
#[derive(Clone, Default)]
pub struct Trace {
    sink: Arc<Mutex<Sink>>,
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.sink.lock() {
            Sink::Disabled => "disabled",
            Sink::Stdout => "stdout",
            Sink::Memory(_) => "memory",
            Sink::Writer(_) => "writer",
        };
        f.debug_struct("Trace").field("sink", &kind).finish()
    }
}

impl Trace {
    fn with_sink(sink: Sink) -> Self {
        Self { sink: Arc::new(Mutex::new(sink)) }
    }

    /// A trace that discards every line.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A trace printing to standard output.
    pub fn stdout() -> Self {
        Self::with_sink(Sink::Stdout)
    }

    /// A trace buffering lines in memory, see [`Trace::lines`].
    pub fn memory() -> Self {
        Self::with_sink(Sink::Memory(Vec::new()))
    }

    /// A trace writing to an arbitrary writer, e.g. a file.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::with_sink(Sink::Writer(Box::new(writer)))
    }

    /// Records one transition.
    pub fn record(&self, at: SimTime, event: &str, value: impl Display) {
        tracing::debug!(%at, %value, "{event}");

        let line = format!("{at}: {event}: {value}");
        let result = match &mut *self.sink.lock() {
            Sink::Disabled => Ok(()),
            Sink::Stdout => writeln!(io::stdout().lock(), "{line}"),
            Sink::Memory(lines) => {
                lines.push(line);
                Ok(())
            }
            Sink::Writer(writer) => writeln!(writer, "{line}"),
        };

        if let Err(e) = result {
            tracing::warn!(?e, "failed to write trace line");
        }
    }

    /// Lines buffered so far. Empty unless created with [`Trace::memory`].
    pub fn lines(&self) -> Vec<String> {
        match &*self.sink.lock() {
            Sink::Memory(lines) => lines.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use linksim_common::DataRate;

    use super::*;

    #[test]
    fn memory_trace_formats_lines() {
        let trace = Trace::memory();
        let clone = trace.clone();

        trace.record(SimTime::from_secs(10), "switch to high bandwidth", DataRate::from_bps(10_000_000));
        clone.record(SimTime::from_millis(15_500), "switch to low bandwidth", "1Mbps");

        assert_eq!(
            trace.lines(),
            vec!["10s: switch to high bandwidth: 10Mbps", "15.5s: switch to low bandwidth: 1Mbps"]
        );
    }

    #[test]
    fn disabled_trace_keeps_nothing() {
        let trace = Trace::disabled();
        trace.record(SimTime::ZERO, "event", 1);
        assert!(trace.lines().is_empty());
    }
}
