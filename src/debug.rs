use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One value in a trace record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Field<'a> {
    Text(&'a str),
    Count(u64),
    Flag(bool),
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(value: &'a str) -> Self {
        Field::Text(value)
    }
}

impl From<usize> for Field<'_> {
    fn from(value: usize) -> Self {
        Field::Count(value as u64)
    }
}

impl From<bool> for Field<'_> {
    fn from(value: bool) -> Self {
        Field::Flag(value)
    }
}

/// JSON-lines trace of sheet parsing, cascade queries, sync passes and
/// edits. Every record carries a sequence number and a `type`; named
/// counters are written out as one `debug.summary` record.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<TraceState>>,
}

struct TraceState {
    out: BufWriter<File>,
    seq: u64,
    counters: BTreeMap<String, u64>,
}

impl TraceState {
    fn write_record(&mut self, kind: &str, body: &str) {
        self.seq += 1;
        let line = format!("{{\"seq\":{},\"type\":{}{}}}", self.seq, quoted(kind), body);
        if let Err(err) = writeln!(self.out, "{line}") {
            log::debug!("debug trace write failed: {}", err);
        }
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(TraceState {
                out: BufWriter::new(file),
                seq: 0,
                counters: BTreeMap::new(),
            })),
        })
    }

    pub fn event(&self, kind: &str, fields: &[(&str, Field<'_>)]) {
        let mut body = String::new();
        for (key, value) in fields {
            body.push(',');
            body.push_str(&quoted(key));
            body.push(':');
            match value {
                Field::Text(text) => body.push_str(&quoted(text)),
                Field::Count(count) => body.push_str(&count.to_string()),
                Field::Flag(flag) => body.push_str(if *flag { "true" } else { "false" }),
            }
        }
        if let Ok(mut state) = self.inner.lock() {
            state.write_record(kind, &body);
        }
    }

    pub fn count(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the counters gathered since the last summary and resets them.
    pub fn summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let counts = counters
                .iter()
                .map(|(key, value)| format!("{}:{}", quoted(key), value))
                .collect::<Vec<_>>()
                .join(",");
            let body = format!(",\"context\":{},\"counts\":{{{}}}", quoted(context), counts);
            state.write_record("debug.summary", &body);
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if let Err(err) = state.out.flush() {
                log::debug!("debug trace flush failed: {}", err);
            }
        }
    }
}

/// `raw` as a JSON string literal.
fn quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", ch as u32)),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
