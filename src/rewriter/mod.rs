//! Schema rewriting for SQL dumps
//!
//! A dump taken with `--quote-all-identifiers` qualifies every object with
//! the quoted namespace, e.g. `CREATE TABLE "acme".`. Restoring into another
//! namespace means substituting the quoted source name for the quoted target
//! name inside a fixed set of statement prefixes. Identifiers that merely
//! contain the source name, and text outside those prefixes, are left alone.
//!
//! Two strategies produce byte-identical output:
//!
//! - [`SchemaRewriter::rewrite_str`] replaces over the whole text in memory
//! - [`SchemaRewriter::rewrite_stream`] works line by line with bounded memory
//!
//! No template contains a newline, so a match never spans two lines and the
//! streaming pass sees exactly the matches the whole-text pass sees.
//!
//! Rewriting is never an error: a source namespace absent from the dump
//! yields the dump unchanged.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Statement prefixes that carry a schema-qualified identifier in a
/// PostgreSQL dump. `{}` stands for the quoted namespace name.
pub const QUALIFIED_PREFIXES: &[&str] = &[
    "CREATE SCHEMA {}",
    "ALTER SCHEMA {}",
    "CREATE TABLE {}.",
    "OWNED BY {}.",
    "SET DEFAULT \"nextval\"('{}.",
    "COPY {}.",
    "pg_catalog.setval('{}.",
    "ON {}.",
    "CREATE SEQUENCE {}.",
    "ALTER SEQUENCE {}.",
    "ALTER TABLE {}.",
    "ALTER TABLE ONLY {}.",
    "REFERENCES {}.",
];

/// Renders `template` for `namespace`.
fn render(template: &str, namespace: &str) -> String {
    template.replace("{}", &format!("\"{}\"", namespace))
}

/// Rewrites schema-qualified identifiers from one namespace to another
#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    quoted_source: String,
    replacements: Vec<(String, String)>,
}

impl SchemaRewriter {
    /// Create a rewriter substituting `source` with `target`
    pub fn new(source: &str, target: &str) -> Self {
        let replacements = QUALIFIED_PREFIXES
            .iter()
            .map(|template| (render(template, source), render(template, target)))
            .collect();

        Self {
            quoted_source: format!("\"{}\"", source),
            replacements,
        }
    }

    /// True when source and target are the same namespace
    pub fn is_identity(&self) -> bool {
        self.replacements.iter().all(|(from, to)| from == to)
    }

    /// Rewrite a single line (or any text without a line break)
    pub fn rewrite_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        // fast path: blank lines, `--` comments and most data rows never
        // mention the quoted source name
        if self.is_identity() || !line.contains(&self.quoted_source) {
            return Cow::Borrowed(line);
        }

        let mut out = Cow::Borrowed(line);
        for (from, to) in &self.replacements {
            if out.contains(from.as_str()) {
                out = Cow::Owned(out.replace(from.as_str(), to));
            }
        }
        out
    }

    /// Whole-text strategy
    pub fn rewrite_str(&self, dump: &str) -> String {
        if self.is_identity() {
            return dump.to_string();
        }

        let mut out = dump.to_string();
        for (from, to) in &self.replacements {
            out = out.replace(from.as_str(), to);
        }
        out
    }

    /// Streaming strategy. Returns the number of rewritten occurrences.
    ///
    /// Lines are split on `\n` and written back with their original
    /// terminators, so line endings survive untouched.
    pub fn rewrite_stream<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        writer: &mut W,
    ) -> io::Result<usize> {
        let mut rewritten = 0;
        let mut buf = Vec::with_capacity(8 * 1024);

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            let line = std::str::from_utf8(&buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let out = self.rewrite_line(line);
            if let Cow::Owned(_) = out {
                rewritten += self.count_source(line);
            }
            writer.write_all(out.as_bytes())?;
        }

        writer.flush()?;
        Ok(rewritten)
    }

    /// Rewrite a dump file in place. Returns the number of rewritten
    /// occurrences.
    ///
    /// The output is streamed to a sibling file which then replaces the
    /// original, so a failed rewrite never leaves a half-written dump.
    pub fn rewrite_file(&self, path: &Path) -> io::Result<usize> {
        if self.is_identity() {
            return Ok(0);
        }

        let staged = path.with_extension("rewrite");
        let result = (|| -> io::Result<usize> {
            let reader = BufReader::new(File::open(path)?);
            let mut writer = BufWriter::new(File::create(&staged)?);
            let count = self.rewrite_stream(reader, &mut writer)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(count)
        })();

        match result {
            Ok(count) => {
                fs::rename(&staged, path)?;
                Ok(count)
            }
            Err(e) => {
                let _ = fs::remove_file(&staged);
                Err(e)
            }
        }
    }

    fn count_source(&self, text: &str) -> usize {
        self.replacements
            .iter()
            .map(|(from, _)| text.matches(from.as_str()).count())
            .sum()
    }
}

/// Count occurrences of every qualified prefix for `namespace` in `text`
pub fn count_qualified(text: &str, namespace: &str) -> usize {
    QUALIFIED_PREFIXES
        .iter()
        .map(|template| text.matches(render(template, namespace).as_str()).count())
        .sum()
}
