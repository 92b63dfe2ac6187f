use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::collector::ElementDescriptor;
use crate::error::{Error, Result};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `data` as pretty-printed JSON to `path`, replacing any existing file.
///
/// The document is written to a sibling temp file first and renamed into
/// place, so readers never see a half-written file.
pub fn persist<T>(data: &T, path: impl AsRef<Path>) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let path = path.as_ref();
    let io_err = |source: std::io::Error| Error::IoWriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut bytes = serde_json::to_vec_pretty(data).map_err(|e| io_err(e.into()))?;
    bytes.push(b'\n');

    let tmp = temp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    tracing::info!(path = %path.display(), bytes = bytes.len(), "results saved");
    Ok(())
}

/// Print collected elements to stdout. Never fails the run.
pub fn report_elements(elements: &[ElementDescriptor]) {
    report_elements_to(std::io::stdout().lock(), elements);
}

/// Write the element summary to `out`. Write errors (a closed pipe, say) are
/// logged and otherwise ignored.
pub fn report_elements_to<W: Write>(mut out: W, elements: &[ElementDescriptor]) {
    if let Err(e) = write_elements(&mut out, elements) {
        tracing::warn!(error = %e, "could not write element report");
    }
}

fn write_elements<W: Write>(out: &mut W, elements: &[ElementDescriptor]) -> std::io::Result<()> {
    writeln!(out, "Extracted {} clickable elements:", elements.len())?;
    for el in elements {
        let mut line = format!("  <{}>", el.tag_name);
        if let Some(ref id) = el.id {
            line.push_str(&format!(" #{id}"));
        }
        if let Some(ref class) = el.class_name {
            line.push_str(&format!(" .{}", class.split_whitespace().collect::<Vec<_>>().join(".")));
        }
        if let Some(ref text) = el.text {
            line.push_str(&format!(" \"{}\"", truncate(text, 60)));
        }
        if let Some(ref href) = el.href {
            line.push_str(&format!(" -> {href}"));
        }
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Print any serializable result to stdout. Never fails the run.
pub fn report<T>(label: &str, data: &T)
where
    T: Serialize + ?Sized,
{
    report_to(std::io::stdout().lock(), label, data);
}

/// Write a labelled, pretty-printed result to `out`, logging any failure.
pub fn report_to<W, T>(mut out: W, label: &str, data: &T)
where
    W: Write,
    T: Serialize + ?Sized,
{
    let json = match serde_json::to_string_pretty(data) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "could not render result for report");
            return;
        }
    };
    if let Err(e) = writeln!(out, "{label}:\n{json}").and_then(|_| out.flush()) {
        tracing::warn!(error = %e, "could not write result report");
    }
}

/// Print a one-line status message to stdout, logging any write failure.
pub fn announce(message: &str) {
    let mut out = std::io::stdout().lock();
    if let Err(e) = writeln!(out, "{message}").and_then(|_| out.flush()) {
        tracing::warn!(error = %e, "could not write to stdout");
    }
}

fn truncate(text: &str, max: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let head: String = single_line.chars().take(max).collect();
        format!("{head}…")
    }
}
