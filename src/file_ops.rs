//! Path-to-path wrapper around [`crate::reduce`] for the command line tool.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::config::{ReduceConfig, TargetSize};
use crate::reducer::{reduce, Reduction};

/// What happened to one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    pub target: u64,
    pub attempts: usize,
    pub final_quality: Option<u8>,
}

impl FileReport {
    pub fn target_met(&self) -> bool {
        self.final_size <= self.target
    }
}

/// Default output path: `<stem>_reduced.pdf` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_reduced.pdf"))
}

/// Reduce `input` and write the result to `output`.
///
/// The output is written to a temporary file in the same directory and
/// renamed into place, so a failed run never leaves a truncated PDF behind.
pub fn reduce_file(
    input: &Path,
    output: &Path,
    target: TargetSize,
    config: &ReduceConfig,
) -> Result<FileReport> {
    let source =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let reduction: Reduction = reduce(&source, target.bytes(), config)
        .with_context(|| format!("Failed to reduce {}", input.display()))?;

    write_atomically(output, &reduction.bytes)?;

    Ok(FileReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        original_size: source.len() as u64,
        final_size: reduction.size,
        target: reduction.target,
        attempts: reduction.attempts.len(),
        final_quality: reduction.final_quality(),
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(bytes).context("Failed to write PDF")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}
