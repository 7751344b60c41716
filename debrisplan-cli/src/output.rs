//! Numbered output files that never overwrite earlier runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Upper bound on run numbers tried before giving up.
const MAX_RUNS: usize = 100_000;

/// First run number `n >= 1` for which none of `{stem}_{n}.{ext}` exists in `dir`.
pub fn next_run(dir: &Path, names: &[(&str, &str)]) -> Result<usize> {
    for run in 1..=MAX_RUNS {
        let taken = names
            .iter()
            .any(|(stem, ext)| numbered(dir, stem, run, ext).exists());
        if !taken {
            return Ok(run);
        }
    }
    bail!("no free run number below {MAX_RUNS} in {}", dir.display())
}

/// `{dir}/{stem}_{run}.{ext}`.
pub fn numbered(dir: &Path, stem: &str, run: usize, ext: &str) -> PathBuf {
    dir.join(format!("{stem}_{run}.{ext}"))
}

/// Write `contents` to a file that must not exist yet.
pub fn write_new(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let mut file: File = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => {
                anyhow::anyhow!("{} appeared while writing, refusing to overwrite", path.display())
            }
            _ => anyhow::Error::new(err).context(format!("creating {}", path.display())),
        })?;
    file.write_all(contents)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
