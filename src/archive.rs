// src/archive.rs

//! Packaging and removal of run directories.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use tempfile::TempPath;
use tokio::sync::watch;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::engine::TaskState;
use crate::errors::{ProofrunError, Result};
use crate::runs::RunCatalog;
use crate::types::ArchiveFormat;

/// A built archive. The file is removed when `path` is dropped.
#[derive(Debug)]
pub struct RunArchive {
    pub run_name: String,
    pub format: ArchiveFormat,
    pub path: TempPath,
}

impl RunArchive {
    /// Download name, e.g. `<run>.tar.gz`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.run_name, self.format.extension())
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveService {
    catalog: RunCatalog,
    state: watch::Receiver<TaskState>,
}

impl ArchiveService {
    pub fn new(catalog: RunCatalog, state: watch::Receiver<TaskState>) -> Self {
        Self { catalog, state }
    }

    /// Pack a run directory into a temporary archive.
    ///
    /// Entries are rooted at `<run name>/`.
    pub async fn archive(&self, run_id: &str, format: ArchiveFormat) -> Result<RunArchive> {
        let run = self.catalog.get(run_id)?;
        let name = run.name.clone();

        let path = tokio::task::spawn_blocking(move || build_archive(&run.path, &run.name, format))
            .await
            .map_err(|e| ProofrunError::Other(anyhow::anyhow!("archive task failed: {e}")))??;

        info!(run_id = %name, format = %format, archive = ?path, "run archived");
        Ok(RunArchive {
            run_name: name,
            format,
            path,
        })
    }

    /// Remove a run directory.
    ///
    /// Refused while a task is live and `run_id` names the newest run, since
    /// that directory is still being written.
    pub fn delete(&self, run_id: &str) -> Result<()> {
        let run = self.catalog.get(run_id)?;

        if self.state.borrow().is_running() {
            let newest = self.catalog.latest()?;
            if newest.is_some_and(|n| n.name == run.name) {
                return Err(ProofrunError::Conflict(format!(
                    "run '{}' is in progress",
                    run.name
                )));
            }
        }

        self.catalog.remove(&run.path)?;
        info!(run_id = %run.name, "run deleted");
        Ok(())
    }
}

fn build_archive(dir: &Path, name: &str, format: ArchiveFormat) -> Result<TempPath> {
    let (file, path) = tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .suffix(format.extension())
        .tempfile()?
        .into_parts();
    let out = BufWriter::new(file);

    debug!(dir = ?dir, format = %format, "building archive");
    let out = match format {
        ArchiveFormat::Zip => write_zip(out, dir, name)?,
        ArchiveFormat::Tar => write_tar(out, dir, name)?,
        ArchiveFormat::Gztar => {
            let enc = flate2::write::GzEncoder::new(out, flate2::Compression::default());
            write_tar(enc, dir, name)?.finish()?
        }
        ArchiveFormat::Bztar => {
            let enc = bzip2::write::BzEncoder::new(out, bzip2::Compression::default());
            write_tar(enc, dir, name)?.finish()?
        }
        ArchiveFormat::Xztar => {
            let enc = xz2::write::XzEncoder::new(out, 6);
            write_tar(enc, dir, name)?.finish()?
        }
    };
    out.into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()?;

    Ok(path)
}

fn write_tar<W: Write>(out: W, dir: &Path, name: &str) -> io::Result<W> {
    let mut builder = tar::Builder::new(out);
    builder.follow_symlinks(false);
    builder.append_dir_all(name, dir)?;
    builder.into_inner()
}

fn write_zip<W: Write + io::Seek>(out: W, dir: &Path, name: &str) -> Result<W> {
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{name}/"), options)
        .context("adding zip root")?;
    add_zip_dir(&mut zip, dir, name, options)?;

    Ok(zip.finish().context("finishing zip")?)
}

fn add_zip_dir<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_name = entry.file_name();
        let entry_name = format!("{prefix}/{}", file_name.to_string_lossy());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            zip.add_directory(format!("{entry_name}/"), options)
                .with_context(|| format!("adding {entry_name}"))?;
            add_zip_dir(zip, &entry.path(), &entry_name, options)?;
        } else if file_type.is_file() {
            zip.start_file(entry_name.as_str(), options)
                .with_context(|| format!("adding {entry_name}"))?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, zip)?;
        } else {
            debug!(path = ?entry.path(), "skipping non-regular file");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Read;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::config::{ConfigFile, RawConfigFile};
    use crate::fs::RealFileSystem;

    struct Fixture {
        _dir: tempfile::TempDir,
        catalog: RunCatalog,
        state: watch::Sender<TaskState>,
        runs: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = RawConfigFile::default();
        raw.runner.proof_root = dir.path().to_path_buf();
        let cfg = ConfigFile::try_from(raw).unwrap();

        let runs = cfg.runs_root();
        for (run, started) in [("r1", "2024-01-01T00:00:00Z"), ("r2", "2024-01-02T00:00:00Z")] {
            let html = runs.join(run).join("html");
            std::fs::create_dir_all(html.join("proofs")).unwrap();
            std::fs::write(runs.join(run).join("run.json"), format!(r#"{{"start_time":"{started}"}}"#)).unwrap();
            std::fs::write(html.join("index.html"), "<html></html>").unwrap();
            std::fs::write(html.join("proofs/a.txt"), run).unwrap();
        }

        let catalog = RunCatalog::new(Arc::new(RealFileSystem), &cfg);
        let (state, _) = watch::channel(TaskState::Idle);
        Fixture {
            _dir: dir,
            catalog,
            state,
            runs,
        }
    }

    fn service(f: &Fixture) -> ArchiveService {
        ArchiveService::new(f.catalog.clone(), f.state.subscribe())
    }

    #[tokio::test]
    async fn zip_entries_are_rooted_at_run_name() {
        let f = fixture();
        let path = service(&f).archive("r1", ArchiveFormat::Zip).await.unwrap().path;

        let mut zip = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let names: BTreeSet<String> = zip.file_names().map(str::to_string).collect();
        assert!(names.contains("r1/run.json"));
        assert!(names.contains("r1/html/proofs/a.txt"));

        let mut body = String::new();
        zip.by_name("r1/html/proofs/a.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "r1");
    }

    #[tokio::test]
    async fn gztar_of_latest_contains_newest_run() {
        let f = fixture();
        let archive = service(&f)
            .archive("latest", ArchiveFormat::Gztar)
            .await
            .unwrap();
        assert_eq!(archive.file_name(), "r2.tar.gz");
        let path = archive.path;
        assert!(path.to_string_lossy().ends_with(".tar.gz"));

        let gz = flate2::read::GzDecoder::new(File::open(&path).unwrap());
        let mut archive = tar::Archive::new(gz);
        let names: BTreeSet<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains("r2/html/index.html"));
    }

    #[tokio::test]
    async fn dropping_temp_path_removes_archive() {
        let f = fixture();
        let path = service(&f).archive("r1", ArchiveFormat::Xztar).await.unwrap().path;
        let on_disk = path.to_path_buf();
        assert!(on_disk.exists());
        drop(path);
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn archive_of_unknown_run_is_not_found() {
        let f = fixture();
        let err = service(&f).archive("nope", ArchiveFormat::Tar).await.unwrap_err();
        assert!(matches!(err, ProofrunError::NotFound(_)));
    }

    #[test]
    fn delete_guards_newest_run_while_running() {
        let f = fixture();
        let svc = service(&f);
        f.state.send_replace(TaskState::Running {
            generation: 1,
            pid: None,
            started_at: Utc::now(),
        });

        assert!(matches!(svc.delete("r2"), Err(ProofrunError::Conflict(_))));
        assert!(matches!(svc.delete("latest"), Err(ProofrunError::Conflict(_))));
        svc.delete("r1").unwrap();
        assert!(!f.runs.join("r1").exists());

        f.state.send_replace(TaskState::Idle);
        svc.delete("r2").unwrap();
        assert!(!f.runs.join("r2").exists());
        assert!(matches!(svc.delete("r2"), Err(ProofrunError::NotFound(_))));
    }
}
