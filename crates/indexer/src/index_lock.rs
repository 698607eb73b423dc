use crate::{IndexerError, Result};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const JOB_LOCK_FILE_NAME: &str = "jobs.lock";

/// Serializes batch jobs (embedding, backfill) over one data directory.
pub(crate) struct JobLock {
    file: std::fs::File,
    waited_ms: u64,
}

impl JobLock {
    pub(crate) const fn waited_ms(&self) -> u64 {
        self.waited_ms
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path_for_data_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(JOB_LOCK_FILE_NAME)
}

pub(crate) fn acquire_job_lock(data_dir: &Path) -> Result<JobLock> {
    use std::fs::OpenOptions;

    let path = lock_path_for_data_dir(data_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|err| IndexerError::Other(format!("open job lock {}: {err}", path.display())))?;

    let start = Instant::now();
    file.lock_exclusive().map_err(|err| {
        IndexerError::Other(format!("acquire job lock {}: {err}", path.display()))
    })?;
    let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    if waited_ms > 0 {
        log::debug!("Waited {waited_ms}ms for job lock {}", path.display());
    }

    Ok(JobLock { file, waited_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        {
            let _lock = acquire_job_lock(&data_dir).unwrap();
            assert!(data_dir.join(JOB_LOCK_FILE_NAME).exists());
        }
        let again = acquire_job_lock(&data_dir).unwrap();
        assert!(again.waited_ms() < 1_000);
    }
}
