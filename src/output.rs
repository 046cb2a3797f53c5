use tracing::{debug, warn};

use std::{
    fs::{self, File},
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use crate::{pipeline::Period, Error, Metric, Result};

const PREFIX: &str = "Sales Ranking";

/// The directory a run's reports go in: `Sales Ranking - May 2025` under
/// `out`, or plain `Sales Ranking` if no period is known.
#[must_use]
pub fn report_dir(out: &Path, period: Option<Period>) -> PathBuf {
    match period {
        Some(period) => out.join(format!("{PREFIX} - {period}")),
        None => out.join(PREFIX),
    }
}

/// Creates the [`report_dir`] if it does not exist yet, and returns it.
///
/// # Errors
///
/// Returns any error from creating the directory.
pub fn create_report_dir(out: &Path, period: Option<Period>) -> Result<PathBuf> {
    let dir = report_dir(out, period);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[must_use]
pub fn metric_file_name(metric: Metric, period: Option<Period>, page_size: NonZeroUsize) -> String {
    match period {
        Some(period) => format!("{PREFIX} - {metric} - {period} - {page_size} per page.txt"),
        None => format!("{PREFIX} - {metric} - {page_size} per page.txt"),
    }
}

#[must_use]
pub fn summary_file_name(period: Option<Period>) -> String {
    match period {
        Some(period) => format!("{PREFIX} - General - {period}.txt"),
        None => format!("{PREFIX} - General.txt"),
    }
}

#[must_use]
pub fn workbook_file_name(period: Option<Period>) -> String {
    match period {
        Some(period) => format!("{PREFIX} - {period}.xlsx"),
        None => format!("{PREFIX}.xlsx"),
    }
}

/// Checks that the file system holding `dir` has at least `needed` bytes
/// free. A `needed` of 0 always passes.
///
/// Free space is only known on Unix; elsewhere the check passes.
///
/// # Errors
///
/// Returns [`Error::InsufficientSpace`] if less than `needed` is free, and any
/// error from querying the file system.
pub fn ensure_free_space(dir: &Path, needed: u64) -> Result<()> {
    if needed == 0 {
        return Ok(());
    }
    let Some(free) = available_space(dir)? else {
        return Ok(());
    };
    debug!(dir = %dir.display(), free, needed, "checked free space");
    if free < needed {
        return Err(Error::InsufficientSpace {
            path: dir.to_path_buf(),
            needed,
            free,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn available_space(dir: &Path) -> Result<Option<u64>> {
    let stat = rustix::fs::statvfs(dir).map_err(io::Error::from)?;
    Ok(Some(stat.f_bavail.saturating_mul(stat.f_frsize)))
}

#[cfg(not(unix))]
fn available_space(_dir: &Path) -> Result<Option<u64>> {
    Ok(None)
}

/// Writes the file at `path` through `write`, so that `path` only ever holds
/// complete output.
///
/// Any existing file at `path` is removed first. `write` gets a temporary
/// file, named `temp_...`, in the same directory; it is renamed to `path`
/// once `write` succeeds, and deleted if it fails.
///
/// # Errors
///
/// Returns [`Error::Locked`] if the existing file cannot be removed for lack
/// of permission (usually because another program has it open), and
/// otherwise any error from `write` or from the file system.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    remove_existing(path)?;
    let mut temp = tempfile::Builder::new().prefix("temp_").tempfile_in(dir)?;
    let written = write(temp.as_file_mut()).and_then(|()| Ok(temp.as_file().sync_all()?));
    match written {
        Ok(()) => {
            temp.persist(path).map_err(|e| e.error)?;
            debug!(path = %path.display(), "wrote output");
            Ok(())
        }
        Err(err) => {
            // dropping the temporary file deletes it
            drop(temp);
            if let Err(cleanup) = remove_existing(path) {
                warn!(path = %path.display(), "cleaning up failed output: {cleanup}");
            }
            Err(err)
        }
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(Error::Locked(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MAY_2025: Period = Period { month: 5, year: 2025 };

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn report_dir_fn_names_directory_after_period() {
        let out = Path::new("out");
        assert_eq!(report_dir(out, Some(MAY_2025)), Path::new("out/Sales Ranking - May 2025"));
        assert_eq!(report_dir(out, None), Path::new("out/Sales Ranking"));
    }

    #[test]
    fn file_name_fns_follow_the_report_naming_scheme() {
        let five = NonZeroUsize::new(5).unwrap();
        assert_eq!(
            metric_file_name(Metric::Tonnage, Some(MAY_2025), five),
            "Sales Ranking - Tonnage - May 2025 - 5 per page.txt"
        );
        assert_eq!(summary_file_name(Some(MAY_2025)), "Sales Ranking - General - May 2025.txt");
        assert_eq!(workbook_file_name(Some(MAY_2025)), "Sales Ranking - May 2025.xlsx");
        assert_eq!(workbook_file_name(None), "Sales Ranking.xlsx");
    }

    #[test]
    fn create_report_dir_fn_is_idempotent() {
        let out = tempfile::tempdir().unwrap();
        let first = create_report_dir(out.path(), Some(MAY_2025)).unwrap();
        let second = create_report_dir(out.path(), Some(MAY_2025)).unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn write_atomically_fn_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "old").unwrap();
        write_atomically(&path, |file| Ok(file.write_all(b"new")?)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(entries(dir.path()), ["report.txt"]);
    }

    #[test]
    fn write_atomically_fn_leaves_nothing_behind_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "old").unwrap();
        let err = write_atomically(&path, |file| {
            file.write_all(b"partial")?;
            Err(Error::UnknownMetric("boom".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::UnknownMetric(_)));
        assert!(entries(dir.path()).is_empty(), "{:?}", entries(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn write_atomically_fn_reports_a_file_it_cannot_replace_as_locked() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
        // root ignores directory permissions
        let writable = File::create(dir.path().join("check")).is_ok();
        let result = write_atomically(&path, |file| Ok(file.write_all(b"new")?));
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            return;
        }
        let err = result.unwrap_err();
        assert!(matches!(&err, Error::Locked(locked) if *locked == path), "{err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert_eq!(entries(dir.path()), ["report.txt"]);
    }

    #[test]
    fn ensure_free_space_fn_passes_with_no_threshold() {
        let dir = tempfile::tempdir().unwrap();
        ensure_free_space(dir.path(), 0).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn ensure_free_space_fn_fails_when_threshold_exceeds_free_space() {
        let dir = tempfile::tempdir().unwrap();
        ensure_free_space(dir.path(), 1).unwrap();
        let err = ensure_free_space(dir.path(), u64::MAX).unwrap_err();
        match err {
            Error::InsufficientSpace { path, needed, free } => {
                assert_eq!(path, dir.path());
                assert_eq!(needed, u64::MAX);
                assert!(free < needed);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
