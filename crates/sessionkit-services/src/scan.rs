//! Batch diagnosis of every project file under a directory

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::Sender;
use rayon::prelude::*;
use serde::Serialize;
use sessionkit_core::{Grade, HealthPolicy, HealthReport, ValidationReport};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::diagnose::diagnose;
use crate::error::{Result, ServiceError};

/// Directory name the DAW uses for automatic project backups
const BACKUP_DIR: &str = "Backup";

/// Which files a scan visits and which results it reports
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilters {
    /// Worker threads; 0 means one per available core
    pub jobs: usize,
    /// Lowercase extensions without the dot
    pub extensions: Vec<String>,
    pub recursive: bool,
    pub skip_backups: bool,
    /// Case-insensitive substring the file name must contain
    pub name_contains: Option<String>,
    /// Only report files graded this or worse (failed files are always reported)
    pub max_grade: Option<Grade>,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanFilters {
    fn from(config: &ScanConfig) -> Self {
        Self {
            jobs: config.jobs,
            extensions: config.extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            recursive: config.recursive,
            skip_backups: config.skip_backups,
            name_contains: None,
            max_grade: None,
        }
    }
}

impl ScanFilters {
    fn wants_file(&self, path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        let name_ok = match &self.name_contains {
            Some(needle) => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.to_lowercase().contains(&needle.to_lowercase())),
            None => true,
        };
        extension_ok && name_ok
    }

    fn wants_dir(&self, entry: &DirEntry) -> bool {
        !(self.skip_backups && entry.depth() > 0 && entry.file_name() == BACKUP_DIR)
    }

    fn reports(&self, report: &FileReport) -> bool {
        match (&report.health, self.max_grade) {
            (Some(health), Some(max)) => report.status == FileStatus::Error || health.grade >= max,
            _ => true,
        }
    }
}

/// Cooperative cancellation, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn failed(path: PathBuf, error: &ServiceError) -> Self {
        Self {
            path,
            status: FileStatus::Error,
            health: None,
            validation: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    /// Files matching the filters, whether or not they were scanned
    pub discovered: usize,
    pub files: Vec<FileReport>,
    pub cancelled: bool,
}

impl ScanOutcome {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }
}

/// Progress notifications sent while a scan runs
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started { total: usize },
    FileDone { path: PathBuf, status: FileStatus, done: usize, total: usize },
    Finished { scanned: usize, cancelled: bool },
}

/// Diagnose every matching file under `dir` on a worker pool.
///
/// A file that cannot be read or decoded becomes an `error` entry and the
/// batch continues. Reports come back in path order regardless of which
/// worker finished first.
pub fn scan(
    dir: &Path,
    filters: &ScanFilters,
    policy: &HealthPolicy,
    cancel: &CancellationToken,
    progress: Option<&Sender<ScanEvent>>,
) -> Result<ScanOutcome> {
    if !dir.is_dir() {
        return Err(ServiceError::Read {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let (paths, mut failures) = discover(dir, filters);
    let total = paths.len();
    info!(dir = %dir.display(), files = total, jobs = filters.jobs, "Scanning projects");
    notify(progress, ScanEvent::Started { total });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(filters.jobs)
        .build()
        .map_err(|e| ServiceError::Pool(e.to_string()))?;
    let done = AtomicUsize::new(0);

    let mut files: Vec<FileReport> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| {
                if cancel.is_cancelled() {
                    return None;
                }
                let report = scan_file(path, policy);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                notify(
                    progress,
                    ScanEvent::FileDone {
                        path: path.clone(),
                        status: report.status,
                        done: finished,
                        total,
                    },
                );
                Some(report)
            })
            .collect()
    });

    let cancelled = cancel.is_cancelled() && files.len() < total;
    let scanned = files.len();
    files.append(&mut failures);
    files.retain(|report| filters.reports(report));
    files.sort_by(|a, b| a.path.cmp(&b.path));

    notify(progress, ScanEvent::Finished { scanned, cancelled });
    if cancelled {
        warn!(scanned, total, "Scan cancelled");
    } else {
        info!(scanned, reported = files.len(), "Scan complete");
    }

    Ok(ScanOutcome {
        discovered: total,
        files,
        cancelled,
    })
}

/// Matching files in path order, plus entries for unreadable directory entries
fn discover(dir: &Path, filters: &ScanFilters) -> (Vec<PathBuf>, Vec<FileReport>) {
    let max_depth = if filters.recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    let mut failures = Vec::new();

    let walker = WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.file_type().is_dir() || filters.wants_dir(entry));
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && filters.wants_file(entry.path()) => {
                paths.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                if let Some(path) = e.path().map(Path::to_path_buf) {
                    let error = ServiceError::Io(e.into());
                    failures.push(FileReport::failed(path, &error));
                }
            }
        }
    }
    (paths, failures)
}

fn scan_file(path: &Path, policy: &HealthPolicy) -> FileReport {
    match diagnose(path, policy) {
        Ok(diagnosis) => {
            let status = if !diagnosis.validation.is_loadable() {
                FileStatus::Error
            } else if diagnosis.validation.warnings().next().is_some()
                || diagnosis.health.summary.critical > 0
            {
                FileStatus::Warning
            } else {
                FileStatus::Ok
            };
            FileReport {
                path: diagnosis.path,
                status,
                health: Some(diagnosis.health),
                validation: Some(diagnosis.validation),
                error: None,
            }
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Project failed to load");
            FileReport::failed(path.to_path_buf(), &e)
        }
    }
}

fn notify(progress: Option<&Sender<ScanEvent>>, event: ScanEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::fixtures;
    use sessionkit_core::TrackKind;

    /// root/{good.als, broken.als, notes.txt, Backup/old.als, sub/nested.als, sub/unloadable.als}
    fn project_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fixtures::write(root, "good.als", &fixtures::project());
        std::fs::write(root.join("broken.als"), b"\x1f\x8b garbage").unwrap();
        std::fs::write(root.join("notes.txt"), "not a project").unwrap();

        std::fs::create_dir(root.join("Backup")).unwrap();
        fixtures::write(&root.join("Backup"), "old.als", &fixtures::project());

        let sub = root.join("sub");
        std::fs::create_dir(&sub).unwrap();
        fixtures::write(&sub, "nested.als", &fixtures::project());

        let mut unloadable = fixtures::project();
        unloadable.add_track(TrackKind::Return, "Reverb").unwrap();
        let bass = unloadable.find_track_by_name("Bass", None).unwrap().id;
        unloadable.track_mut(bass).unwrap().mixer.sends.clear();
        fixtures::write(&sub, "unloadable.als", &unloadable);
        dir
    }

    fn names(outcome: &ScanOutcome, root: &Path) -> Vec<String> {
        outcome
            .files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn run(root: &Path, filters: &ScanFilters) -> ScanOutcome {
        scan(root, filters, &HealthPolicy::default(), &CancellationToken::new(), None).unwrap()
    }

    #[test]
    fn test_scan_reports_every_project_in_order() {
        let tree = project_tree();
        let outcome = run(tree.path(), &ScanFilters { jobs: 2, ..Default::default() });

        assert!(!outcome.cancelled);
        assert_eq!(outcome.discovered, 4);
        assert_eq!(
            names(&outcome, tree.path()),
            vec!["broken.als", "good.als", "sub/nested.als", "sub/unloadable.als"]
        );
        let status: Vec<_> = outcome.files.iter().map(|f| f.status).collect();
        assert_eq!(
            status,
            vec![FileStatus::Error, FileStatus::Ok, FileStatus::Ok, FileStatus::Error]
        );
        assert!(outcome.files[0].error.is_some());
        assert!(outcome.files[0].health.is_none());
        assert!(outcome.files[3].validation.as_ref().is_some_and(|v| !v.is_loadable()));
    }

    #[test]
    fn test_filters_narrow_the_walk() {
        let tree = project_tree();

        let shallow = run(tree.path(), &ScanFilters { recursive: false, ..Default::default() });
        assert_eq!(names(&shallow, tree.path()), vec!["broken.als", "good.als"]);

        let with_backups = run(tree.path(), &ScanFilters { skip_backups: false, ..Default::default() });
        assert_eq!(with_backups.discovered, 5);

        let named = run(
            tree.path(),
            &ScanFilters {
                name_contains: Some("NEST".into()),
                ..Default::default()
            },
        );
        assert_eq!(names(&named, tree.path()), vec!["sub/nested.als"]);

        let text = run(
            tree.path(),
            &ScanFilters {
                extensions: vec!["txt".into()],
                ..Default::default()
            },
        );
        assert_eq!(text.files.len(), 1);
        assert_eq!(text.files[0].status, FileStatus::Error);
    }

    #[test]
    fn test_max_grade_hides_healthy_files() {
        let tree = project_tree();
        let outcome = run(
            tree.path(),
            &ScanFilters {
                max_grade: Some(Grade::B),
                ..Default::default()
            },
        );
        // Healthy projects grade A; failures are always kept
        assert_eq!(outcome.discovered, 4);
        assert_eq!(
            names(&outcome, tree.path()),
            vec!["broken.als", "sub/unloadable.als"]
        );
    }

    #[test]
    fn test_cancelled_scan_returns_partial_outcome() {
        let tree = project_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = scan(
            tree.path(),
            &ScanFilters::default(),
            &HealthPolicy::default(),
            &cancel,
            None,
        )
        .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.discovered, 4);
    }

    #[test]
    fn test_progress_events() {
        let tree = project_tree();
        let (tx, rx) = crossbeam_channel::unbounded();
        scan(
            tree.path(),
            &ScanFilters::default(),
            &HealthPolicy::default(),
            &CancellationToken::new(),
            Some(&tx),
        )
        .unwrap();
        drop(tx);

        let events: Vec<ScanEvent> = rx.iter().collect();
        assert_eq!(events.first(), Some(&ScanEvent::Started { total: 4 }));
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Finished {
                scanned: 4,
                cancelled: false
            })
        );
        let mut done: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::FileDone { done, .. } => Some(*done),
                _ => None,
            })
            .collect();
        done.sort();
        assert_eq!(done, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(
            &dir.path().join("absent"),
            &ScanFilters::default(),
            &HealthPolicy::default(),
            &CancellationToken::new(),
            None,
        );
        assert!(matches!(result, Err(ServiceError::Read { .. })));
    }
}
