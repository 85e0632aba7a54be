//! Script source change detection
//!
//! Polls the script directory (non-recursive, `*.script.wat` only) and diffs
//! a `path -> mtime` cache to produce add/modify/remove events. Rapid
//! repeated writes inside one scan interval collapse into a single Modified
//! event; the registry's coalescing absorbs any duplicates that still get
//! through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// File suffix marking a script source
pub const SCRIPT_SUFFIX: &str = ".script.wat";

/// Default scan interval
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// What happened to a script source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One observed change to a script source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Returns true if the file name carries the script source suffix
pub fn is_script_source(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(SCRIPT_SUFFIX))
}

/// Derive the short label scripts are referred to by in logs and config
/// (`powerup_spawner.script.wat` -> `powerup_spawner`)
pub fn script_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(SCRIPT_SUFFIX).to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Scanner for detecting script source changes in one directory
pub struct ScriptScanner {
    script_dir: PathBuf,
    scan_interval: Duration,
    last_scan: Option<Instant>,
    cached_state: HashMap<PathBuf, SystemTime>,
}

impl ScriptScanner {
    /// Create a scanner with an empty cache: the first scan reports every
    /// existing script as Added, which is exactly the startup path.
    pub fn new(script_dir: PathBuf) -> Self {
        Self::with_interval(script_dir, DEFAULT_SCAN_INTERVAL)
    }

    pub fn with_interval(script_dir: PathBuf, scan_interval: Duration) -> Self {
        Self {
            script_dir,
            scan_interval,
            last_scan: None,
            cached_state: HashMap::new(),
        }
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Check if enough time has elapsed since the last scan
    pub fn should_scan(&self) -> bool {
        match self.last_scan {
            Some(last) => last.elapsed() >= self.scan_interval,
            None => true,
        }
    }

    /// Scan the directory and return changes since the previous scan.
    ///
    /// Events for one file are ordered by observation; across files the
    /// order is path-sorted so repeated runs behave the same.
    pub fn scan_changes(&mut self) -> Vec<ScriptChange> {
        self.last_scan = Some(Instant::now());

        let current_state = Self::scripts_in_dir(&self.script_dir);
        let mut changes = Vec::new();

        for (path, modified_time) in &current_state {
            match self.cached_state.get(path) {
                Some(cached_time) if cached_time != modified_time => {
                    debug!(target: "scripting", "script changed: {}", path.display());
                    changes.push(ScriptChange {
                        path: path.clone(),
                        kind: ChangeKind::Modified,
                    });
                }
                Some(_) => {}
                None => {
                    debug!(target: "scripting", "script added: {}", path.display());
                    changes.push(ScriptChange {
                        path: path.clone(),
                        kind: ChangeKind::Added,
                    });
                }
            }
        }

        for path in self.cached_state.keys() {
            if !current_state.contains_key(path) {
                debug!(target: "scripting", "script removed: {}", path.display());
                changes.push(ScriptChange {
                    path: path.clone(),
                    kind: ChangeKind::Removed,
                });
            }
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        self.cached_state = current_state;
        changes
    }

    /// Current script sources in the directory with their mtimes
    fn scripts_in_dir(script_dir: &Path) -> HashMap<PathBuf, SystemTime> {
        let mut scripts = HashMap::new();

        if !script_dir.exists() {
            debug!(
                target: "scripting",
                "script directory does not exist: {}",
                script_dir.display()
            );
            return scripts;
        }

        let entries = match std::fs::read_dir(script_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    target: "scripting",
                    "failed to read script directory {}: {}",
                    script_dir.display(),
                    e
                );
                return scripts;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_script_source(&path) {
                continue;
            }

            match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified_time) => {
                    scripts.insert(path, modified_time);
                }
                Err(e) => {
                    warn!(
                        target: "scripting",
                        "failed to read metadata for {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        scripts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_script(path: &Path) {
        let mut file = File::create(path).unwrap();
        file.write_all(b"(module)").unwrap();
    }

    #[test]
    fn label_strips_suffix() {
        assert_eq!(
            script_label(Path::new("/scripts/powerup_spawner.script.wat")),
            "powerup_spawner"
        );
    }

    #[test]
    fn first_scan_reports_existing_files_as_added() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("a.script.wat");
        write_script(&script);

        let mut scanner = ScriptScanner::new(dir.path().to_path_buf());
        let changes = scanner.scan_changes();
        assert_eq!(
            changes,
            vec![ScriptChange {
                path: script,
                kind: ChangeKind::Added,
            }]
        );

        assert!(scanner.scan_changes().is_empty());
    }

    #[test]
    fn detects_modification() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("a.script.wat");
        write_script(&script);

        let mut scanner = ScriptScanner::with_interval(
            dir.path().to_path_buf(),
            Duration::from_millis(1),
        );
        scanner.scan_changes();

        std::thread::sleep(Duration::from_millis(10));
        write_script(&script);

        let changes = scanner.scan_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn detects_removal() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("a.script.wat");
        write_script(&script);

        let mut scanner = ScriptScanner::new(dir.path().to_path_buf());
        scanner.scan_changes();

        fs::remove_file(&script).unwrap();
        let changes = scanner.scan_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn ignores_files_without_the_script_suffix() {
        let dir = TempDir::new().unwrap();
        write_script(&dir.path().join("notes.txt"));
        write_script(&dir.path().join("module.wat"));
        write_script(&dir.path().join("real.script.wat"));

        let mut scanner = ScriptScanner::new(dir.path().to_path_buf());
        let changes = scanner.scan_changes();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].path.ends_with("real.script.wat"));
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let mut scanner = ScriptScanner::new(PathBuf::from("/tmp/thicket_no_such_dir_1"));
        assert!(scanner.scan_changes().is_empty());
    }

    #[test]
    fn scan_interval_gates_rescans() {
        let dir = TempDir::new().unwrap();
        let mut scanner =
            ScriptScanner::with_interval(dir.path().to_path_buf(), Duration::from_millis(40));

        assert!(scanner.should_scan());
        scanner.scan_changes();
        assert!(!scanner.should_scan());

        std::thread::sleep(Duration::from_millis(50));
        assert!(scanner.should_scan());
    }
}
