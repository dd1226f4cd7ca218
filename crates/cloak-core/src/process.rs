use std::collections::BTreeSet;

use crate::{CloakResult, log_warn};

/// Extension appended to process-name queries that lack one.
pub const DEFAULT_EXTENSION: &str = ".exe";

/// One row of a process snapshot. Never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Executable base name, e.g. `notepad.exe`.
    pub exe_name: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, exe_name: impl Into<String>) -> Self {
        Self {
            pid,
            exe_name: exe_name.into(),
        }
    }
}

/// An opaque top-level window handle (pointer-sized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub usize);

/// Read-only view of the OS process and window tables.
pub trait ProcessInspector {
    /// Takes a fresh snapshot of running processes.
    fn list_processes(&self) -> CloakResult<Vec<ProcessRecord>>;

    /// Returns the visible top-level windows owned by `pid`, in OS
    /// enumeration order.
    fn visible_windows(&self, pid: u32) -> Vec<WindowHandle>;

    /// Case-insensitive exact match against executable names.
    fn is_process_running(&self, exe_name: &str) -> bool {
        is_running(&self.snapshot(), exe_name)
    }

    /// Permissive lookup: see [`matching_pids`].
    fn find_process_ids(&self, name: &str) -> BTreeSet<u32> {
        matching_pids(&self.snapshot(), name)
    }

    /// Returns the first process whose name contains any of `patterns`.
    fn find_running(&self, patterns: &[String]) -> Option<ProcessRecord> {
        first_containing(&self.snapshot(), patterns).cloned()
    }

    /// Snapshot that degrades to empty on failure.
    fn snapshot(&self) -> Vec<ProcessRecord> {
        self.list_processes().unwrap_or_else(|e| {
            log_warn!("Process enumeration failed: {e}");
            Vec::new()
        })
    }
}

/// Lower-cases a query and appends `.exe` when it has no extension.
pub fn normalize_query(name: &str) -> String {
    let mut lower = name.trim().to_lowercase();
    if !lower.contains(DEFAULT_EXTENSION) {
        lower.push_str(DEFAULT_EXTENSION);
    }
    lower
}

/// Case-insensitive exact match on the executable name.
pub fn is_running(processes: &[ProcessRecord], exe_name: &str) -> bool {
    let wanted = exe_name.to_lowercase();
    processes
        .iter()
        .any(|p| p.exe_name.to_lowercase() == wanted)
}

/// Pids whose executable name contains the normalized query.
///
/// Substring containment is deliberate: a partial name like `"pad"`
/// locates `notepad.exe`. It also hits unrelated executables that end in
/// the query, e.g. `mynotepad.exe` for `"notepad"`.
pub fn matching_pids(processes: &[ProcessRecord], name: &str) -> BTreeSet<u32> {
    let query = normalize_query(name);
    processes
        .iter()
        .filter(|p| p.exe_name.to_lowercase().contains(&query))
        .map(|p| p.pid)
        .collect()
}

/// First process whose name contains any pattern, case-insensitively.
pub fn first_containing<'a>(
    processes: &'a [ProcessRecord],
    patterns: &[String],
) -> Option<&'a ProcessRecord> {
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    processes.iter().find(|p| {
        let name = p.exe_name.to_lowercase();
        patterns.iter().any(|pat| name.contains(pat.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<ProcessRecord> {
        vec![
            ProcessRecord::new(4, "System"),
            ProcessRecord::new(100, "notepad.exe"),
            ProcessRecord::new(101, "Notepad.exe"),
            ProcessRecord::new(200, "notepad2.exe"),
            ProcessRecord::new(300, "explorer.exe"),
            ProcessRecord::new(400, "Cloak-Setup-2.1.exe"),
        ]
    }

    #[test]
    fn query_gets_default_extension() {
        assert_eq!(normalize_query("Notepad"), "notepad.exe");
        assert_eq!(normalize_query("Notepad.EXE"), "notepad.exe");
    }

    #[test]
    fn find_ignores_case_and_extension() {
        // Arrange
        let processes = table();

        // Act
        let bare = matching_pids(&processes, "notepad");
        let full = matching_pids(&processes, "Notepad.exe");

        // Assert
        assert_eq!(bare, full);
        assert!(bare.contains(&100));
        assert!(bare.contains(&101));
    }

    #[test]
    fn find_is_substring_based() {
        // The appended extension anchors the match at the end of the name.
        let pids = matching_pids(&table(), "pad");
        assert_eq!(pids, BTreeSet::from([100, 101]));
    }

    #[test]
    fn find_unknown_name_is_empty() {
        assert!(matching_pids(&table(), "calc").is_empty());
    }

    #[test]
    fn running_check_is_exact_but_case_insensitive() {
        let processes = table();

        assert!(is_running(&processes, "EXPLORER.EXE"));
        assert!(!is_running(&processes, "explorer"));
        assert!(!is_running(&processes, "plorer.exe"));
    }

    #[test]
    fn installer_patterns_match_by_substring() {
        // Arrange
        let patterns = vec!["cloak-setup".to_string(), "cloak_update".to_string()];

        let processes = table();

        // Act
        let found = first_containing(&processes, &patterns);

        // Assert
        assert_eq!(found.map(|p| p.pid), Some(400));
    }

    #[test]
    fn no_installer_running() {
        let patterns = vec!["cloak_update".to_string()];
        assert!(first_containing(&table(), &patterns).is_none());
    }
}
