//! Cross-process capture-exclusion control.
//!
//! The display affinity of a window can only be changed from a thread of
//! the process that owns it. The controller therefore loads the capability
//! module into each target once, then starts a remote thread at the
//! module's "hide all windows of this process" entry point.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::process::ProcessInspector;
use crate::{CloakResult, ProcessRecord, WindowHandle, log_error, log_info, log_warn};

/// Base address of the capability module inside a target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteModule {
    pub base: usize,
}

impl RemoteModule {
    /// Address of an export at `offset` bytes past the module base.
    ///
    /// Offsets are layout-independent: the local and the remote copy are
    /// the same file.
    pub fn entry_at(self, offset: usize) -> Option<usize> {
        self.base.checked_add(offset)
    }
}

/// Platform primitive for running the capability module inside another
/// process.
pub trait InjectionBackend {
    /// Loads `module` into `pid` and returns its base address there.
    fn load_module(&self, pid: u32, module: &Path) -> CloakResult<RemoteModule>;

    /// Runs the module's hide-all entry point inside `pid` and returns the
    /// number of windows it toggled.
    fn invoke_hide_all(
        &self,
        pid: u32,
        remote: RemoteModule,
        module: &Path,
        hide: bool,
    ) -> CloakResult<u32>;
}

/// Backend for platforms without a cross-process injection primitive.
///
/// Sees no processes and refuses every injection.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl ProcessInspector for UnsupportedBackend {
    fn list_processes(&self) -> CloakResult<Vec<ProcessRecord>> {
        Ok(Vec::new())
    }

    fn visible_windows(&self, _pid: u32) -> Vec<WindowHandle> {
        Vec::new()
    }
}

impl InjectionBackend for UnsupportedBackend {
    fn load_module(&self, _pid: u32, _module: &Path) -> CloakResult<RemoteModule> {
        Err("window capture exclusion is not supported on this platform".into())
    }

    fn invoke_hide_all(
        &self,
        _pid: u32,
        _remote: RemoteModule,
        _module: &Path,
        _hide: bool,
    ) -> CloakResult<u32> {
        Err("window capture exclusion is not supported on this platform".into())
    }
}

/// Tracks which processes are hidden and where the module was injected.
///
/// Methods take `&mut self`; callers sharing one controller across
/// threads must wrap it in a single `Mutex`, because map updates and
/// remote calls are not atomic together.
pub struct VisibilityController<B> {
    backend: B,
    module_path: Option<PathBuf>,
    /// pid -> module base inside that process. Dropped when a remote call
    /// fails, otherwise kept until `restore_all`.
    injected: HashMap<u32, RemoteModule>,
    /// lower-cased process name -> currently hidden.
    hidden: BTreeMap<String, bool>,
}

impl<B: ProcessInspector + InjectionBackend> VisibilityController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            module_path: None,
            injected: HashMap::new(),
            hidden: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verifies the capability module exists. Loads nothing yet.
    pub fn initialize(&mut self, module_path: &Path) -> bool {
        if !module_path.is_file() {
            log_error!("Payload module not found: {}", module_path.display());
            return false;
        }
        self.module_path = Some(module_path.to_path_buf());
        log_info!("Visibility controller initialized with {}", module_path.display());
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.module_path.is_some()
    }

    /// Hides (or shows) the windows of every process matching `name`.
    ///
    /// Returns the number of processes affected. The hidden state is only
    /// recorded when at least one process was affected.
    pub fn hide_process_windows(&mut self, name: &str, hide: bool) -> u32 {
        let Some(module) = self.module_path.clone() else {
            log_warn!("Visibility controller used before initialization");
            return 0;
        };

        let pids = self.backend.find_process_ids(name);
        if pids.is_empty() {
            log_info!("No running process matches '{name}'");
        }

        let affected = pids
            .into_iter()
            .filter(|&pid| self.apply_to_pid(pid, &module, hide))
            .count() as u32;

        if affected > 0 {
            self.hidden.insert(name.to_lowercase(), hide);
        }
        affected
    }

    /// Applies [`hide_process_windows`](Self::hide_process_windows) to each
    /// name and sums the results.
    pub fn hide_multiple_processes<S: AsRef<str>>(&mut self, names: &[S], hide: bool) -> u32 {
        names
            .iter()
            .map(|n| self.hide_process_windows(n.as_ref(), hide))
            .sum()
    }

    pub fn is_process_hidden(&self, name: &str) -> bool {
        self.hidden
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    /// Names currently flagged hidden, in sorted order.
    pub fn hidden_processes(&self) -> Vec<String> {
        self.hidden
            .iter()
            .filter(|(_, hidden)| **hidden)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Shows every process still flagged hidden, then forgets all state.
    pub fn restore_all(&mut self) {
        for name in self.hidden_processes() {
            self.hide_process_windows(&name, false);
        }
        self.hidden.clear();
        self.injected.clear();
    }

    fn apply_to_pid(&mut self, pid: u32, module: &Path, hide: bool) -> bool {
        let windows = self.backend.visible_windows(pid);
        if windows.is_empty() {
            log_info!("No visible windows found for PID {pid}");
            return false;
        }
        log_info!(
            "Found {} windows for PID {pid} (first 0x{:X}), toggling capture exclusion",
            windows.len(),
            windows[0].0
        );

        let Some(remote) = self.ensure_injected(pid, module) else {
            return false;
        };

        match self.backend.invoke_hide_all(pid, remote, module, hide) {
            Ok(count) => {
                log_info!("Remote call in PID {pid} completed, windows affected: {count}");
                count > 0
            }
            Err(e) => {
                log_error!("Remote call in PID {pid} failed: {e}");
                // The process may have exited and its pid been reused.
                self.injected.remove(&pid);
                false
            }
        }
    }

    fn ensure_injected(&mut self, pid: u32, module: &Path) -> Option<RemoteModule> {
        if let Some(remote) = self.injected.get(&pid) {
            return Some(*remote);
        }
        match self.backend.load_module(pid, module) {
            Ok(remote) => {
                log_info!("Payload injected into PID {pid} at 0x{:X}", remote.base);
                self.injected.insert(pid, remote);
                Some(remote)
            }
            Err(e) => {
                log_error!("Failed to inject payload into PID {pid}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Scripted backend: a fixed process table, per-pid window lists, and
    /// a record of every injection and remote call.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub processes: Vec<ProcessRecord>,
        pub windows: HashMap<u32, Vec<WindowHandle>>,
        pub refuse_injection: HashSet<u32>,
        pub fail_calls: HashSet<u32>,
        pub loads: RefCell<Vec<u32>>,
        pub calls: RefCell<Vec<(u32, bool)>>,
    }

    impl FakeBackend {
        pub fn with_process(mut self, pid: u32, name: &str, windows: usize) -> Self {
            self.processes.push(ProcessRecord::new(pid, name));
            let handles = (0..windows).map(|i| WindowHandle(0x1000 + i)).collect();
            self.windows.insert(pid, handles);
            self
        }
    }

    impl ProcessInspector for FakeBackend {
        fn list_processes(&self) -> CloakResult<Vec<ProcessRecord>> {
            Ok(self.processes.clone())
        }

        fn visible_windows(&self, pid: u32) -> Vec<WindowHandle> {
            self.windows.get(&pid).cloned().unwrap_or_default()
        }
    }

    impl InjectionBackend for FakeBackend {
        fn load_module(&self, pid: u32, _module: &Path) -> CloakResult<RemoteModule> {
            self.loads.borrow_mut().push(pid);
            if self.refuse_injection.contains(&pid) {
                return Err("access denied".into());
            }
            Ok(RemoteModule {
                base: 0x7ff0_0000 + pid as usize,
            })
        }

        fn invoke_hide_all(
            &self,
            pid: u32,
            remote: RemoteModule,
            _module: &Path,
            hide: bool,
        ) -> CloakResult<u32> {
            assert_eq!(remote.base, 0x7ff0_0000 + pid as usize);
            self.calls.borrow_mut().push((pid, hide));
            if self.fail_calls.contains(&pid) {
                return Err("remote thread did not finish".into());
            }
            Ok(self.visible_windows(pid).len() as u32)
        }
    }

    fn controller(backend: FakeBackend) -> (VisibilityController<FakeBackend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("cloak_payload.dll");
        std::fs::write(&module, b"MZ").unwrap();
        let mut controller = VisibilityController::new(backend);
        assert!(controller.initialize(&module));
        (controller, dir)
    }

    #[test]
    fn initialize_rejects_missing_module() {
        let mut controller = VisibilityController::new(FakeBackend::default());

        assert!(!controller.initialize(Path::new("does-not-exist.dll")));
        assert!(!controller.is_initialized());
    }

    #[test]
    fn uninitialized_controller_affects_nothing() {
        // Arrange
        let backend = FakeBackend::default().with_process(10, "notepad.exe", 1);
        let mut controller = VisibilityController::new(backend);

        // Act
        let affected = controller.hide_process_windows("notepad", true);

        // Assert
        assert_eq!(affected, 0);
        assert!(controller.backend().loads.borrow().is_empty());
    }

    #[test]
    fn hiding_records_state_when_windows_were_affected() {
        // Arrange
        let backend = FakeBackend::default().with_process(10, "notepad.exe", 2);
        let (mut controller, _dir) = controller(backend);

        // Act
        let affected = controller.hide_process_windows("Notepad", true);

        // Assert
        assert_eq!(affected, 1);
        assert!(controller.is_process_hidden("notepad"));
        assert!(controller.is_process_hidden("NOTEPAD"));
        assert_eq!(controller.hidden_processes(), vec!["notepad".to_string()]);
    }

    #[test]
    fn process_without_windows_is_not_recorded_or_injected() {
        // Arrange
        let backend = FakeBackend::default().with_process(10, "tray.exe", 0);
        let (mut controller, _dir) = controller(backend);

        // Act
        let affected = controller.hide_process_windows("tray", true);

        // Assert
        assert_eq!(affected, 0);
        assert!(!controller.is_process_hidden("tray"));
        assert!(controller.backend().loads.borrow().is_empty());
    }

    #[test]
    fn injection_happens_once_per_process() {
        // Arrange
        let backend = FakeBackend::default().with_process(10, "notepad.exe", 1);
        let (mut controller, _dir) = controller(backend);

        // Act
        controller.hide_process_windows("notepad", true);
        controller.hide_process_windows("notepad", false);
        controller.hide_process_windows("notepad", true);

        // Assert
        assert_eq!(*controller.backend().loads.borrow(), vec![10]);
        assert_eq!(
            *controller.backend().calls.borrow(),
            vec![(10, true), (10, false), (10, true)]
        );
    }

    #[test]
    fn injection_failure_yields_zero_and_is_retried_next_time() {
        // Arrange
        let mut backend = FakeBackend::default().with_process(10, "notepad.exe", 1);
        backend.refuse_injection.insert(10);
        let (mut controller, _dir) = controller(backend);

        // Act
        let first = controller.hide_process_windows("notepad", true);
        let second = controller.hide_process_windows("notepad", true);

        // Assert
        assert_eq!(first, 0);
        assert_eq!(second, 0);
        assert_eq!(controller.backend().loads.borrow().len(), 2);
        assert!(controller.hidden_processes().is_empty());
    }

    #[test]
    fn failed_remote_call_forgets_the_injection() {
        // Arrange
        let mut backend = FakeBackend::default().with_process(10, "notepad.exe", 1);
        backend.fail_calls.insert(10);
        let (mut controller, _dir) = controller(backend);

        // Act
        let first = controller.hide_process_windows("notepad", true);
        let second = controller.hide_process_windows("notepad", true);

        // Assert
        assert_eq!(first, 0);
        assert_eq!(second, 0);
        assert_eq!(*controller.backend().loads.borrow(), vec![10, 10]);
        assert!(!controller.is_process_hidden("notepad"));
    }

    #[test]
    fn every_matching_process_is_counted() {
        // Arrange
        let backend = FakeBackend::default()
            .with_process(10, "chrome.exe", 3)
            .with_process(11, "chrome.exe", 0)
            .with_process(12, "Chrome.exe", 1);
        let (mut controller, _dir) = controller(backend);

        // Act
        let affected = controller.hide_process_windows("chrome", true);

        // Assert
        assert_eq!(affected, 2);
    }

    #[test]
    fn showing_keeps_name_but_clears_hidden_flag() {
        let backend = FakeBackend::default().with_process(10, "notepad.exe", 1);
        let (mut controller, _dir) = controller(backend);

        controller.hide_process_windows("notepad", true);
        controller.hide_process_windows("notepad", false);

        assert!(!controller.is_process_hidden("notepad"));
        assert!(controller.hidden_processes().is_empty());
    }

    #[test]
    fn hide_multiple_sums_per_name() {
        // Arrange
        let backend = FakeBackend::default()
            .with_process(10, "notepad.exe", 1)
            .with_process(20, "calc.exe", 1)
            .with_process(30, "slack.exe", 0);
        let (mut controller, _dir) = controller(backend);

        // Act
        let affected = controller.hide_multiple_processes(&["notepad", "calc", "slack"], true);

        // Assert
        assert_eq!(affected, 2);
        assert_eq!(
            controller.hidden_processes(),
            vec!["calc".to_string(), "notepad".to_string()]
        );
    }

    #[test]
    fn restore_all_shows_everything_and_clears_state() {
        // Arrange
        let backend = FakeBackend::default()
            .with_process(10, "notepad.exe", 1)
            .with_process(20, "calc.exe", 2);
        let (mut controller, _dir) = controller(backend);
        controller.hide_multiple_processes(&["notepad", "calc"], true);

        // Act
        controller.restore_all();

        // Assert
        assert!(controller.hidden_processes().is_empty());
        let calls = controller.backend().calls.borrow();
        assert!(calls.contains(&(10, false)));
        assert!(calls.contains(&(20, false)));
    }

    #[test]
    fn unsupported_backend_refuses_injection() {
        let backend = UnsupportedBackend;

        assert!(backend.list_processes().unwrap().is_empty());
        assert!(backend.load_module(1, Path::new("x.dll")).is_err());
    }

    #[test]
    fn remote_entry_adds_offset_to_base() {
        let remote = RemoteModule { base: 0x7ff6_1000_0000 };

        assert_eq!(remote.entry_at(0x1a40), Some(0x7ff6_1000_1a40));
        assert_eq!(RemoteModule { base: usize::MAX }.entry_at(1), None);
    }
}
