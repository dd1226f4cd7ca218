//! Remote loading and invocation of the capability module.
//!
//! `SetWindowDisplayAffinity` only works from a thread of the process
//! that owns the window, so the module is loaded into the target with a
//! remote `LoadLibraryW` thread and then called with a second remote
//! thread started at its hide-all export.

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use cloak_core::config::REMOTE_THREAD_TIMEOUT;
use cloak_core::{
    CloakResult, InjectionBackend, ProcessInspector, ProcessRecord, RemoteModule, WindowHandle,
    log_debug, log_warn,
};

use windows::Win32::Foundation::{HANDLE, HMODULE, WAIT_OBJECT_0};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::LibraryLoader::{
    FreeLibrary, GetModuleHandleW, GetProcAddress, LoadLibraryW,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeThread, LPTHREAD_START_ROUTINE, OpenProcess,
    PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
    PROCESS_VM_WRITE, WaitForSingleObject,
};
use windows::core::{HSTRING, s, w};

use crate::enumerate;
use crate::process::{self, HandleGuard};

/// Export started by the second remote thread.
pub const HIDE_ALL_EXPORT: &str = "hide_all_windows_of_host_process";

/// Signature shared by thread start routines and the hide-all export.
type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

/// Windows implementation of process inspection and injection.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Injector;

impl ProcessInspector for Win32Injector {
    fn list_processes(&self) -> CloakResult<Vec<ProcessRecord>> {
        process::list_processes()
    }

    fn visible_windows(&self, pid: u32) -> Vec<WindowHandle> {
        enumerate::visible_windows(pid)
    }
}

impl InjectionBackend for Win32Injector {
    fn load_module(&self, pid: u32, module: &Path) -> CloakResult<RemoteModule> {
        let target = open_target(pid)?;

        let wide: Vec<u16> = module
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let path_buf = RemoteBuffer::alloc(target.0, wide.len() * 2)?;
        path_buf.write(&wide)?;

        // SAFETY: kernel32 is mapped at the same address in every process
        // of the session, so the local LoadLibraryW address is valid in
        // the target too.
        let load_library = unsafe {
            let kernel32 = GetModuleHandleW(w!("kernel32.dll"))?;
            GetProcAddress(kernel32, s!("LoadLibraryW"))
                .ok_or_else(|| format!("LoadLibraryW not found: {}", last_error()))?
        };
        // SAFETY: LoadLibraryW takes one pointer argument and returns a
        // pointer-sized value, matching a thread start routine.
        let start: ThreadStart = unsafe { std::mem::transmute(load_library) };

        let exit_code = run_remote_thread(target.0, Some(start), path_buf.ptr)?;

        let name = module
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or("payload path has no file name")?;
        // The thread exit code only carries the low 32 bits of the module
        // handle, and is zero for a base on a 4 GiB boundary; the module
        // snapshot decides.
        resolve_loaded_base(pid, name, exit_code, process::module_base(pid, name))
    }

    fn invoke_hide_all(
        &self,
        pid: u32,
        remote: RemoteModule,
        module: &Path,
        hide: bool,
    ) -> CloakResult<u32> {
        let offset = export_offset(module, HIDE_ALL_EXPORT)?;
        let address = remote
            .entry_at(offset)
            .ok_or("remote entry point overflows the address space")?;
        log_debug!("Remote {HIDE_ALL_EXPORT} for PID {pid} at 0x{address:X} (offset 0x{offset:X})");

        let target = open_target(pid)?;
        // SAFETY: `address` is the hide-all export of the module loaded in
        // the target; it has the thread start routine signature.
        let start: ThreadStart = unsafe { std::mem::transmute::<usize, ThreadStart>(address) };
        let flag = usize::from(hide) as *mut c_void;

        run_remote_thread(target.0, Some(start), flag)
    }
}

/// Turns the remote `LoadLibraryW` result and the module lookup into the
/// module's remote base.
fn resolve_loaded_base(
    pid: u32,
    name: &str,
    exit_code: u32,
    lookup: CloakResult<Option<usize>>,
) -> CloakResult<RemoteModule> {
    match lookup {
        Ok(Some(base)) => Ok(RemoteModule { base }),
        Ok(None) => Err(format!("LoadLibraryW failed inside PID {pid}").into()),
        Err(e) => {
            if exit_code != 0 {
                log_warn!(
                    "{name} was loaded into PID {pid} (handle low bits 0x{exit_code:X}) \
                     but its base could not be read; the module stays loaded untracked"
                );
            }
            Err(format!("module lookup in PID {pid} failed: {e}").into())
        }
    }
}

/// Opens `pid` with the rights needed for remote memory and threads.
fn open_target(pid: u32) -> CloakResult<HandleGuard> {
    let access = PROCESS_CREATE_THREAD
        | PROCESS_QUERY_INFORMATION
        | PROCESS_VM_OPERATION
        | PROCESS_VM_WRITE
        | PROCESS_VM_READ;

    // SAFETY: OpenProcess returns an owned handle, closed by the guard.
    let handle = unsafe { OpenProcess(access, false, pid) }
        .map_err(|e| format!("OpenProcess({pid}) failed: {e}"))?;
    Ok(HandleGuard(handle))
}

/// Starts a thread in `process` and waits for it with a bounded timeout.
///
/// Returns the thread's exit code. A timed-out thread is abandoned, not
/// terminated.
fn run_remote_thread(
    process: HANDLE,
    start: LPTHREAD_START_ROUTINE,
    param: *mut c_void,
) -> CloakResult<u32> {
    // SAFETY: `start` is a valid routine address inside `process`, and
    // `param` is either a remote buffer or a plain integer flag.
    let thread = unsafe {
        CreateRemoteThread(process, None, 0, start, Some(param as *const c_void), 0, None)
    }
    .map_err(|e| format!("CreateRemoteThread failed: {e}"))?;
    let thread = HandleGuard(thread);

    let timeout_ms = REMOTE_THREAD_TIMEOUT.as_millis() as u32;
    // SAFETY: waiting on a thread handle we own.
    let wait = unsafe { WaitForSingleObject(thread.0, timeout_ms) };
    if wait != WAIT_OBJECT_0 {
        return Err(format!("remote thread did not finish within {timeout_ms} ms").into());
    }

    let mut exit_code = 0u32;
    // SAFETY: the thread has terminated; its exit code is final.
    unsafe { GetExitCodeThread(thread.0, &mut exit_code)? };
    Ok(exit_code)
}

/// Byte offset of `export` from the base of `module`.
///
/// Loads the module into this process only long enough to resolve the
/// export; the offset is identical in any process that loads the same file.
fn export_offset(module: &Path, export: &str) -> CloakResult<usize> {
    let wide = HSTRING::from(module.as_os_str());
    // SAFETY: loading our own payload runs only its trivial DllMain.
    let local = LocalLibrary(unsafe { LoadLibraryW(&wide) }
        .map_err(|e| format!("failed to load {} locally: {e}", module.display()))?);

    let name = std::ffi::CString::new(export)?;
    // SAFETY: `local.0` is a live module handle and `name` is NUL-terminated.
    let proc = unsafe { GetProcAddress(local.0, windows::core::PCSTR(name.as_ptr().cast())) }
        .ok_or_else(|| format!("{export} not exported by {}", module.display()))?;

    Ok(proc as usize - local.0.0 as usize)
}

/// A buffer allocated inside another process, freed on drop.
struct RemoteBuffer {
    process: HANDLE,
    ptr: *mut c_void,
    len: usize,
}

impl RemoteBuffer {
    fn alloc(process: HANDLE, len: usize) -> CloakResult<Self> {
        // SAFETY: VirtualAllocEx reserves and commits fresh pages in the
        // target; a null return means failure.
        let ptr = unsafe {
            VirtualAllocEx(process, None, len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE)
        };
        if ptr.is_null() {
            return Err(format!("VirtualAllocEx failed: {}", last_error()).into());
        }
        Ok(Self { process, ptr, len })
    }

    fn write(&self, data: &[u16]) -> CloakResult<()> {
        let bytes = std::mem::size_of_val(data);
        if bytes > self.len {
            return Err("remote buffer too small".into());
        }
        // SAFETY: `ptr` points to at least `len` committed bytes in the
        // target and `data` is a valid local slice of `bytes` bytes.
        unsafe {
            WriteProcessMemory(self.process, self.ptr, data.as_ptr().cast(), bytes, None)
                .map_err(|e| format!("WriteProcessMemory failed: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for RemoteBuffer {
    fn drop(&mut self) {
        // SAFETY: releases the allocation made in `alloc`.
        unsafe {
            let _ = VirtualFreeEx(self.process, self.ptr, 0, MEM_RELEASE);
        }
    }
}

/// A module loaded into this process, freed on drop.
struct LocalLibrary(HMODULE);

impl Drop for LocalLibrary {
    fn drop(&mut self) {
        // SAFETY: balances the LoadLibraryW in `export_offset`.
        unsafe {
            let _ = FreeLibrary(self.0);
        }
    }
}

fn last_error() -> windows::core::Error {
    windows::core::Error::from_win32()
}
