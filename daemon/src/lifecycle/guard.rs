//! Cross-process guard serializing listener start and stop
//!
//! Windows uses a named mutex; Unix hosts take an exclusive `flock` on a
//! lock file named after the guard in the temporary directory. Either way
//! the guard is owned until it is dropped.

use tracing::{debug, trace};

use crate::hotkey::{Error, Result};

/// Default guard name shared by every hotkeyd process
pub const DEFAULT_GUARD_NAME: &str = "hotkeyd-97B7C451-2467-4C3C-BB91-25AC918C2430";

/// Exclusive ownership of a named, system-wide lock
pub struct ProcessGuard {
    name: String,
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(windows)]
    handle: windows::Win32::Foundation::HANDLE,
}

impl std::fmt::Debug for ProcessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGuard").field("name", &self.name).finish()
    }
}

#[cfg(unix)]
impl ProcessGuard {
    /// Open or create the guard and block until this process owns it.
    pub fn acquire(name: &str) -> Result<Self> {
        use std::os::unix::io::AsRawFd;

        let path = std::env::temp_dir().join(format!("{}.lock", name));
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                Error::Internal(format!("failed to open guard {}: {}", path.display(), e))
            })?;

        trace!(name, "waiting for process guard");
        loop {
            // SAFETY: the descriptor belongs to `file`, which outlives the call
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(Error::Internal(format!("failed to lock guard {}: {}", name, err)));
            }
        }
        debug!(name, "process guard acquired");

        Ok(Self {
            name: name.to_string(),
            file,
        })
    }
}

#[cfg(unix)]
impl Drop for ProcessGuard {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is still open; closing it would also unlock
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        debug!(name = %self.name, "process guard released");
    }
}

#[cfg(windows)]
impl ProcessGuard {
    /// Open or create the guard and block until this process owns it.
    pub fn acquire(name: &str) -> Result<Self> {
        use windows::core::{HSTRING, PCWSTR};
        use windows::Win32::System::Threading::{
            CreateMutexW, OpenMutexW, WaitForSingleObject, INFINITE, MUTEX_ALL_ACCESS,
        };

        let wide = HSTRING::from(name);
        let wide = PCWSTR(wide.as_ptr());
        // SAFETY: plain Win32 calls with a valid, NUL-terminated name
        let handle = unsafe {
            match CreateMutexW(None, false, wide) {
                Ok(handle) => handle,
                Err(create_err) => OpenMutexW(MUTEX_ALL_ACCESS, false, wide).map_err(|e| {
                    Error::Internal(format!(
                        "failed to open guard {}: {} ({})",
                        name, e, create_err
                    ))
                })?,
            }
        };

        trace!(name, "waiting for process guard");
        // An abandoned mutex still transfers ownership to the waiter
        unsafe {
            let _ = WaitForSingleObject(handle, INFINITE);
        }
        debug!(name, "process guard acquired");

        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }
}

#[cfg(windows)]
impl Drop for ProcessGuard {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::ReleaseMutex;

        // SAFETY: the handle was returned by CreateMutexW/OpenMutexW and is owned
        unsafe {
            let _ = ReleaseMutex(self.handle);
            let _ = CloseHandle(self.handle);
        }
        debug!(name = %self.name, "process guard released");
    }
}
