//! POSIX named semaphore guard
//!
//! Every avolt process opens the same named semaphore (initial count 1) and
//! holds it while it touches the mixer. The permit is released when it is
//! dropped, so an early return or a panic inside the guarded section cannot
//! leave it taken.
//!
//! A process killed while holding the permit leaves the count at zero and
//! every later invocation blocks. [`NamedSemaphore::unlink`] removes the
//! semaphore so the next invocation starts from a fresh one.

use avolt_core::domain::guard::{ConcurrencyGuard, GuardError, Result};
use std::ffi::CString;
use std::io;
use tracing::{debug, trace, warn};

/// Handle to a system-wide named semaphore
pub struct NamedSemaphore {
    name: String,
    sem: *mut libc::sem_t,
}

// SAFETY: POSIX semaphore operations are thread safe, and the handle is only
// closed in `drop`.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

/// POSIX names start with a slash
fn semaphore_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

fn c_path(path: &str) -> io::Result<CString> {
    CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl NamedSemaphore {
    /// Open the semaphore, creating it with one permit if it does not exist
    pub fn open(name: &str) -> Result<Self> {
        let path = semaphore_path(name);
        let c_name = c_path(&path).map_err(|source| GuardError::Open {
            name: path.clone(),
            source,
        })?;

        // SAFETY: `c_name` is a valid NUL terminated string for the whole call
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o660 as libc::mode_t,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(GuardError::Open {
                name: path,
                source: io::Error::last_os_error(),
            });
        }

        debug!(name = %path, "Opened named semaphore");
        Ok(Self { name: path, sem })
    }

    /// Remove the semaphore from the system
    ///
    /// Returns `false` if there was nothing to remove. Processes that still
    /// have it open keep using the old one.
    pub fn unlink(name: &str) -> io::Result<bool> {
        let path = semaphore_path(name);
        let c_name = c_path(&path)?;

        // SAFETY: `c_name` is a valid NUL terminated string for the whole call
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            debug!(name = %path, "Unlinked named semaphore");
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    fn acquire(&self) -> Result<Permit<'_>> {
        loop {
            // SAFETY: `self.sem` came from a successful sem_open and stays open until drop
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                trace!(name = %self.name, "Semaphore acquired");
                return Ok(Permit {
                    semaphore: self,
                    released: false,
                });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(GuardError::Acquire {
                    name: self.name.clone(),
                    source: err,
                });
            }
            trace!(name = %self.name, "Semaphore wait interrupted, retrying");
        }
    }

    fn post(&self) -> io::Result<()> {
        // SAFETY: `self.sem` came from a successful sem_open and stays open until drop
        if unsafe { libc::sem_post(self.sem) } == 0 {
            trace!(name = %self.name, "Semaphore released");
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: the handle is valid and no permit can outlive `self`
        if unsafe { libc::sem_close(self.sem) } != 0 {
            warn!(name = %self.name, error = %io::Error::last_os_error(), "Closing semaphore failed");
        }
    }
}

/// One held permit; posts the semaphore when dropped
struct Permit<'s> {
    semaphore: &'s NamedSemaphore,
    released: bool,
}

impl Permit<'_> {
    fn release(mut self) -> Result<()> {
        self.released = true;
        self.semaphore.post().map_err(|source| GuardError::Release {
            name: self.semaphore.name.clone(),
            source,
        })
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.semaphore.post() {
            warn!(name = %self.semaphore.name, error = %e, "Releasing semaphore failed");
        }
    }
}

impl ConcurrencyGuard for NamedSemaphore {
    fn name(&self) -> &str {
        &self.name
    }

    fn with_guard<T>(&self, body: impl FnOnce() -> T) -> Result<T> {
        let permit = self.acquire()?;
        let value = body();
        Ok(keep_body_result(value, permit.release()))
    }
}

/// The guarded work already happened, so a failed release is only logged
fn keep_body_result<T>(value: T, released: Result<()>) -> T {
    if let Err(e) = released {
        warn!(error = %e, "Guarded section finished but the semaphore was not released");
    }
    value
}
