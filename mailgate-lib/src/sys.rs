// The only FFI in the crate: resource limits, descriptor hand-over to
// worker processes, signalling them and reading the host name.
#![allow(unsafe_code)]

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Descriptor limit the gateway asks for at startup
pub const DESIRED_FILEDES: u64 = 8192;

/// Raise RLIMIT_NOFILE to `desired`.
///
/// On failure returns the error together with the soft limit still in force.
pub fn raise_fd_limit(desired: u64) -> Result<(), (io::Error, u64)> {
    let wanted = libc::rlimit { rlim_cur: desired as libc::rlim_t, rlim_max: desired as libc::rlim_t };
    // SAFETY: `wanted` is a valid, initialised rlimit for the duration of the call.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &wanted) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    let mut current = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `current` is a valid out-pointer for the duration of the call.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut current) };
    let soft = if rc == 0 { current.rlim_cur as u64 } else { 0 };
    Err((err, soft))
}

/// Descriptor on which a worker process receives its launch envelope
pub const LAUNCH_FD: RawFd = 3;

/// Make `fd` available as `target` in the child `cmd` starts.
///
/// The caller keeps `fd` open until the child has been spawned.
pub fn inherit_fd(cmd: &mut tokio::process::Command, fd: RawFd, target: RawFd) {
    // SAFETY: the hook runs between fork and exec and only calls dup2(2) and
    // fcntl(2), which are async-signal-safe and do not allocate.
    unsafe {
        cmd.pre_exec(move || {
            // dup2 onto itself would keep close-on-exec set
            let rc = if fd == target { libc::fcntl(fd, libc::F_SETFD, 0) } else { libc::dup2(fd, target) };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        });
    }
}

/// Take ownership of a descriptor inherited from the parent process.
///
/// Call at most once per descriptor.
pub fn take_inherited_fd(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: F_GETFD only queries the descriptor table.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the descriptor is open and nothing else in this process owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Ask a worker process to end its session.
pub fn send_terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "refusing to signal a process group"));
    }
    // SAFETY: kill(2) has no memory-safety preconditions; pid is a positive child pid.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// The system host name, if it can be read.
pub fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and outlives the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
