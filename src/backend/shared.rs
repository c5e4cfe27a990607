//! POSIX shared-memory backend.

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use crate::lock::NamedRwLock;
use crate::segment::Segment;

use super::MemoryBackend;

/// True OS shared memory, addressed by name only.
///
/// Segments are `shm_open` objects mapped with `MAP_SHARED`; any process
/// that knows the cache name can attach. `convert_base_dir` returns an empty
/// prefix — there is no directory.
#[derive(Debug, Clone, Copy)]
pub struct SharedMemory;

/// Builds the leading-slash object name `shm_open` expects.
pub(crate) fn shm_name(path: &str) -> io::Result<CString> {
    let name = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    CString::new(name).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "shared memory name contains NUL")
    })
}

/// `shm_open` wrapper returning the raw fd.
pub(crate) fn open_fd(name: &CString, flags: libc::c_int) -> io::Result<libc::c_int> {
    // SAFETY: `name` is a valid NUL-terminated string for the duration of
    // the call.
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, 0o600) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Size of the object behind `fd`.
pub(crate) fn fd_size(fd: libc::c_int) -> io::Result<u64> {
    // SAFETY: zeroed stat buffer, valid fd.
    unsafe {
        let mut st: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut st) == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(st.st_size as u64)
    }
}

/// Maps `len` bytes of `fd` read-write/shared.
pub(crate) fn map_fd(fd: libc::c_int, len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: anonymous address, length and fd validated by the caller.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(addr.cast()).ok_or_else(|| io::Error::other("mmap returned null"))
}

fn attach(fd: libc::c_int, want: u64) -> io::Result<Segment> {
    let result = (|| {
        let current = fd_size(fd)?;
        if current < want {
            // SAFETY: valid fd; extends the object, never truncates data.
            if unsafe { libc::ftruncate(fd, want as libc::off_t) } == -1 {
                return Err(io::Error::last_os_error());
            }
        }
        let len = fd_size(fd)?.max(want) as usize;
        let ptr = map_fd(fd, len)?;
        // SAFETY: fresh mapping of exactly `len` bytes, owned by the segment.
        Ok(unsafe { Segment::from_shm(ptr, len) })
    })();
    // SAFETY: fd came from shm_open; the mapping stays valid after close.
    unsafe {
        libc::close(fd);
    }
    result
}

impl MemoryBackend for SharedMemory {
    fn open_or_create(path: &str, size: usize) -> io::Result<Segment> {
        let name = shm_name(path)?;
        let fd = open_fd(&name, libc::O_CREAT | libc::O_RDWR)?;
        attach(fd, size as u64)
    }

    fn open(path: &str) -> io::Result<Segment> {
        let name = shm_name(path)?;
        let fd = open_fd(&name, libc::O_RDWR)?;
        attach(fd, 0)
    }

    fn create(path: &str, size: usize) -> io::Result<Segment> {
        let name = shm_name(path)?;
        let fd = open_fd(&name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR)?;
        attach(fd, size as u64)
    }

    fn grow(segment: &mut Segment, path: &str, increment: usize) -> io::Result<()> {
        segment.detach();
        let name = shm_name(path)?;
        let fd = open_fd(&name, libc::O_RDWR)?;
        let current = match fd_size(fd) {
            Ok(n) => n,
            Err(e) => {
                // SAFETY: fd from shm_open above.
                unsafe {
                    libc::close(fd);
                }
                return Err(e);
            }
        };
        *segment = attach(fd, current + increment as u64)?;
        Ok(())
    }

    fn convert_base_dir(_base_dir: &str) -> String {
        String::new()
    }

    fn open_or_create_lock(name: &str, _base_dir: &str) -> io::Result<NamedRwLock> {
        NamedRwLock::open_or_create_shm(name)
    }

    fn remove(path: &str) -> bool {
        match shm_name(path) {
            // SAFETY: valid NUL-terminated name.
            Ok(name) => unsafe { libc::shm_unlink(name.as_ptr()) == 0 },
            Err(_) => false,
        }
    }

    fn remove_lock(name: &str, _base_dir: &str) -> bool {
        NamedRwLock::remove_shm(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_name_gets_leading_slash() {
        assert_eq!(shm_name("ads").unwrap().to_str().unwrap(), "/ads");
        assert_eq!(shm_name("/ads").unwrap().to_str().unwrap(), "/ads");
    }

    #[test]
    fn test_convert_base_dir_is_empty() {
        assert_eq!(SharedMemory::convert_base_dir("/tmp/CACHE"), "");
    }
}
