//! Named interprocess readers/writer lock.
//!
//! Every cache pairs its segment with a lock named `<cache_name>_mutex`.
//! All mutating operations hold it in exclusive mode, all reads in shared
//! mode, for the duration of exactly one public call. The lock's lifetime is
//! independent of any one process: it is an OS object opened-or-created by
//! whichever process arrives first, and it is **not** released when a holder
//! terminates abnormally — a crashed exclusive holder starves every attached
//! process until the host cleans up.
//!
//! Two flavors back the same type:
//!
//! - **interprocess**: a `PTHREAD_PROCESS_SHARED` rwlock placed in a small
//!   shared-memory object (shared backend) or mapped file (mapped backend).
//!   A ready-flag handshake resolves the create/open race: the creator
//!   initializes the rwlock and then publishes a magic word; openers spin
//!   until they see it.
//! - **local**: a process-wide registry of [`parking_lot`] rwlocks keyed by
//!   name, used by the heap backend, which is process-local by definition.
//!
//! Guards are scoped: acquisition returns an RAII guard that releases on
//! every exit path. Guards hold the lock's shared ownership rather than a
//! borrow, so an operation can hold its guard while mutating the cache
//! handle it came from.

use std::ffi::CString;
use std::fmt;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use memmap2::MmapMut;
use once_cell::sync::Lazy;
use parking_lot::lock_api::RawRwLock as _;
use parking_lot::{Mutex, RawRwLock};

use crate::backend::shared::{fd_size, map_fd, open_fd, shm_name};

/// Published by the creator once the rwlock is initialized.
const LOCK_READY: u32 = 0x524b_4c57; // "RWLK"

/// Shared layout of the lock region: ready flag, padding, then the rwlock.
#[repr(C)]
struct LockRegion {
    ready: AtomicU32,
    _pad: u32,
    rwlock: libc::pthread_rwlock_t,
}

const LOCK_REGION_SIZE: usize = std::mem::size_of::<LockRegion>();

/// Byte offset of `rwlock` within [`LockRegion`].
const RWLOCK_OFFSET: usize = 8;

enum Backing {
    Shm { ptr: NonNull<u8>, len: usize },
    File { map: MmapMut },
}

struct PsharedLock {
    backing: Backing,
}

impl PsharedLock {
    fn region_base(&self) -> *mut u8 {
        match &self.backing {
            Backing::Shm { ptr, .. } => ptr.as_ptr(),
            Backing::File { map } => map.as_ptr() as *mut u8,
        }
    }

    fn ready(&self) -> &AtomicU32 {
        // SAFETY: the region is at least LOCK_REGION_SIZE bytes and the
        // ready flag sits at offset 0 with 4-byte alignment (page-aligned
        // mapping).
        unsafe { &*(self.region_base() as *const AtomicU32) }
    }

    fn rwlock(&self) -> *mut libc::pthread_rwlock_t {
        // SAFETY: offset RWLOCK_OFFSET is inside the mapped region and
        // matches the repr(C) layout of LockRegion.
        unsafe { self.region_base().add(RWLOCK_OFFSET) as *mut libc::pthread_rwlock_t }
    }

    /// Initializes the rwlock as process-shared and publishes the ready flag.
    fn init(&self) {
        // SAFETY: freshly created region that no other process will touch
        // until the ready flag is published below.
        unsafe {
            let mut attr: libc::pthread_rwlockattr_t = std::mem::zeroed();
            libc::pthread_rwlockattr_init(&mut attr);
            libc::pthread_rwlockattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_rwlock_init(self.rwlock(), &attr);
            libc::pthread_rwlockattr_destroy(&mut attr);
        }
        self.ready().store(LOCK_READY, Ordering::Release);
    }

    /// Spins until the creator publishes the ready flag.
    fn wait_ready(&self) {
        while self.ready().load(Ordering::Acquire) != LOCK_READY {
            std::thread::yield_now();
        }
    }
}

impl Drop for PsharedLock {
    fn drop(&mut self) {
        // The rwlock itself is never destroyed: its lifetime is the OS
        // object's, not this process's.
        if let Backing::Shm { ptr, len } = &self.backing {
            // SAFETY: mapping created by this handle, unmapped exactly once.
            unsafe {
                libc::munmap(ptr.as_ptr().cast(), *len);
            }
        }
    }
}

enum LockInner {
    Pshared(PsharedLock),
    Local(Arc<RawRwLock>),
}

// SAFETY: the pshared rwlock is made for concurrent use by arbitrary
// processes and threads; the mapping is only unmapped when the last owner
// (lock handle or guard, all holding the Arc) drops.
unsafe impl Send for LockInner {}
// SAFETY: as above; all lock operations take `&self` by design.
unsafe impl Sync for LockInner {}

impl LockInner {
    fn lock_shared(&self) {
        match self {
            // SAFETY: rwlock initialized by the ready-flag protocol.
            LockInner::Pshared(l) => {
                let rc = unsafe { libc::pthread_rwlock_rdlock(l.rwlock()) };
                assert_eq!(rc, 0, "pthread_rwlock_rdlock failed: {rc}");
            }
            LockInner::Local(l) => l.lock_shared(),
        }
    }

    fn unlock_shared(&self) {
        match self {
            // SAFETY: paired with a successful lock_shared by this guard.
            LockInner::Pshared(l) => {
                let rc = unsafe { libc::pthread_rwlock_unlock(l.rwlock()) };
                debug_assert_eq!(rc, 0);
            }
            // SAFETY: paired with a successful lock_shared by this guard.
            LockInner::Local(l) => unsafe { l.unlock_shared() },
        }
    }

    fn lock_exclusive(&self) {
        match self {
            // SAFETY: rwlock initialized by the ready-flag protocol.
            LockInner::Pshared(l) => {
                let rc = unsafe { libc::pthread_rwlock_wrlock(l.rwlock()) };
                assert_eq!(rc, 0, "pthread_rwlock_wrlock failed: {rc}");
            }
            LockInner::Local(l) => l.lock_exclusive(),
        }
    }

    fn unlock_exclusive(&self) {
        match self {
            // SAFETY: paired with a successful lock_exclusive by this guard.
            LockInner::Pshared(l) => {
                let rc = unsafe { libc::pthread_rwlock_unlock(l.rwlock()) };
                debug_assert_eq!(rc, 0);
            }
            // SAFETY: paired with a successful lock_exclusive by this guard.
            LockInner::Local(l) => unsafe { l.unlock_exclusive() },
        }
    }
}

/// Registry backing the process-local flavor, keyed by lock name.
static LOCAL_LOCKS: Lazy<Mutex<HashMap<String, Arc<RawRwLock>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A process-wide readers/writer lock identified by name.
///
/// Cloning is cheap and shares the same underlying lock.
#[derive(Clone)]
pub struct NamedRwLock {
    inner: Arc<LockInner>,
}

impl NamedRwLock {
    /// Opens or creates the shared-memory flavor under `/<name>`.
    pub fn open_or_create_shm(name: &str) -> io::Result<Self> {
        let cname = shm_name(name)?;
        match try_create_shm(&cname) {
            Ok(Some(lock)) => return Ok(lock),
            Ok(None) => {}
            Err(e) => return Err(e),
        }
        // Someone else created it; attach and wait for initialization.
        let fd = open_fd(&cname, libc::O_RDWR)?;
        while fd_size(fd)? < LOCK_REGION_SIZE as u64 {
            std::thread::yield_now();
        }
        let ptr = match map_fd(fd, LOCK_REGION_SIZE) {
            Ok(p) => p,
            Err(e) => {
                // SAFETY: fd from shm_open above.
                unsafe {
                    libc::close(fd);
                }
                return Err(e);
            }
        };
        // SAFETY: fd no longer needed once mapped.
        unsafe {
            libc::close(fd);
        }
        let lock = PsharedLock {
            backing: Backing::Shm {
                ptr,
                len: LOCK_REGION_SIZE,
            },
        };
        lock.wait_ready();
        Ok(NamedRwLock {
            inner: Arc::new(LockInner::Pshared(lock)),
        })
    }

    /// Opens or creates the mapped-file flavor at `path`.
    pub fn open_or_create_file(path: &str) -> io::Result<Self> {
        let (file, created) = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(f) => (f, true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let f = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
                (f, false)
            }
            Err(e) => return Err(e),
        };
        if created {
            file.set_len(LOCK_REGION_SIZE as u64)?;
        } else {
            while file.metadata()?.len() < LOCK_REGION_SIZE as u64 {
                std::thread::yield_now();
            }
        }
        // SAFETY: the lock file is fixed-size and never truncated.
        let map = unsafe { MmapMut::map_mut(&file)? };
        let lock = PsharedLock {
            backing: Backing::File { map },
        };
        if created {
            lock.init();
        } else {
            lock.wait_ready();
        }
        Ok(NamedRwLock {
            inner: Arc::new(LockInner::Pshared(lock)),
        })
    }

    /// Returns the process-local flavor from the name registry.
    pub fn local(name: &str) -> Self {
        let mut registry = LOCAL_LOCKS.lock();
        let raw = registry
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(RawRwLock::INIT));
        NamedRwLock {
            inner: Arc::new(LockInner::Local(Arc::clone(raw))),
        }
    }

    /// Removes the shared-memory object backing a lock name.
    pub fn remove_shm(name: &str) -> bool {
        match shm_name(name) {
            // SAFETY: valid NUL-terminated name.
            Ok(cname) => unsafe { libc::shm_unlink(cname.as_ptr()) == 0 },
            Err(_) => false,
        }
    }

    /// Acquires the lock in shared mode.
    pub fn shared(&self) -> SharedGuard {
        self.inner.lock_shared();
        SharedGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Acquires the lock in exclusive mode.
    pub fn exclusive(&self) -> ExclusiveGuard {
        self.inner.lock_exclusive();
        ExclusiveGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn try_create_shm(cname: &CString) -> io::Result<Option<NamedRwLock>> {
    // SAFETY: valid NUL-terminated name.
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    };
    if fd == -1 {
        let err = io::Error::last_os_error();
        return if err.raw_os_error() == Some(libc::EEXIST) {
            Ok(None)
        } else {
            Err(err)
        };
    }
    let mapped = (|| {
        // SAFETY: valid fd; sizes the fresh object.
        if unsafe { libc::ftruncate(fd, LOCK_REGION_SIZE as libc::off_t) } == -1 {
            return Err(io::Error::last_os_error());
        }
        map_fd(fd, LOCK_REGION_SIZE)
    })();
    // SAFETY: fd from shm_open above; mapping survives the close.
    unsafe {
        libc::close(fd);
    }
    let ptr = mapped?;
    let lock = PsharedLock {
        backing: Backing::Shm {
            ptr,
            len: LOCK_REGION_SIZE,
        },
    };
    lock.init();
    Ok(Some(NamedRwLock {
        inner: Arc::new(LockInner::Pshared(lock)),
    }))
}

/// RAII shared-mode guard; releases on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedGuard {
    inner: Arc<LockInner>,
}

impl Drop for SharedGuard {
    fn drop(&mut self) {
        self.inner.unlock_shared();
    }
}

/// RAII exclusive-mode guard; releases on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard {
    inner: Arc<LockInner>,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.inner.unlock_exclusive();
    }
}

impl fmt::Debug for NamedRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flavor = match &*self.inner {
            LockInner::Pshared(_) => "interprocess",
            LockInner::Local(_) => "local",
        };
        f.debug_struct("NamedRwLock").field("flavor", &flavor).finish()
    }
}

impl fmt::Debug for SharedGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedGuard")
    }
}

impl fmt::Debug for ExclusiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExclusiveGuard")
    }
}
