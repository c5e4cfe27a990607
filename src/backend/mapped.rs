//! Memory-mapped file backend.

use std::fs::OpenOptions;
use std::io;

use memmap2::MmapMut;

use crate::lock::NamedRwLock;
use crate::segment::Segment;

use super::MemoryBackend;

/// A memory-mapped regular file under a configured directory.
///
/// `convert_base_dir` appends a path separator, so a cache named `ads` with
/// base directory `/tmp/CACHE` is backed by the file `/tmp/CACHE/ads`. The
/// directory must exist; the backend never creates it.
#[derive(Debug, Clone, Copy)]
pub struct MappedFile;

fn map_file(path: &str, want: u64) -> io::Result<Segment> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let current = file.metadata()?.len();
    if current < want {
        file.set_len(want)?;
    }
    // SAFETY: the file stays at least this large; resizes go through the
    // detach → set_len → reattach grow protocol, which never truncates.
    let map = unsafe { MmapMut::map_mut(&file)? };
    Ok(Segment::from_file(map))
}

impl MemoryBackend for MappedFile {
    fn open_or_create(path: &str, size: usize) -> io::Result<Segment> {
        map_file(path, size as u64)
    }

    fn open(path: &str) -> io::Result<Segment> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: as in `map_file`.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Segment::from_file(map))
    }

    fn create(path: &str, size: usize) -> io::Result<Segment> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(size as u64)?;
        // SAFETY: as in `map_file`.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Segment::from_file(map))
    }

    fn grow(segment: &mut Segment, path: &str, increment: usize) -> io::Result<()> {
        segment.detach();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let grown = file.metadata()?.len() + increment as u64;
        file.set_len(grown)?;
        // SAFETY: as in `map_file`.
        let map = unsafe { MmapMut::map_mut(&file)? };
        *segment = Segment::from_file(map);
        Ok(())
    }

    fn convert_base_dir(base_dir: &str) -> String {
        format!("{base_dir}/")
    }

    fn open_or_create_lock(name: &str, base_dir: &str) -> io::Result<NamedRwLock> {
        NamedRwLock::open_or_create_file(&format!("{}{name}", Self::convert_base_dir(base_dir)))
    }

    fn remove(path: &str) -> bool {
        std::fs::remove_file(path).is_ok()
    }

    fn remove_lock(name: &str, base_dir: &str) -> bool {
        std::fs::remove_file(format!("{}{name}", Self::convert_base_dir(base_dir))).is_ok()
    }
}
