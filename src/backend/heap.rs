//! Process-local heap backend.

use std::io;

use crate::lock::NamedRwLock;
use crate::segment::Segment;

use super::MemoryBackend;

/// Process-local heap memory emulating the shared interface.
///
/// Useful for single-process testing and tooling: nothing is persisted or
/// shared, and every `open_or_create` yields a fresh zeroed block — there is
/// no name registry to find an earlier block through. `grow` resizes in
/// place, since there is no cross-process visibility to preserve.
#[derive(Debug, Clone, Copy)]
pub struct Heap;

impl MemoryBackend for Heap {
    fn open_or_create(_path: &str, size: usize) -> io::Result<Segment> {
        Ok(Segment::from_heap(vec![0; size]))
    }

    fn open(_path: &str) -> io::Result<Segment> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "heap segments are process-local and cannot be reopened by name",
        ))
    }

    fn create(_path: &str, size: usize) -> io::Result<Segment> {
        Ok(Segment::from_heap(vec![0; size]))
    }

    fn grow(segment: &mut Segment, _path: &str, increment: usize) -> io::Result<()> {
        let mut buf = segment
            .take_heap_buf()
            .ok_or_else(|| io::Error::other("grow on a non-heap segment"))?;
        buf.resize(buf.len() + increment, 0);
        *segment = Segment::from_heap(buf);
        Ok(())
    }

    fn convert_base_dir(_base_dir: &str) -> String {
        String::new()
    }

    fn open_or_create_lock(name: &str, _base_dir: &str) -> io::Result<NamedRwLock> {
        Ok(NamedRwLock::local(name))
    }

    fn remove(_path: &str) -> bool {
        false
    }

    fn remove_lock(_name: &str, _base_dir: &str) -> bool {
        false
    }
}
