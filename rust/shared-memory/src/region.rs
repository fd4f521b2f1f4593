//! Memory-mapped event arena
//!
//! The arena is one mapping cut into `event_count` fixed-size slots. It is
//! either anonymous or backed by a file, the way an ET system keeps its
//! events in a memory-mapped file.

use crate::{PlatformUtils, Result, SharedMemoryError, MAX_ARENA_SIZE};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Fixed-slot payload storage
pub struct EventArena {
    /// Slot size in bytes
    event_size: usize,
    /// Number of slots
    event_count: usize,
    /// Backing file, if any
    path: Option<PathBuf>,
    /// Base of the mapping
    ptr: NonNull<u8>,
    /// Keeps the mapping alive
    _map: MmapMut,
}

impl EventArena {
    /// Map an anonymous arena
    pub fn anonymous(event_count: usize, event_size: usize) -> Result<Self> {
        let size = validate_geometry(event_count, event_size)?;
        let map = MmapOptions::new()
            .len(size)
            .map_anon()
            .map_err(|e| SharedMemoryError::MappingFailed(e.to_string()))?;
        debug!("Mapped anonymous arena of {} bytes", size);
        Self::from_map(map, event_count, event_size, None)
    }

    /// Map an arena onto a new file at `path`
    ///
    /// An existing file is never reused or truncated. The file is removed
    /// again when the arena is dropped.
    pub fn file_backed(path: impl AsRef<Path>, event_count: usize, event_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let size = validate_geometry(event_count, event_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => SharedMemoryError::FileExists(path.to_path_buf()),
                _ => SharedMemoryError::Io(e),
            })?;
        if let Err(e) = file.set_len(size as u64) {
            let _ = std::fs::remove_file(path);
            return Err(e.into());
        }

        // Safety: the file was created and sized by us; other processes
        // modifying it concurrently is outside the contract of the local system.
        let map = match unsafe { MmapMut::map_mut(&file) } {
            Ok(map) => map,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(SharedMemoryError::MappingFailed(format!("{}: {}", path.display(), e)));
            }
        };
        debug!("Mapped arena of {} bytes onto {}", size, path.display());
        Self::from_map(map, event_count, event_size, Some(path.to_path_buf()))
    }

    fn from_map(mut map: MmapMut, event_count: usize, event_size: usize, path: Option<PathBuf>) -> Result<Self> {
        let ptr = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| SharedMemoryError::MappingFailed("mmap returned null".to_string()))?;
        Ok(Self {
            event_size,
            event_count,
            path,
            ptr,
            _map: map,
        })
    }

    pub fn event_size(&self) -> usize {
        self.event_size
    }

    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Backing file of a file-backed arena
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn slot_ptr(&self, slot: usize) -> *mut u8 {
        assert!(slot < self.event_count, "slot {} out of range", slot);
        // Safety: slot < event_count, so the offset stays inside the mapping.
        unsafe { self.ptr.as_ptr().add(slot * self.event_size) }
    }

    /// Copy `data` into the start of `slot`
    ///
    /// # Safety
    /// The caller must hold `slot` exclusively: no other thread may read or
    /// write it until ownership is handed over through the system lock.
    pub(crate) unsafe fn write(&self, slot: usize, data: &[u8]) -> Result<()> {
        if data.len() > self.event_size {
            return Err(SharedMemoryError::PayloadTooLarge {
                size: data.len(),
                max: self.event_size,
            });
        }
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.slot_ptr(slot), data.len());
        Ok(())
    }

    /// The first `length` bytes of `slot`
    ///
    /// # Safety
    /// Nobody may write `slot` while the returned slice is alive.
    pub(crate) unsafe fn read(&self, slot: usize, length: usize) -> &[u8] {
        let length = length.min(self.event_size);
        std::slice::from_raw_parts(self.slot_ptr(slot), length)
    }
}

// Safety: slots are only touched by the party that owns them; ownership moves
// under the system mutex.
unsafe impl Send for EventArena {}
// Safety: see above
unsafe impl Sync for EventArena {}

impl Drop for EventArena {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed arena file {}", path.display()),
                Err(e) => warn!("Failed to remove arena file {}: {}", path.display(), e),
            }
        }
    }
}

impl std::fmt::Debug for EventArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventArena")
            .field("event_size", &self.event_size)
            .field("event_count", &self.event_count)
            .field("path", &self.path)
            .finish()
    }
}

/// Validate slot geometry and return the page-aligned mapping size
fn validate_geometry(event_count: usize, event_size: usize) -> Result<usize> {
    if event_count == 0 || event_count > MAX_ARENA_SIZE {
        return Err(SharedMemoryError::InvalidSize {
            what: "event count",
            size: event_count,
            min: 1,
            max: MAX_ARENA_SIZE,
        });
    }
    if event_size < 4 || event_size > MAX_ARENA_SIZE {
        return Err(SharedMemoryError::InvalidSize {
            what: "event size",
            size: event_size,
            min: 4,
            max: MAX_ARENA_SIZE,
        });
    }

    let total = event_count
        .checked_mul(event_size)
        .filter(|total| *total <= MAX_ARENA_SIZE)
        .ok_or(SharedMemoryError::InvalidSize {
            what: "arena size",
            size: event_count.saturating_mul(event_size),
            min: 4,
            max: MAX_ARENA_SIZE,
        })?;

    Ok(PlatformUtils::align_to_page_size(total))
}
