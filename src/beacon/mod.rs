//! Presence beacon: a named POSIX shared memory record advertising a running
//! daemon to unprivileged processes on the same host.
//!
//! The owning daemon is the only writer. Readers map the segment read-only
//! and reject it when the major version differs or the last refresh is older
//! than the staleness threshold, so a segment left behind by a crashed daemon
//! is never mistaken for a live one.
//!
//! ## Layout (24 bytes, native endian)
//!
//! ```text
//! 0      2      4          8                16               24
//! +------+------+----------+----------------+----------------+
//! | maj  | min  | reserved | clock_identity | last_refresh   |
//! +------+------+----------+----------------+----------------+
//! ```
//!
//! Every field is an atomic. Creation stores the version and identity
//! before the first timestamp with release ordering and readers load the
//! timestamp with acquire ordering, so a reader that sees a timestamp also
//! sees the fields written before it.


use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;

/// Default shared memory name of the beacon
pub const BEACON_NAME: &str = "/airptp";

/// Layout major version; readers reject any other major version
pub const BEACON_VERSION_MAJOR: u16 = 1;

/// Layout minor version; informational
pub const BEACON_VERSION_MINOR: u16 = 0;

/// Errors from creating or reading the beacon
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// A beacon with this name already exists
    #[error("presence beacon already exists")]
    AlreadyExists,

    /// The OS refused access to the shared memory object
    #[error("permission denied for presence beacon")]
    PermissionDenied,

    /// No beacon with this name exists
    #[error("presence beacon not found")]
    NotFound,

    /// The segment is smaller than a record (creation in progress or foreign)
    #[error("presence beacon is incomplete ({size} bytes)")]
    Incomplete {
        /// Size of the segment found
        size: u64,
    },

    /// The record was written by an incompatible layout version
    #[error("presence beacon version {found} does not match {expected}")]
    VersionMismatch {
        /// Major version found in the record
        found: u16,
        /// Major version this build understands
        expected: u16,
    },

    /// The owner stopped refreshing the record
    #[error("presence beacon is stale ({age_secs}s old)")]
    Stale {
        /// Seconds since the last refresh
        age_secs: i64,
    },

    /// Other OS error from `shm_open`/`mmap`
    #[error("shared memory error: {0}")]
    Os(#[from] Errno),

    /// I/O error sizing or inspecting the segment
    #[error("shared memory I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BeaconError {
    /// Whether a reader would treat the segment as absent
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Incomplete { .. } | Self::VersionMismatch { .. } | Self::Stale { .. }
        )
    }

    fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::EEXIST => Self::AlreadyExists,
            Errno::EACCES | Errno::EPERM => Self::PermissionDenied,
            Errno::ENOENT => Self::NotFound,
            other => Self::Os(other),
        }
    }
}

/// Snapshot of a beacon record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconRecord {
    /// Layout major version
    pub version_major: u16,
    /// Layout minor version
    pub version_minor: u16,
    /// Clock identity of the publishing daemon
    pub clock_identity: u64,
    /// Unix seconds of the last refresh
    pub last_refresh: i64,
}

impl BeaconRecord {
    /// Seconds since the last refresh, relative to `now`
    #[must_use]
    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_refresh)
    }

    /// Check version and staleness the way every reader must
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::VersionMismatch`] or [`BeaconError::Stale`].
    pub fn validate(&self, now: i64, stale_after: Duration) -> Result<(), BeaconError> {
        if self.version_major != BEACON_VERSION_MAJOR {
            return Err(BeaconError::VersionMismatch {
                found: self.version_major,
                expected: BEACON_VERSION_MAJOR,
            });
        }
        let age_secs = self.age_secs(now);
        if age_secs > i64::try_from(stale_after.as_secs()).unwrap_or(i64::MAX) {
            return Err(BeaconError::Stale { age_secs });
        }
        Ok(())
    }
}

#[repr(C)]
struct SharedRecord {
    version_major: AtomicU16,
    version_minor: AtomicU16,
    #[allow(dead_code, reason = "Keeps clock_identity at offset 8 in the shared layout")]
    reserved: AtomicU32,
    clock_identity: AtomicU64,
    last_refresh: AtomicI64,
}

impl SharedRecord {
    fn snapshot(&self) -> BeaconRecord {
        let last_refresh = self.last_refresh.load(Ordering::Acquire);
        BeaconRecord {
            version_major: self.version_major.load(Ordering::Relaxed),
            version_minor: self.version_minor.load(Ordering::Relaxed),
            clock_identity: self.clock_identity.load(Ordering::Relaxed),
            last_refresh,
        }
    }
}

const RECORD_LEN: NonZeroUsize = match NonZeroUsize::new(size_of::<SharedRecord>()) {
    Some(len) => len,
    None => panic!("beacon record must not be zero-sized"),
};

/// A mapping of one `SharedRecord`, unmapped on drop
struct Mapping {
    ptr: NonNull<SharedRecord>,
}

// SAFETY: the mapping is plain shared memory accessed only through atomics.
unsafe impl Send for Mapping {}
// SAFETY: as above; concurrent access goes through atomics.
unsafe impl Sync for Mapping {}

impl Mapping {
    fn new(file: &File, writable: bool) -> Result<Self, BeaconError> {
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };
        // SAFETY: fresh mapping of a segment at least RECORD_LEN long (checked
        // or set by the caller); no existing Rust memory is aliased.
        let ptr = unsafe { mmap(None, RECORD_LEN, prot, MapFlags::MAP_SHARED, file, 0) }?;
        Ok(Self { ptr: ptr.cast() })
    }

    fn record(&self) -> &SharedRecord {
        // SAFETY: the pointer is a live, page-aligned mapping of RECORD_LEN
        // bytes for as long as `self` exists, and all fields are atomics.
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly what `mmap` returned; no references
        // outlive `self`.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), RECORD_LEN.get()) } {
            tracing::warn!("Failed to unmap presence beacon: {}", e);
        }
    }
}

/// Writable beacon owned by a running daemon
///
/// Dropping it unmaps and unlinks the segment.
pub struct PresenceBeacon {
    name: String,
    mapping: Option<Mapping>,
    linked: bool,
}

impl std::fmt::Debug for PresenceBeacon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBeacon")
            .field("name", &self.name)
            .field("published", &self.mapping.is_some())
            .field("linked", &self.linked)
            .finish()
    }
}

impl PresenceBeacon {
    /// Exclusively create the beacon and publish `clock_identity`.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::AlreadyExists`] if a segment with this name
    /// exists, [`BeaconError::PermissionDenied`] if the OS refuses, and
    /// `Os`/`Io` for other failures. Nothing is left behind on failure.
    pub fn create(name: &str, clock_identity: u64) -> Result<Self, BeaconError> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(BeaconError::from_errno)?;

        // From here on the segment is ours; unlink it on any failure.
        let mut beacon = Self {
            name: name.to_string(),
            mapping: None,
            linked: true,
        };

        let file = File::from(fd);
        file.set_len(RECORD_LEN.get() as u64)?;
        let mapping = Mapping::new(&file, true)?;

        let record = mapping.record();
        record
            .version_major
            .store(BEACON_VERSION_MAJOR, Ordering::Relaxed);
        record
            .version_minor
            .store(BEACON_VERSION_MINOR, Ordering::Relaxed);
        record.clock_identity.store(clock_identity, Ordering::Relaxed);
        // Timestamp last: it publishes the fields above.
        record.last_refresh.store(unix_now(), Ordering::Release);

        beacon.mapping = Some(mapping);
        tracing::info!(
            "Presence beacon {} published, clock=0x{:016X}",
            name,
            clock_identity
        );
        Ok(beacon)
    }

    /// Create the beacon, first removing a leftover segment that no reader
    /// would accept (stale, incompatible or truncated).
    ///
    /// A live, compatible segment is left alone.
    ///
    /// # Errors
    ///
    /// Same as [`PresenceBeacon::create`].
    pub fn create_or_reclaim(
        name: &str,
        clock_identity: u64,
        stale_after: Duration,
    ) -> Result<Self, BeaconError> {
        match Self::create(name, clock_identity) {
            Err(BeaconError::AlreadyExists) => match discover(name, stale_after) {
                Err(e) if e.is_absent() && !matches!(e, BeaconError::NotFound) => {
                    tracing::warn!("Reclaiming leftover presence beacon {}: {}", name, e);
                    unlink(name)?;
                    Self::create(name, clock_identity)
                }
                Err(BeaconError::NotFound) => Self::create(name, clock_identity),
                _ => Err(BeaconError::AlreadyExists),
            },
            other => other,
        }
    }

    /// Shared memory name of this beacon
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current record contents
    #[must_use]
    pub fn record(&self) -> Option<BeaconRecord> {
        self.mapping.as_ref().map(|m| m.record().snapshot())
    }

    /// Refresh the timestamp; no other field changes after creation
    pub fn refresh(&self) {
        if let Some(mapping) = &self.mapping {
            mapping
                .record()
                .last_refresh
                .store(unix_now(), Ordering::Release);
        }
    }

    /// Unmap and unlink the segment. Idempotent.
    pub fn destroy(&mut self) {
        drop(self.mapping.take());
        if !std::mem::take(&mut self.linked) {
            return;
        }
        match unlink(&self.name) {
            Ok(()) => tracing::info!("Presence beacon {} removed", self.name),
            Err(e) => tracing::warn!("Failed to unlink presence beacon {}: {}", self.name, e),
        }
    }
}

impl Drop for PresenceBeacon {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Read and validate the beacon named `name`.
///
/// # Errors
///
/// Returns [`BeaconError::NotFound`] if there is no segment,
/// [`BeaconError::Incomplete`], [`BeaconError::VersionMismatch`] or
/// [`BeaconError::Stale`] when a reader must treat it as absent, and
/// `PermissionDenied`/`Os`/`Io` when it cannot be read at all.
pub fn discover(name: &str, stale_after: Duration) -> Result<BeaconRecord, BeaconError> {
    let record = read(name)?;
    record.validate(unix_now(), stale_after)?;
    Ok(record)
}

/// Read the beacon without validating version or staleness.
///
/// # Errors
///
/// See [`discover`].
pub fn read(name: &str) -> Result<BeaconRecord, BeaconError> {
    let fd = shm_open(name, OFlag::O_RDONLY, Mode::empty()).map_err(BeaconError::from_errno)?;
    let file = File::from(fd);

    let size = file.metadata()?.len();
    if size < RECORD_LEN.get() as u64 {
        return Err(BeaconError::Incomplete { size });
    }

    let mapping = Mapping::new(&file, false)?;
    Ok(mapping.record().snapshot())
}

/// Remove the named segment; a missing segment is not an error.
///
/// # Errors
///
/// Returns the OS error for anything other than `ENOENT`.
pub fn unlink(name: &str) -> Result<(), BeaconError> {
    match shm_unlink(name) {
        Ok(()) | Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(BeaconError::from_errno(e)),
    }
}

fn unix_now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}
