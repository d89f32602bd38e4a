// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Read-only [sysfs] access utilities.
//!
//! Topology discovery only ever reads from sysfs, but it reads a lot of symlinks and a lot of
//! tiny attribute files.
//! This crate keeps those reads honest: every path is canonicalized, confirmed to live on a
//! mounted sysfs, and confirmed to be valid UTF-8 before anybody gets to look at it.
//!
//! [sysfs]: https://www.kernel.org/doc/Documentation/filesystems/sysfs.txt

#![deny(clippy::pedantic, clippy::unwrap_used)]

use std::io::Read;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tracing::{debug, error, info};

/// Errors which might occur when accessing sysfs directories
#[derive(Debug, thiserror::Error)]
pub enum SysfsErr {
    /// No sysfs mount could be found (or more than one was found).
    #[error("no usable sysfs mount found")]
    NotMounted,
    /// The path is not under a mounted sysfs and therefore does not qualify as a [`SysfsPath`].
    #[error("path {0:?} is not under sysfs")]
    PathNotUnderSysfs(PathBuf),
    /// Some [`std::io::Error`] error occurred
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Invalid UTF-8 in a path under sysfs.
    ///
    /// The kernel just uses ascii byte strings for sysfs, so you should never see this
    /// error under healthy conditions.
    ///
    /// This variant deliberately does not carry the offending name.
    /// Injecting arbitrary bytes into a system log is not something we want to help with.
    #[error("path under sysfs is not a valid UTF-8 string")]
    SysfsPathIsNotValidUtf8,
}

impl SysfsErr {
    /// Returns true if this error means "the thing you asked for is simply not there".
    ///
    /// Discovery treats missing entries as normal (absent hardware), and anything else as
    /// worth a warning.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SysfsErr::IoError(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Locate the (single) mounted sysfs.
///
/// The lookup happens once per process.
///
/// # Errors
///
/// [`SysfsErr::NotMounted`] if sysfs is not mounted, or is mounted at more than one location.
pub fn sysfs_root() -> Result<&'static SysfsPath, SysfsErr> {
    static SYSFS: LazyLock<Option<SysfsPath>> = LazyLock::new(|| {
        let sysfs_mounts: Vec<_> = match procfs::mounts() {
            Ok(mounts) => mounts
                .into_iter()
                .filter(|mount| mount.fs_vfstype == "sysfs")
                .collect(),
            Err(err) => {
                error!("unable to read mount table: {err}");
                return None;
            }
        };
        let sysfs_path = match sysfs_mounts.as_slice() {
            [] => {
                error!("sysfs is not mounted: hardware discovery is unavailable");
                return None;
            }
            [mount] => mount.fs_file.clone(),
            _ => {
                error!(
                    "suspicious configuration found: sysfs is mounted at more than one location. Filesystems found at {sysfs_mounts:#?}"
                );
                return None;
            }
        };
        match SysfsPath::new(&sysfs_path) {
            Ok(root) => {
                info!("found sysfs filesystem at {root}");
                Some(root)
            }
            Err(err) => {
                error!("sysfs mount point {sysfs_path} is unusable: {err}");
                None
            }
        }
    });
    SYSFS.as_ref().ok_or(SysfsErr::NotMounted)
}

/// Path which is promised to
///
/// 1. exist under a mounted sysfs at the time of creation,
/// 2. be both absolute and canonical,
/// 3. be both safely and correctly represented as a valid UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SysfsPath(PathBuf);

impl SysfsPath {
    /// Create a new `SysfsPath` from a path.
    ///
    /// <div class="note">
    ///
    /// The path will be canonicalized prior to any other checks, so passing paths to symlinks here
    /// is completely fine (sysfs uses a lot of symlinks).
    /// </div>
    ///
    /// # Errors
    ///
    /// - If the canonicalized path is not under sysfs, an error is returned.
    /// - If the path is under sysfs but is (somehow) not a valid UTF-8 string, an error is returned.
    /// - io errors (such as permission denied or not found) can also occur
    pub fn new(path: impl AsRef<Path>) -> Result<SysfsPath, SysfsErr> {
        let path = path.as_ref();
        if path.as_os_str().to_str().is_none() {
            return Err(SysfsErr::SysfsPathIsNotValidUtf8);
        }
        let path = std::fs::canonicalize(path)?;
        if path.as_os_str().to_str().is_none() {
            return Err(SysfsErr::SysfsPathIsNotValidUtf8);
        }
        match nix::sys::statfs::statfs(&path) {
            Ok(stats) => {
                if stats.filesystem_type() == nix::sys::statfs::SYSFS_MAGIC {
                    Ok(SysfsPath(path))
                } else {
                    Err(SysfsErr::PathNotUnderSysfs(path))
                }
            }
            Err(errno) => Err(SysfsErr::IoError(errno.into())),
        }
    }

    /// Get an immutable reference to the inner [`PathBuf`].
    #[must_use]
    pub fn inner(&self) -> &PathBuf {
        &self.0
    }

    /// The final component of this path (e.g. `0000:17:00.0` for a PCI device directory).
    #[must_use]
    pub fn file_name(&self) -> &str {
        match self.0.file_name() {
            Some(name) => name.to_str().unwrap_or_else(|| unreachable!()),
            None => "",
        }
    }

    /// Construct a path relative to this [`SysfsPath`]
    ///
    /// # Errors
    ///
    /// [`SysfsErr`] will occur if
    ///
    /// 1. the child path does not exist
    /// 2. the child path does not resolve to a path in sysfs (e.g. something is bind mounted under sysfs)
    /// 3. [`std::io::Error`] error occurs (e.g. permission denied)
    /// 4. a path is somehow not valid utf-8
    ///
    /// <div class="caution">
    ///
    /// The returned path _will_ be a [`SysfsPath`], but it will not strictly exist under the starting
    /// point: the child may be a symlink which resolves somewhere else in the sysfs.
    /// </div>
    pub fn relative(&self, path: impl AsRef<Path>) -> Result<SysfsPath, SysfsErr> {
        let mut child_path = self.inner().clone();
        child_path.push(path.as_ref());
        SysfsPath::new(child_path)
    }

    /// Read a sysfs attribute file below this directory and return its contents with surrounding
    /// whitespace removed.
    ///
    /// # Errors
    ///
    /// Any [`SysfsErr`] produced while resolving or reading the attribute.
    pub fn read_attr(&self, name: impl AsRef<Path>) -> Result<String, SysfsErr> {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        let mut file = SysfsFile::open(self.inner().join(name.as_ref()), &options)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents.trim().to_string())
    }

    /// List the names of the entries in this directory, sorted.
    ///
    /// # Errors
    ///
    /// - io errors while reading the directory
    /// - [`SysfsErr::SysfsPathIsNotValidUtf8`] if the kernel hands us a non UTF-8 name
    pub fn entries(&self) -> Result<Vec<String>, SysfsErr> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.inner())? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(_) => return Err(SysfsErr::SysfsPathIsNotValidUtf8),
            }
        }
        names.sort();
        debug!("{self} has {} entries", names.len());
        Ok(names)
    }
}

impl AsRef<Path> for SysfsPath {
    fn as_ref(&self) -> &Path {
        self.inner()
    }
}

// this is safe because we have already validated the conversion to UTF-8 in the constructor
impl AsRef<str> for SysfsPath {
    fn as_ref(&self) -> &str {
        self.inner().assert_str()
    }
}

// this is safe because we have already validated the conversion to UTF-8 in the constructor
impl std::fmt::Display for SysfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner().assert_str())
    }
}

/// Trait intended to insist that a value can be represented as valid UTF-8.
///
/// This trait is intended to be used in the situation where deviation from that expectation represents a
/// severe system error and crashing is the only reasonable response.
pub trait AssertAsStr {
    /// Insist that a value can be represented as valid UTF-8 and panic with a deliberately vague error message if not.
    ///
    /// # Panics
    ///
    /// If the conversion fails, all implementations are
    ///
    /// - **required** to panic or abort the process and,
    /// - are **forbidden** from logging the offending value or any value derived from the invalid value.
    fn assert_str(&self) -> &str;
}

/// We insist that path names are valid UTF-8 and immediately panic with a deliberately vague error message if not.
impl AssertAsStr for PathBuf {
    fn assert_str(&self) -> &str {
        match self.as_os_str().to_str() {
            Some(s) => s,
            None => panic!("PathBuf is not valid UTF-8 (this is suspicious)"),
        }
    }
}

/// File which is promised to be under a mounted sysfs, opened for reading.
pub struct SysfsFile(std::fs::File);

impl SysfsFile {
    /// Open a file under a mounted sysfs.
    ///
    /// # Errors
    ///
    /// - If the path leads out of the sysfs mount
    /// - On permissions errors or otherwise invalid file access
    pub fn open(path: impl AsRef<Path>, options: &std::fs::OpenOptions) -> Result<Self, SysfsErr> {
        let path = SysfsPath::new(path.as_ref())?;
        let file = options.open(path.inner()).map_err(SysfsErr::IoError)?;
        match nix::sys::statfs::fstatfs(file.as_fd()) {
            Ok(stat) => {
                if stat.filesystem_type() == nix::sys::statfs::SYSFS_MAGIC {
                    Ok(SysfsFile(file))
                } else {
                    Err(SysfsErr::PathNotUnderSysfs(path.inner().clone()))
                }
            }
            Err(e) => Err(SysfsErr::IoError(e.into())),
        }
    }
}

impl std::io::Read for SysfsFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(test)]
mod test {
    use crate::{SysfsErr, SysfsPath};

    #[test]
    fn missing_path_is_not_found() {
        let err = SysfsPath::new("/this/path/really/should/not/exist").unwrap_err();
        assert!(err.is_not_found(), "unexpected error {err:?}");
    }

    #[test]
    fn temp_dir_is_not_sysfs() {
        match SysfsPath::new(std::env::temp_dir()) {
            Err(SysfsErr::PathNotUnderSysfs(path)) => assert!(path.is_absolute()),
            other => panic!("temp dir should never qualify as sysfs: {other:?}"),
        }
    }

    #[test]
    fn not_found_is_specific() {
        assert!(!SysfsErr::NotMounted.is_not_found());
        assert!(!SysfsErr::SysfsPathIsNotValidUtf8.is_not_found());
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!SysfsErr::IoError(denied).is_not_found());
    }
}
