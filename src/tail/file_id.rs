// SPDX-License-Identifier: Apache-2.0

//! Platform file identity: inode on Unix, file index on Windows.
//!
//! The identity survives appends and renames, but a file replaced under the
//! same name gets a new one. A token of `0` means the identity is unknown.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;

/// Opaque identity token for a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(u64);

impl FileId {
    pub const UNKNOWN: FileId = FileId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_known(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability that resolves a file's identity token.
pub trait FileIdentity: Send + Sync + std::fmt::Debug {
    fn of_file(&self, file: &File) -> io::Result<FileId>;

    fn of_path(&self, path: &Path) -> io::Result<FileId> {
        let file = File::open(path)?;
        self.of_file(&file)
    }
}

/// The identity implementation for the current platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformIdentity;

impl FileIdentity for PlatformIdentity {
    #[cfg(unix)]
    fn of_file(&self, file: &File) -> io::Result<FileId> {
        use std::os::unix::fs::MetadataExt;

        Ok(FileId(file.metadata()?.ino()))
    }

    #[cfg(unix)]
    fn of_path(&self, path: &Path) -> io::Result<FileId> {
        use std::os::unix::fs::MetadataExt;

        Ok(FileId(std::fs::metadata(path)?.ino()))
    }

    #[cfg(windows)]
    fn of_file(&self, file: &File) -> io::Result<FileId> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            BY_HANDLE_FILE_INFORMATION, GetFileInformationByHandle,
        };

        let handle = file.as_raw_handle() as HANDLE;
        let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };

        let result = unsafe { GetFileInformationByHandle(handle, &mut info) };
        if result == 0 {
            return Err(io::Error::last_os_error());
        }

        let index = ((info.nFileIndexHigh as u64) << 32) | (info.nFileIndexLow as u64);
        Ok(FileId(index))
    }

    #[cfg(not(any(unix, windows)))]
    fn of_file(&self, _file: &File) -> io::Result<FileId> {
        Ok(FileId::UNKNOWN)
    }
}
