// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backing streams for [crate::ZipArchive].

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Random-access backing store for an archive.
///
/// Reads and seeks are always required. Writes are optional: a read-only
/// stream reports `false` from [Backing::is_writable] and the archive then
/// permits only queries and reads.
pub trait Backing: Read + Write + Seek {
    /// Whether this stream accepts writes.
    fn is_writable(&self) -> bool;

    /// Shrinks the stream to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

/// A [File]-backed stream. Writability is fixed when the file is opened.
pub struct FileBacking {
    file: File,
    writable: bool,
}

impl FileBacking {
    /// Opens `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            writable: true,
        })
    }

    /// Opens `path` for reading only. Mutating the archive will fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            file,
            writable: false,
        })
    }
}

impl Read for FileBacking {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileBacking {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileBacking {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Backing for FileBacking {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }
}

/// An in-memory stream, mainly useful for building archives without touching
/// the filesystem and for tests.
pub struct MemoryBacking {
    cursor: Cursor<Vec<u8>>,
    writable: bool,
}

impl MemoryBacking {
    /// Wraps `data` in a writable stream.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
            writable: true,
        }
    }

    /// Wraps `data` in a stream that rejects writes.
    pub fn read_only(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
            writable: false,
        }
    }

    /// Consumes the stream, returning the underlying bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryBacking {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryBacking {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream is read-only",
            ));
        }
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.cursor.flush()
    }
}

impl Seek for MemoryBacking {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl Backing for MemoryBacking {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream is read-only",
            ));
        }
        self.cursor.get_mut().truncate(len as usize);
        Ok(())
    }
}
