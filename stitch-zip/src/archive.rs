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

//! The incremental archive engine.
//!
//! An open archive keeps an in-memory index of central directory records plus
//! a single watermark, `post_files_offset`: the first byte past the payload
//! of the last entry. Everything before the watermark is a valid sequence of
//! local-header + payload pairs; everything after it is scratch space until
//! [ZipArchive::save] re-emits the central directory and trailer.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, LE};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use stitch_common::{Result, StitchError};

use crate::records::{
    check_version_needed, CentralRecord, CompressionMethod, DosDateTime, EndOfCentralDir,
    LocalHeader, DATA_DESCRIPTOR_SIG, END_OF_CENTRAL_DIR_SIG, FLAG_DATA_DESCRIPTOR,
    FLAG_UTF8_NAME, VERSION_NEEDED_TO_EXTRACT,
};
use crate::stream::Backing;

/// Compression applied to a newly added entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    /// No compression. Required for entries whose on-disk bytes must match
    /// their logical bytes exactly, such as the v1 signature files.
    Store,
    /// Raw DEFLATE at the given level, 0 (fastest) through 9 (best).
    Deflate(u32),
}

/// Replaces backslashes with forward slashes and strips one leading slash.
/// Every name entering the public API goes through this.
pub fn normalize_name(name: &str) -> String {
    let replaced = name.replace('\\', "/");
    match replaced.strip_prefix('/') {
        Some(stripped) => stripped.to_owned(),
        None => replaced,
    }
}

/// An APK/ZIP archive opened over a random-access stream.
pub struct ZipArchive<S: Backing> {
    stream: S,
    entries: BTreeMap<String, CentralRecord>,
    post_files_offset: u64,
    timestamp: DosDateTime,
}

impl<S: Backing> ZipArchive<S> {
    /// Opens an existing archive.
    ///
    /// Parses the End Of Central Directory record and the central directory
    /// into the index and locates the watermark after the last entry's
    /// payload. On a writable stream the stale central directory and trailer
    /// are truncated away immediately, so a crash mid-edit never leaves a
    /// directory that disagrees with the entries.
    pub fn open(mut stream: S) -> Result<Self> {
        let stream_len = stream
            .seek(SeekFrom::End(0))
            .map_err(|_| StitchError::StreamUnsuitable("backing stream is not seekable"))?;
        if stream_len < EndOfCentralDir::MIN_SIZE {
            return Err(StitchError::BadFormat(
                "no end of central directory record".into(),
            ));
        }

        // The trailer may be followed by a comment of up to 65535 bytes.
        // Pull the whole candidate window into memory and scan backwards for
        // the signature, starting at the position a comment-free trailer
        // would occupy.
        let window = EndOfCentralDir::MIN_SIZE + u16::MAX as u64;
        let tail_start = stream_len.saturating_sub(window);
        stream.seek(SeekFrom::Start(tail_start))?;
        let mut tail = Vec::with_capacity((stream_len - tail_start) as usize);
        stream.read_to_end(&mut tail)?;

        let latest = tail.len() - EndOfCentralDir::MIN_SIZE as usize;
        let eocd_offset = (0..=latest)
            .rev()
            .find(|&i| tail[i..i + 4] == END_OF_CENTRAL_DIR_SIG.to_le_bytes())
            .ok_or_else(|| StitchError::BadFormat("no end of central directory record".into()))?;
        let eocd = EndOfCentralDir::read(&mut Cursor::new(&tail[eocd_offset..]))?;

        if eocd.disk_number != 0
            || eocd.cd_start_disk != 0
            || eocd.disk_records != eocd.total_records
        {
            return Err(StitchError::Unsupported("split archive".into()));
        }
        if eocd.total_records == u16::MAX
            || eocd.cd_size == u32::MAX
            || eocd.cd_offset == u32::MAX
        {
            return Err(StitchError::Unsupported("ZIP64 archive".into()));
        }

        stream.seek(SeekFrom::Start(eocd.cd_offset as u64))?;
        let mut entries = BTreeMap::new();
        for _ in 0..eocd.total_records {
            let mut record = CentralRecord::read(&mut stream)?;
            check_version_needed(record.version_needed)?;
            if record.compressed_size == u32::MAX || record.uncompressed_size == u32::MAX {
                return Err(StitchError::Unsupported("ZIP64 entry".into()));
            }
            if record.file_name.is_empty() {
                return Err(StitchError::BadFormat("empty entry name".into()));
            }
            record.file_name = normalize_name(&record.file_name);
            let name = record.file_name.clone();
            if entries.insert(name.clone(), record).is_some() {
                return Err(StitchError::BadFormat(format!(
                    "duplicate entry name `{name}`"
                )));
            }
        }

        let post_files_offset = match entries
            .values()
            .max_by_key(|record| record.local_header_offset)
        {
            Some(last) => end_of_entry(&mut stream, last)?,
            None => 0,
        };

        if stream.is_writable() {
            stream.truncate(post_files_offset)?;
        }

        Ok(Self {
            stream,
            entries,
            post_files_offset,
            timestamp: DosDateTime::now(),
        })
    }

    /// Whether the backing stream accepts mutations.
    pub fn is_writable(&self) -> bool {
        self.stream.is_writable()
    }

    /// Overrides the timestamp stamped onto newly added entries. Useful for
    /// reproducible output; defaults to the local time at open.
    pub fn set_timestamp(&mut self, timestamp: DosDateTime) {
        self.timestamp = timestamp;
    }

    /// The first byte past the last entry's payload; where new entries and,
    /// at save time, the signing block are written.
    pub fn post_files_offset(&self) -> u64 {
        self.post_files_offset
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over entry names in lexicographic order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns true if and only if an entry exists with the given name.
    pub fn contains_file(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    /// The stored CRC-32 of the entry's uncompressed bytes.
    pub fn crc32(&self, name: &str) -> Result<u32> {
        let name = normalize_name(name);
        self.entries
            .get(&name)
            .map(|record| record.crc32)
            .ok_or(StitchError::NotFound(name))
    }

    /// Opens a bounded reader over the entry's decompressed bytes.
    ///
    /// The reader borrows the archive's stream, so no other archive
    /// operation can run while it is alive.
    pub fn open_reader(&mut self, name: &str) -> Result<EntryReader<'_, S>> {
        let name = normalize_name(name);
        let record = self
            .entries
            .get(&name)
            .ok_or(StitchError::NotFound(name))?;
        let method = record.method;
        let compressed_size = record.compressed_size as u64;

        self.stream
            .seek(SeekFrom::Start(record.local_header_offset as u64))?;
        // The local header is authoritative only for its own length; sizes
        // come from the central record.
        let _ = LocalHeader::read(&mut self.stream)?;
        let bounded = (&mut self.stream).take(compressed_size);

        match method {
            CompressionMethod::Stored => Ok(EntryReader(ReaderKind::Stored(bounded))),
            CompressionMethod::Deflated => Ok(EntryReader(ReaderKind::Deflated(
                DeflateDecoder::new(bounded),
            ))),
            CompressionMethod::Unsupported(method) => Err(StitchError::Unsupported(format!(
                "compression method {method}"
            ))),
        }
    }

    /// Reads an entry's decompressed bytes into memory.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        let mut reader = self.open_reader(name)?;
        io::copy(&mut reader, &mut contents)?;
        Ok(contents)
    }

    /// Appends an entry at the watermark, replacing any previous entry with
    /// the same name. The CRC-32 is computed while streaming `source`, so the
    /// source length does not need to be known up front.
    pub fn add_file<R: Read>(
        &mut self,
        name: &str,
        source: R,
        compression: Compression,
    ) -> Result<()> {
        if !self.stream.is_writable() {
            return Err(StitchError::ReadOnly);
        }
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(StitchError::BadFormat("empty entry name".into()));
        }
        if name.len() > u16::MAX as usize {
            return Err(StitchError::Unsupported("entry name too long".into()));
        }
        self.entries.remove(&name);

        let header_offset = self.post_files_offset;
        let header_offset32: u32 = header_offset
            .try_into()
            .map_err(|_| StitchError::Unsupported("archive larger than 4 GiB".into()))?;

        // Reserve the header slot; sizes and CRC are not known until the
        // payload has been streamed.
        let data_start = header_offset + LocalHeader::FIXED_SIZE + name.len() as u64;
        self.stream.seek(SeekFrom::Start(data_start))?;

        let (method, crc32, uncompressed_size) = match compression {
            Compression::Store => {
                let (crc, copied) = copy_with_crc(source, &mut self.stream)?;
                (CompressionMethod::Stored, crc, copied)
            }
            Compression::Deflate(level) => {
                let mut encoder = DeflateEncoder::new(
                    &mut self.stream,
                    flate2::Compression::new(level.min(9)),
                );
                let (crc, copied) = copy_with_crc(source, &mut encoder)?;
                encoder.finish()?;
                (CompressionMethod::Deflated, crc, copied)
            }
        };

        let data_end = self.stream.stream_position()?;
        let compressed_size: u32 = (data_end - data_start)
            .try_into()
            .map_err(|_| StitchError::Unsupported("entry larger than 4 GiB".into()))?;
        let uncompressed_size: u32 = uncompressed_size
            .try_into()
            .map_err(|_| StitchError::Unsupported("entry larger than 4 GiB".into()))?;

        let header = LocalHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: FLAG_UTF8_NAME,
            method,
            timestamp: self.timestamp,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name: name.clone(),
            extra_field: Vec::new(),
        };
        self.stream.seek(SeekFrom::Start(header_offset))?;
        header.write(&mut self.stream)?;

        self.entries.insert(
            name.clone(),
            CentralRecord {
                version_made_by: 0,
                version_needed: VERSION_NEEDED_TO_EXTRACT,
                flags: FLAG_UTF8_NAME,
                method,
                timestamp: self.timestamp,
                crc32,
                compressed_size,
                uncompressed_size,
                disk_number_start: 0,
                internal_attributes: 0,
                external_attributes: 0,
                local_header_offset: header_offset32,
                file_name: name,
                extra_field: Vec::new(),
                comment: Vec::new(),
            },
        );
        self.post_files_offset = data_end;
        Ok(())
    }

    /// Drops an entry from the index, returning whether it was present.
    ///
    /// The payload bytes are left in place; the space is reclaimed only when
    /// the archive is rewritten wholesale, never by moving the watermark.
    pub fn remove_file(&mut self, name: &str) -> Result<bool> {
        if !self.stream.is_writable() {
            return Err(StitchError::ReadOnly);
        }
        Ok(self.entries.remove(&normalize_name(name)).is_some())
    }

    /// Serialises the central directory for the current index.
    pub fn central_directory_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for record in self.entries.values() {
            record.write(&mut bytes)?;
        }
        Ok(bytes)
    }

    /// Builds the trailer record for a central directory of `cd_size` bytes
    /// placed at `cd_offset`.
    pub fn end_record(&self, cd_size: usize, cd_offset: u64) -> Result<EndOfCentralDir> {
        let records: u16 = self
            .entries
            .len()
            .try_into()
            .map_err(|_| StitchError::Unsupported("too many entries".into()))?;
        if records == u16::MAX {
            // 0xFFFF is the ZIP64 marker value
            return Err(StitchError::Unsupported("too many entries".into()));
        }
        Ok(EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            disk_records: records,
            total_records: records,
            cd_size: cd_size
                .try_into()
                .map_err(|_| StitchError::Unsupported("central directory too large".into()))?,
            cd_offset: cd_offset
                .try_into()
                .map_err(|_| StitchError::Unsupported("archive larger than 4 GiB".into()))?,
            comment: Vec::new(),
        })
    }

    /// A reader over the entry region, byte 0 through the watermark.
    pub fn content_reader(&mut self) -> Result<io::Take<&mut S>> {
        self.stream.seek(SeekFrom::Start(0))?;
        Ok((&mut self.stream).take(self.post_files_offset))
    }

    /// Writes the signing block, the central directory and the trailer after
    /// the last entry, completing the archive.
    pub fn save(&mut self, signing_block: &[u8], central_directory: &[u8]) -> Result<()> {
        if !self.stream.is_writable() {
            return Err(StitchError::ReadOnly);
        }
        self.stream.seek(SeekFrom::Start(self.post_files_offset))?;
        self.stream.write_all(signing_block)?;
        let cd_offset = self.stream.stream_position()?;
        self.stream.write_all(central_directory)?;
        let trailer = self.end_record(central_directory.len(), cd_offset)?;
        self.stream.write_all(&trailer.to_bytes())?;
        self.stream.flush()?;
        Ok(())
    }
}

/// Seeks past an entry: local header, payload, and the optional data
/// descriptor. The descriptor's leading signature word is itself optional in
/// the format; a CRC that happens to equal the signature is indistinguishable
/// and accepted.
fn end_of_entry<S: Backing>(stream: &mut S, record: &CentralRecord) -> Result<u64> {
    stream.seek(SeekFrom::Start(record.local_header_offset as u64))?;
    let _ = LocalHeader::read(stream)?;
    let payload_end = stream.stream_position()? + record.compressed_size as u64;
    stream.seek(SeekFrom::Start(payload_end))?;

    if record.flags & FLAG_DATA_DESCRIPTOR != 0 {
        let first_word = stream.read_u32::<LE>()?;
        if first_word == DATA_DESCRIPTOR_SIG {
            let _crc32 = stream.read_u32::<LE>()?;
        }
        let _compressed_size = stream.read_u32::<LE>()?;
        let _uncompressed_size = stream.read_u32::<LE>()?;
    }
    Ok(stream.stream_position()?)
}

// Copies `from` into `to`, returning the ZIP CRC-32 of the copied bytes and
// how many bytes were copied.
fn copy_with_crc<R: Read, W: Write>(mut from: R, to: &mut W) -> Result<(u32, u64)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; 8192];
    let mut copied = 0u64;
    loop {
        let read = from.read(&mut buffer)?;
        if read == 0 {
            break Ok((hasher.finalize(), copied));
        }
        hasher.update(&buffer[..read]);
        to.write_all(&buffer[..read])?;
        copied += read as u64;
    }
}

/// Reader over one entry's decompressed bytes, returned by
/// [ZipArchive::open_reader].
pub struct EntryReader<'a, S: Backing>(ReaderKind<'a, S>);

enum ReaderKind<'a, S: Backing> {
    Stored(io::Take<&'a mut S>),
    Deflated(DeflateDecoder<io::Take<&'a mut S>>),
}

impl<S: Backing> Read for EntryReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            ReaderKind::Stored(inner) => inner.read(buf),
            ReaderKind::Deflated(inner) => inner.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryBacking;
    use byteorder::WriteBytesExt;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    fn empty_zip() -> Vec<u8> {
        EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            disk_records: 0,
            total_records: 0,
            cd_size: 0,
            cd_offset: 0,
            comment: Vec::new(),
        }
        .to_bytes()
    }

    fn open_empty() -> ZipArchive<MemoryBacking> {
        ZipArchive::open(MemoryBacking::new(empty_zip())).unwrap()
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("a/b"), "a/b");
        assert_eq!(normalize_name("/a/b"), "a/b");
        assert_eq!(normalize_name("a\\b"), "a/b");
        assert_eq!(normalize_name("/a\\b"), "a/b");
        // Only a single leading slash is stripped.
        assert_eq!(normalize_name("//a"), "/a");
    }

    #[test]
    fn rejects_garbage() {
        let result = ZipArchive::open(MemoryBacking::new(b"not a zip not a zip not a".to_vec()));
        assert!(matches!(result, Err(StitchError::BadFormat(_))));
    }

    #[test]
    fn rejects_tiny_stream() {
        let result = ZipArchive::open(MemoryBacking::new(b"not a zip".to_vec()));
        assert!(matches!(result, Err(StitchError::BadFormat(_))));
    }

    #[test]
    fn rejects_zip64_marker_trailer() {
        let mut eocd = Vec::new();
        eocd.write_u32::<LE>(END_OF_CENTRAL_DIR_SIG).unwrap();
        eocd.write_u16::<LE>(0).unwrap();
        eocd.write_u16::<LE>(0).unwrap();
        eocd.write_u16::<LE>(0xffff).unwrap();
        eocd.write_u16::<LE>(0xffff).unwrap();
        eocd.write_u32::<LE>(0).unwrap();
        eocd.write_u32::<LE>(0).unwrap();
        eocd.write_u16::<LE>(0).unwrap();

        let result = ZipArchive::open(MemoryBacking::new(eocd));
        assert!(matches!(result, Err(StitchError::Unsupported(_))));
    }

    #[test]
    fn rejects_unsupported_version() {
        // One entry whose central record demands ZIP 4.5.
        let record = CentralRecord {
            version_made_by: 0,
            version_needed: 45,
            flags: 0,
            method: CompressionMethod::Stored,
            timestamp: DosDateTime::from_parts(2024, 1, 1, 0, 0, 0),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            file_name: "a".into(),
            extra_field: Vec::new(),
            comment: Vec::new(),
        };
        let mut cd = Vec::new();
        record.write(&mut cd).unwrap();

        let mut data = cd.clone();
        let trailer = EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            disk_records: 1,
            total_records: 1,
            cd_size: cd.len() as u32,
            cd_offset: 0,
            comment: Vec::new(),
        };
        data.extend_from_slice(&trailer.to_bytes());

        let result = ZipArchive::open(MemoryBacking::new(data));
        assert!(matches!(result, Err(StitchError::Unsupported(_))));
    }

    #[test]
    fn add_then_read_back() {
        let mut archive = open_empty();
        archive
            .add_file("hello.txt", &b"hi"[..], Compression::Store)
            .unwrap();

        assert!(archive.contains_file("hello.txt"));
        assert_eq!(archive.read_file("hello.txt").unwrap(), b"hi");
        // 30-byte header + 9-byte name + 2-byte payload
        assert_eq!(archive.post_files_offset(), 41);
    }

    #[test]
    fn crc_of_known_vector() {
        let mut archive = open_empty();
        archive
            .add_file("x", &b"123456789"[..], Compression::Store)
            .unwrap();
        assert_eq!(archive.crc32("x").unwrap(), 0xCBF43926);
    }

    #[test]
    fn crc_of_missing_entry() {
        let archive = open_empty();
        assert!(matches!(
            archive.crc32("nope"),
            Err(StitchError::NotFound(_))
        ));
    }

    #[test]
    fn deflate_round_trip() {
        let mut payload = vec![0u8; 64 * 1024];
        StdRng::seed_from_u64(7).fill_bytes(&mut payload);

        let mut archive = open_empty();
        archive
            .add_file("y", payload.as_slice(), Compression::Deflate(6))
            .unwrap();

        let read_back = archive.read_file("y").unwrap();
        assert_eq!(read_back, payload);

        let mut independent = crc32fast::Hasher::new();
        independent.update(&payload);
        assert_eq!(archive.crc32("y").unwrap(), independent.finalize());
    }

    #[test]
    fn overwrite_keeps_one_entry() {
        let mut archive = open_empty();
        archive
            .add_file("n", &b"first"[..], Compression::Store)
            .unwrap();
        archive
            .add_file("n", &b"second"[..], Compression::Store)
            .unwrap();

        assert_eq!(archive.entry_count(), 1);
        assert_eq!(archive.read_file("n").unwrap(), b"second");
    }

    #[test]
    fn remove_twice() {
        let mut archive = open_empty();
        archive
            .add_file("gone", &b"x"[..], Compression::Store)
            .unwrap();

        assert!(archive.remove_file("gone").unwrap());
        assert!(!archive.remove_file("gone").unwrap());
        assert!(!archive.contains_file("gone"));
    }

    #[test]
    fn names_normalize_across_operations() {
        let mut archive = open_empty();
        archive
            .add_file("/a\\b", &b"data"[..], Compression::Store)
            .unwrap();

        assert!(archive.contains_file("a/b"));
        assert!(archive.contains_file("/a/b"));
        assert!(archive.contains_file("a\\b"));
    }

    #[test]
    fn read_only_stream_rejects_mutation() {
        let mut archive = ZipArchive::open(MemoryBacking::read_only(empty_zip())).unwrap();
        assert!(matches!(
            archive.add_file("a", &b"x"[..], Compression::Store),
            Err(StitchError::ReadOnly)
        ));
        assert!(matches!(
            archive.remove_file("a"),
            Err(StitchError::ReadOnly)
        ));
    }

    #[test]
    fn empty_names_rejected() {
        let mut archive = open_empty();
        assert!(matches!(
            archive.add_file("", &b"x"[..], Compression::Store),
            Err(StitchError::BadFormat(_))
        ));
        assert!(matches!(
            archive.add_file("/", &b"x"[..], Compression::Store),
            Err(StitchError::BadFormat(_))
        ));
    }

    // The bytes up to the watermark must always re-parse as local header +
    // payload pairs matching the index.
    #[test]
    fn entry_region_stays_parseable() {
        let mut archive = open_empty();
        archive
            .add_file("one", &b"first entry"[..], Compression::Store)
            .unwrap();
        archive
            .add_file("two", &b"second entry"[..], Compression::Deflate(6))
            .unwrap();
        archive
            .add_file("one", &b"replaced"[..], Compression::Store)
            .unwrap();
        archive.remove_file("two").unwrap();

        let watermark = archive.post_files_offset();
        let mut region = archive.content_reader().unwrap();
        let mut bytes = Vec::new();
        region.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, watermark);

        let mut cursor = Cursor::new(&bytes);
        let mut seen = Vec::new();
        while cursor.position() < watermark {
            let header = LocalHeader::read(&mut cursor).unwrap();
            cursor.set_position(cursor.position() + header.compressed_size as u64);
            seen.push(header.file_name);
        }
        assert_eq!(cursor.position(), watermark);
        // Stale payloads ("one" v1, removed "two") still parse; the live
        // names must all appear with their final offsets.
        for name in archive.entry_names() {
            assert!(seen.iter().any(|n| n == name));
        }
    }

    #[test]
    fn reopen_after_save() {
        let mut archive = open_empty();
        archive
            .add_file("keep/this.txt", &b"payload"[..], Compression::Deflate(6))
            .unwrap();
        let cd = archive.central_directory_bytes().unwrap();
        archive.save(&[], &cd).unwrap();
        let bytes = archive.stream.into_inner();

        let mut reopened = ZipArchive::open(MemoryBacking::new(bytes)).unwrap();
        assert!(reopened.contains_file("keep/this.txt"));
        assert_eq!(reopened.read_file("keep/this.txt").unwrap(), b"payload");
    }

    // An entry flagged as having a data descriptor, in the signed form.
    #[test]
    fn data_descriptor_walk() {
        let payload = b"descriptor entry";
        let mut data = Vec::new();
        let header = LocalHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: FLAG_DATA_DESCRIPTOR,
            method: CompressionMethod::Stored,
            timestamp: DosDateTime::from_parts(2024, 1, 1, 0, 0, 0),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: "dd".into(),
            extra_field: Vec::new(),
        };
        header.write(&mut data).unwrap();
        data.extend_from_slice(payload);

        let mut crc = crc32fast::Hasher::new();
        crc.update(payload);
        let crc = crc.finalize();
        data.write_u32::<LE>(DATA_DESCRIPTOR_SIG).unwrap();
        data.write_u32::<LE>(crc).unwrap();
        data.write_u32::<LE>(payload.len() as u32).unwrap();
        data.write_u32::<LE>(payload.len() as u32).unwrap();
        let expected_watermark = data.len() as u64;

        let record = CentralRecord {
            version_made_by: 0,
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: FLAG_DATA_DESCRIPTOR,
            method: CompressionMethod::Stored,
            timestamp: DosDateTime::from_parts(2024, 1, 1, 0, 0, 0),
            crc32: crc,
            compressed_size: payload.len() as u32,
            uncompressed_size: payload.len() as u32,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            file_name: "dd".into(),
            extra_field: Vec::new(),
            comment: Vec::new(),
        };
        let cd_offset = data.len() as u32;
        let mut cd = Vec::new();
        record.write(&mut cd).unwrap();
        data.extend_from_slice(&cd);
        let trailer = EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            disk_records: 1,
            total_records: 1,
            cd_size: cd.len() as u32,
            cd_offset,
            comment: Vec::new(),
        };
        data.extend_from_slice(&trailer.to_bytes());

        let mut archive = ZipArchive::open(MemoryBacking::new(data)).unwrap();
        assert_eq!(archive.post_files_offset(), expected_watermark);
        assert_eq!(archive.read_file("dd").unwrap(), payload);
    }

    #[test]
    fn file_backed_round_trip() {
        use crate::stream::FileBacking;

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), empty_zip()).unwrap();

        let mut archive = ZipArchive::open(FileBacking::open(file.path()).unwrap()).unwrap();
        archive
            .add_file("f.txt", &b"file backed"[..], Compression::Store)
            .unwrap();
        let cd = archive.central_directory_bytes().unwrap();
        archive.save(&[], &cd).unwrap();
        drop(archive);

        let backing = FileBacking::open_read_only(file.path()).unwrap();
        let mut reopened = ZipArchive::open(backing).unwrap();
        assert_eq!(reopened.read_file("f.txt").unwrap(), b"file backed");
    }

    #[test]
    fn duplicate_names_rejected_at_open() {
        let mut archive = open_empty();
        archive
            .add_file("dup", &b"a"[..], Compression::Store)
            .unwrap();
        let mut cd = archive.central_directory_bytes().unwrap();
        let copy = cd.clone();
        cd.extend_from_slice(&copy);

        // Forge a trailer claiming two records pointing at the same name.
        let mut data = Vec::new();
        let mut region = archive.content_reader().unwrap();
        region.read_to_end(&mut data).unwrap();
        let cd_offset = data.len() as u32;
        data.extend_from_slice(&cd);
        let trailer = EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            disk_records: 2,
            total_records: 2,
            cd_size: cd.len() as u32,
            cd_offset,
            comment: Vec::new(),
        };
        data.extend_from_slice(&trailer.to_bytes());

        let result = ZipArchive::open(MemoryBacking::new(data));
        assert!(matches!(result, Err(StitchError::BadFormat(_))));
    }
}
