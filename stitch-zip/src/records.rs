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

//! Typed readers and writers for the PKWARE ZIP records: local file header,
//! central directory file header, End Of Central Directory, and the MS-DOS
//! timestamp they embed. All integers are little-endian.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use stitch_common::{Result, StitchError};
use time::OffsetDateTime;

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub const CENTRAL_DIRECTORY_SIG: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

/// Set when a 12- or 16-byte data descriptor follows the entry payload.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Set when the entry name is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 1 << 11;

/// Version 2.0, the feature level needed to extract STORE and DEFLATE
/// entries. Also the highest version this implementation accepts on read.
pub const VERSION_NEEDED_TO_EXTRACT: u16 = 20;

/// Rejects archives requiring a ZIP feature level above 2.0.
pub fn check_version_needed(version: u16) -> Result<()> {
    let feature = version & 0xff;
    let (major, minor) = (feature / 10, feature % 10);
    if major > 2 || (major == 2 && minor > 0) {
        return Err(StitchError::Unsupported(format!(
            "ZIP version needed {major}.{minor}"
        )));
    }
    Ok(())
}

// A record that stops short mid-read is a malformed archive, not an I/O
// failure of the stream itself.
fn read_failed(e: io::Error) -> StitchError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StitchError::BadFormat("truncated record".into())
    } else {
        e.into()
    }
}

/// The compression method of an entry, which may be a method this
/// implementation cannot decompress.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Unsupported(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Unsupported(other) => other,
        }
    }
}

/// An MS-DOS date/time pair: local wall-clock at 2-second granularity,
/// years 1980 through 2107.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Encodes broken-down local time. Out-of-range years clamp to the
    /// representable span; seconds round to the nearest even value.
    pub fn from_parts(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = year.clamp(1980, 2107) as u16;
        let date = ((year - 1980) << 9) | (u16::from(month) << 5) | u16::from(day);
        let two_seconds = ((u16::from(second) + 1) / 2).min(29);
        let time = (u16::from(hour) << 11) | (u16::from(minute) << 5) | two_seconds;
        Self { time, date }
    }

    /// The current local time, falling back to UTC when the local offset
    /// cannot be determined.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::from_parts(
            now.year(),
            u8::from(now.month()),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
        )
    }

    fn read<R: Read>(r: &mut R) -> Result<Self> {
        let time = r.read_u16::<LE>().map_err(read_failed)?;
        let date = r.read_u16::<LE>().map_err(read_failed)?;
        Ok(Self { time, date })
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16::<LE>(self.time)?;
        w.write_u16::<LE>(self.date)?;
        Ok(())
    }
}

/// Local file header, written immediately before each entry's payload.
#[derive(Debug, Clone)]
pub struct LocalHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub timestamp: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: String,
    pub extra_field: Vec<u8>,
}

impl LocalHeader {
    /// Byte length of the fixed-width part, before the name and extra field.
    pub const FIXED_SIZE: u64 = 30;

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let signature = r.read_u32::<LE>().map_err(read_failed)?;
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(StitchError::BadFormat(
                "bad local file header signature".into(),
            ));
        }
        let version_needed = r.read_u16::<LE>().map_err(read_failed)?;
        let flags = r.read_u16::<LE>().map_err(read_failed)?;
        let method = CompressionMethod::from_u16(r.read_u16::<LE>().map_err(read_failed)?);
        let timestamp = DosDateTime::read(r)?;
        let crc32 = r.read_u32::<LE>().map_err(read_failed)?;
        let compressed_size = r.read_u32::<LE>().map_err(read_failed)?;
        let uncompressed_size = r.read_u32::<LE>().map_err(read_failed)?;
        let name_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let extra_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let file_name = read_name(r, name_len)?;
        let extra_field = read_exact_vec(r, extra_len)?;
        Ok(Self {
            version_needed,
            flags,
            method,
            timestamp,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LE>(LOCAL_FILE_HEADER_SIG)?;
        w.write_u16::<LE>(self.version_needed)?;
        w.write_u16::<LE>(self.flags)?;
        w.write_u16::<LE>(self.method.as_u16())?;
        self.timestamp.write(w)?;
        w.write_u32::<LE>(self.crc32)?;
        w.write_u32::<LE>(self.compressed_size)?;
        w.write_u32::<LE>(self.uncompressed_size)?;
        w.write_u16::<LE>(self.file_name.len() as u16)?;
        w.write_u16::<LE>(self.extra_field.len() as u16)?;
        w.write_all(self.file_name.as_bytes())?;
        w.write_all(&self.extra_field)?;
        Ok(())
    }
}

/// Central directory file header, the authoritative per-entry metadata.
#[derive(Debug, Clone)]
pub struct CentralRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub timestamp: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub file_name: String,
    pub extra_field: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralRecord {
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let signature = r.read_u32::<LE>().map_err(read_failed)?;
        if signature != CENTRAL_DIRECTORY_SIG {
            return Err(StitchError::BadFormat(
                "bad central directory signature".into(),
            ));
        }
        let version_made_by = r.read_u16::<LE>().map_err(read_failed)?;
        let version_needed = r.read_u16::<LE>().map_err(read_failed)?;
        let flags = r.read_u16::<LE>().map_err(read_failed)?;
        let method = CompressionMethod::from_u16(r.read_u16::<LE>().map_err(read_failed)?);
        let timestamp = DosDateTime::read(r)?;
        let crc32 = r.read_u32::<LE>().map_err(read_failed)?;
        let compressed_size = r.read_u32::<LE>().map_err(read_failed)?;
        let uncompressed_size = r.read_u32::<LE>().map_err(read_failed)?;
        let name_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let extra_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let comment_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let disk_number_start = r.read_u16::<LE>().map_err(read_failed)?;
        let internal_attributes = r.read_u16::<LE>().map_err(read_failed)?;
        let external_attributes = r.read_u32::<LE>().map_err(read_failed)?;
        let local_header_offset = r.read_u32::<LE>().map_err(read_failed)?;
        let file_name = read_name(r, name_len)?;
        let extra_field = read_exact_vec(r, extra_len)?;
        let comment = read_exact_vec(r, comment_len)?;
        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            timestamp,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            file_name,
            extra_field,
            comment,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LE>(CENTRAL_DIRECTORY_SIG)?;
        w.write_u16::<LE>(self.version_made_by)?;
        w.write_u16::<LE>(self.version_needed)?;
        w.write_u16::<LE>(self.flags)?;
        w.write_u16::<LE>(self.method.as_u16())?;
        self.timestamp.write(w)?;
        w.write_u32::<LE>(self.crc32)?;
        w.write_u32::<LE>(self.compressed_size)?;
        w.write_u32::<LE>(self.uncompressed_size)?;
        w.write_u16::<LE>(self.file_name.len() as u16)?;
        w.write_u16::<LE>(self.extra_field.len() as u16)?;
        w.write_u16::<LE>(self.comment.len() as u16)?;
        w.write_u16::<LE>(self.disk_number_start)?;
        w.write_u16::<LE>(self.internal_attributes)?;
        w.write_u32::<LE>(self.external_attributes)?;
        w.write_u32::<LE>(self.local_header_offset)?;
        w.write_all(self.file_name.as_bytes())?;
        w.write_all(&self.extra_field)?;
        w.write_all(&self.comment)?;
        Ok(())
    }
}

/// End Of Central Directory record, the ZIP trailer.
#[derive(Debug, Clone)]
pub struct EndOfCentralDir {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub disk_records: u16,
    pub total_records: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDir {
    /// Record length with an empty comment.
    pub const MIN_SIZE: u64 = 22;

    /// Reads the record, signature included.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let signature = r.read_u32::<LE>().map_err(read_failed)?;
        if signature != END_OF_CENTRAL_DIR_SIG {
            return Err(StitchError::BadFormat(
                "bad end of central directory signature".into(),
            ));
        }
        let disk_number = r.read_u16::<LE>().map_err(read_failed)?;
        let cd_start_disk = r.read_u16::<LE>().map_err(read_failed)?;
        let disk_records = r.read_u16::<LE>().map_err(read_failed)?;
        let total_records = r.read_u16::<LE>().map_err(read_failed)?;
        let cd_size = r.read_u32::<LE>().map_err(read_failed)?;
        let cd_offset = r.read_u32::<LE>().map_err(read_failed)?;
        let comment_len = r.read_u16::<LE>().map_err(read_failed)? as usize;
        let comment = read_exact_vec(r, comment_len)?;
        Ok(Self {
            disk_number,
            cd_start_disk,
            disk_records,
            total_records,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// Serialises the record. Infallible, so usable where no stream is
    /// involved (digest computation over a not-yet-written trailer).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::MIN_SIZE as usize + self.comment.len());
        data.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        data.extend_from_slice(&self.disk_number.to_le_bytes());
        data.extend_from_slice(&self.cd_start_disk.to_le_bytes());
        data.extend_from_slice(&self.disk_records.to_le_bytes());
        data.extend_from_slice(&self.total_records.to_le_bytes());
        data.extend_from_slice(&self.cd_size.to_le_bytes());
        data.extend_from_slice(&self.cd_offset.to_le_bytes());
        data.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.comment);
        data
    }
}

fn read_name<R: Read>(r: &mut R, len: usize) -> Result<String> {
    let bytes = read_exact_vec(r, len)?;
    String::from_utf8(bytes)
        .map_err(|_| StitchError::BadFormat("entry name is not valid UTF-8".into()))
}

fn read_exact_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(read_failed)?;
    Ok(buf)
}
