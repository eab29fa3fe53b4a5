use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Single-disk EOCD for `entries` central directory records
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::format("invalid End of Central Directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(Self::SIGNATURE);
        buf.write_u16::<LittleEndian>(self.disk_number)?;
        buf.write_u16::<LittleEndian>(self.disk_with_cd)?;
        buf.write_u16::<LittleEndian>(self.disk_entries)?;
        buf.write_u16::<LittleEndian>(self.total_entries)?;
        buf.write_u32::<LittleEndian>(self.cd_size)?;
        buf.write_u32::<LittleEndian>(self.cd_offset)?;
        buf.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }

    /// Fields saturated to their maximum mean a ZIP64 record follows
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Version 2.0: deflate and directories
pub const VERSION_NEEDED: u16 = 20;
/// Upper byte 3 marks a Unix host, so external attributes carry `st_mode`
pub const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_NEEDED;

pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_UTF8: u16 = 0x0800;

const S_IFREG: u32 = 0o100000;

/// Packed MS-DOS date and time, 2-second resolution, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00
    pub const MIN: Self = Self {
        date: (1 << 5) | 1,
        time: 0,
    };
    /// 2107-12-31 23:59:58
    pub const MAX: Self = Self {
        date: (127 << 9) | (12 << 5) | 31,
        time: (23 << 11) | (59 << 5) | 29,
    };

    /// Encode Unix seconds, clamping to the representable range.
    pub fn from_unix(secs: i64) -> Self {
        let Some(dt) = DateTime::from_timestamp(secs, 0) else {
            return if secs < 0 { Self::MIN } else { Self::MAX };
        };
        match dt.year() {
            y if y < 1980 => Self::MIN,
            y if y > 2107 => Self::MAX,
            year => Self {
                date: (((year - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16,
                time: ((dt.hour() as u16) << 11)
                    | ((dt.minute() as u16) << 5)
                    | (dt.second() / 2) as u16,
            },
        }
    }

    /// Decode to Unix seconds; `None` for impossible dates.
    pub fn to_unix(self) -> Option<i64> {
        let year = i32::from((self.date >> 9) & 0x7F) + 1980;
        let month = u32::from((self.date >> 5) & 0x0F);
        let day = u32::from(self.date & 0x1F);
        let hour = u32::from((self.time >> 11) & 0x1F);
        let minute = u32::from((self.time >> 5) & 0x3F);
        let second = u32::from(self.time & 0x1F) * 2;
        let dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
        Some(dt.and_utc().timestamp())
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub version_made_by: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub external_attrs: u32,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time as Unix seconds
    pub fn modified(&self) -> Option<i64> {
        DosDateTime {
            date: self.last_mod_date,
            time: self.last_mod_time,
        }
        .to_unix()
    }

    /// POSIX permission bits from the high half of the external attributes
    pub fn unix_mode(&self) -> Option<u32> {
        match self.external_attrs >> 16 {
            0 => None,
            mode => Some(mode & 0o7777),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// External attributes for a regular file with permission bits `mode`
    pub fn unix_attrs(mode: u32) -> u32 {
        (S_IFREG | (mode & 0o7777)) << 16
    }

    pub fn write_local_header(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(LFH_SIGNATURE);
        buf.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        buf.write_u16::<LittleEndian>(self.last_mod_time)?;
        buf.write_u16::<LittleEndian>(self.last_mod_date)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(u32_field(self.compressed_size, "compressed size")?)?;
        buf.write_u32::<LittleEndian>(u32_field(self.uncompressed_size, "uncompressed size")?)?;
        buf.write_u16::<LittleEndian>(name_len(&self.file_name)?)?;
        buf.write_u16::<LittleEndian>(0)?; // extra field length
        buf.extend_from_slice(self.file_name.as_bytes());
        Ok(())
    }

    pub fn write_central_header(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(CDFH_SIGNATURE);
        buf.write_u16::<LittleEndian>(self.version_made_by)?;
        buf.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        buf.write_u16::<LittleEndian>(self.last_mod_time)?;
        buf.write_u16::<LittleEndian>(self.last_mod_date)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(u32_field(self.compressed_size, "compressed size")?)?;
        buf.write_u32::<LittleEndian>(u32_field(self.uncompressed_size, "uncompressed size")?)?;
        buf.write_u16::<LittleEndian>(name_len(&self.file_name)?)?;
        buf.write_u16::<LittleEndian>(0)?; // extra field length
        buf.write_u16::<LittleEndian>(0)?; // file comment length
        buf.write_u16::<LittleEndian>(0)?; // disk number start
        buf.write_u16::<LittleEndian>(0)?; // internal attributes
        buf.write_u32::<LittleEndian>(self.external_attrs)?;
        buf.write_u32::<LittleEndian>(u32_field(self.lfh_offset, "local header offset")?)?;
        buf.extend_from_slice(self.file_name.as_bytes());
        Ok(())
    }
}

/// Narrow a size or offset to its 32-bit header field. Anything larger needs
/// ZIP64.
pub(crate) fn u32_field(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v != u32::MAX)
        .ok_or_else(|| ArchiveError::unsupported(format!("{what} {value} requires ZIP64")))
}

fn name_len(name: &str) -> Result<u16> {
    u16::try_from(name.len())
        .map_err(|_| ArchiveError::unsupported(format!("file name longer than 65535 bytes: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_time_bit_packing() {
        // 2024-03-15 13:45:31 UTC
        let dt = DosDateTime::from_unix(1_710_510_331);
        assert_eq!(dt.date, ((2024 - 1980) << 9) | (3 << 5) | 15);
        assert_eq!(dt.time, (13 << 11) | (45 << 5) | (31 / 2));
    }

    #[test]
    fn dos_time_round_trip_truncates_to_two_seconds() {
        for secs in [315_532_800i64, 1_000_000_001, 1_710_510_331, 4_102_444_799] {
            let back = DosDateTime::from_unix(secs).to_unix().unwrap();
            assert_eq!(back, secs - secs % 2);
        }
    }

    #[test]
    fn dos_time_clamps() {
        assert_eq!(DosDateTime::from_unix(0), DosDateTime::MIN);
        assert_eq!(DosDateTime::from_unix(-5), DosDateTime::MIN);
        assert_eq!(DosDateTime::from_unix(i64::MAX), DosDateTime::MAX);
        assert_eq!(DosDateTime::MIN.to_unix(), Some(315_532_800));
    }

    #[test]
    fn impossible_dos_date() {
        let dt = DosDateTime { date: 0, time: 0 };
        assert_eq!(dt.to_unix(), None);
    }

    #[test]
    fn eocd_round_trip() {
        let eocd = EndOfCentralDirectory::new(3, 150, 4096);
        let mut buf = Vec::new();
        eocd.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&buf[..4], &[0x50, 0x4b, 0x05, 0x06]);
        assert_eq!(EndOfCentralDirectory::from_bytes(&buf).unwrap(), eocd);
        assert!(!eocd.is_zip64());
    }

    #[test]
    fn mode_in_external_attrs() {
        let attrs = ZipFileEntry::unix_attrs(0o640);
        assert_eq!(attrs >> 16, 0o100640);
        let entry = ZipFileEntry {
            file_name: "x".into(),
            version_made_by: VERSION_MADE_BY,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 0,
            external_attrs: attrs,
            is_directory: false,
        };
        assert_eq!(entry.unix_mode(), Some(0o640));
        assert_eq!(
            ZipFileEntry {
                external_attrs: 0x20,
                ..entry
            }
            .unix_mode(),
            None
        );
    }

    #[test]
    fn oversized_fields_need_zip64() {
        assert_eq!(u32_field(10, "size").unwrap(), 10);
        assert!(matches!(
            u32_field(1 << 32, "size"),
            Err(ArchiveError::Unsupported(_))
        ));
    }
}
