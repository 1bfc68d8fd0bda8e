//! Directory files: packed variable-length entry records and path lookup.
//!
//! A directory is an ordinary file whose serial number carries the directory
//! flag. Its content is a sequence of entries; each starts with a word
//! holding the entry type in the top 6 bits and the entry length in words in
//! the low 10 bits. Removed entries keep their length so the offsets of the
//! entries behind them never move.

use crate::error::FsError;
use crate::fs::{AltoFs, SYSDIR_VDA};
use crate::label::FileEntry;

pub const TYPE_MISSING: u16 = 0;
pub const TYPE_FILE: u16 = 1;

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub etype: u16,
    /// Entry length in words, header word included.
    pub length: u16,
    pub fe: FileEntry,
    pub name: String,
    /// Word offset of the entry within the directory content.
    pub offset: usize,
}

/// Alto name comparison: case-insensitive, one trailing period ignored.
#[must_use]
pub fn names_equal(a: &str, b: &str) -> bool {
    let a = a.strip_suffix('.').unwrap_or(a);
    let b = b.strip_suffix('.').unwrap_or(b);
    a.eq_ignore_ascii_case(b)
}

fn word_at(content: &[u8], word: usize) -> u16 {
    u16::from_le_bytes([content[word * 2], content[word * 2 + 1]])
}

/// Serialise one entry. The name is stored as a BCPL string padded to a
/// word boundary.
fn encode_entry(etype: u16, fe: FileEntry, name: &str) -> Vec<u8> {
    let name_bytes = name.as_bytes();
    let name_words = (1 + name_bytes.len()).div_ceil(2);
    let length = (1 + 5 + name_words) as u16;
    let mut out = Vec::with_capacity(usize::from(length) * 2);
    out.extend_from_slice(&((etype << 10) | length).to_le_bytes());
    for w in fe.to_words() {
        out.extend_from_slice(&w.to_le_bytes());
    }
    let mut str_bytes = vec![name_bytes.len() as u8];
    str_bytes.extend_from_slice(name_bytes);
    if str_bytes.len() % 2 != 0 {
        str_bytes.push(0);
    }
    out.extend_from_slice(&str_bytes);
    out
}

/// Decode all entries in a directory's content. Scanning stops at a zero
/// header word or at the end of the content.
#[must_use]
pub fn decode_entries(content: &[u8]) -> Vec<DirectoryEntry> {
    let mut entries = Vec::new();
    let total_words = content.len() / 2;
    let mut offset = 0;
    while offset < total_words {
        let header = word_at(content, offset);
        if header == 0 {
            break;
        }
        let etype = header >> 10;
        let length = usize::from(header & 0x3FF);
        if length < 7 || offset + length > total_words {
            break;
        }
        let mut fe_words = [0u16; 5];
        for (i, w) in fe_words.iter_mut().enumerate() {
            *w = word_at(content, offset + 1 + i);
        }
        let name_len = usize::from(content[(offset + 6) * 2]);
        let name_start = (offset + 6) * 2 + 1;
        let name = if name_len > 0 && name_start + name_len <= content.len() {
            String::from_utf8_lossy(&content[name_start..name_start + name_len]).into_owned()
        } else {
            String::new()
        };
        entries.push(DirectoryEntry {
            etype,
            length: length as u16,
            fe: FileEntry::from_words(&fe_words),
            name,
            offset,
        });
        offset += length;
    }
    entries
}

impl AltoFs {
    /// The root directory's file entry.
    #[must_use]
    pub fn root_entry(&self) -> FileEntry {
        FileEntry {
            sn: self.label(SYSDIR_VDA).sn,
            version: 1,
            blank: 0,
            leader_vda: SYSDIR_VDA,
        }
    }

    /// All live entries of the directory whose leader is `dir_vda`.
    pub fn directory_entries(&self, dir_vda: u32) -> Result<Vec<DirectoryEntry>, FsError> {
        let content = self.read_file_bytes(dir_vda)?;
        Ok(decode_entries(&content))
    }

    /// Find `name` in one directory.
    pub fn find_in_directory(
        &self,
        dir_vda: u32,
        name: &str,
    ) -> Result<Option<FileEntry>, FsError> {
        Ok(self
            .directory_entries(dir_vda)?
            .into_iter()
            .find(|e| e.etype == TYPE_FILE && names_equal(&e.name, name))
            .map(|e| e.fe))
    }

    /// Resolve a `/`-separated path from the root directory.
    pub fn find_file(&self, path: &str) -> Result<FileEntry, FsError> {
        let mut current = self.root_entry();
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Ok(current);
        }
        for (i, component) in components.iter().enumerate() {
            if !current.sn.is_directory() {
                return Err(FsError::NotADirectory(components[..i].join("/")));
            }
            current = self
                .find_in_directory(current.leader_vda, component)?
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Add an entry, reusing a dead slot of sufficient length when one
    /// exists, appending otherwise.
    pub fn add_directory_entry(
        &mut self,
        dir_vda: u32,
        fe: FileEntry,
        name: &str,
    ) -> Result<(), FsError> {
        let entry = encode_entry(TYPE_FILE, fe, name);
        let mut content = self.read_file_bytes(dir_vda)?;

        let needed_words = entry.len() / 2;
        let slot = decode_entries(&content)
            .into_iter()
            .find(|e| e.etype == TYPE_MISSING && usize::from(e.length) >= needed_words);
        if let Some(slot) = slot {
            let start = slot.offset * 2;
            content[start..start + entry.len()].copy_from_slice(&entry);
            // Keep the slot's original length so any following entries
            // stay where they are.
            let header = (TYPE_FILE << 10) | slot.length;
            content[start..start + 2].copy_from_slice(&header.to_le_bytes());
        } else {
            content.extend_from_slice(&entry);
        }
        self.write_file_bytes(dir_vda, &content)
    }

    /// Mark the entry for `name` missing, keeping its length. Returns the
    /// removed file entry.
    pub fn remove_directory_entry(
        &mut self,
        dir_vda: u32,
        name: &str,
    ) -> Result<FileEntry, FsError> {
        let mut content = self.read_file_bytes(dir_vda)?;
        let entry = decode_entries(&content)
            .into_iter()
            .find(|e| e.etype == TYPE_FILE && names_equal(&e.name, name))
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let header = (TYPE_MISSING << 10) | entry.length;
        content[entry.offset * 2..entry.offset * 2 + 2].copy_from_slice(&header.to_le_bytes());
        self.write_file_bytes(dir_vda, &content)?;
        Ok(entry.fe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::SerialNumber;

    fn entry(name: &str) -> Vec<u8> {
        encode_entry(
            TYPE_FILE,
            FileEntry {
                sn: SerialNumber::new(0, 7),
                version: 1,
                blank: 0,
                leader_vda: 42,
            },
            name,
        )
    }

    #[test]
    fn encode_decode_entry() {
        let bytes = entry("hello.bcpl");
        let decoded = decode_entries(&bytes);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "hello.bcpl");
        assert_eq!(decoded[0].fe.leader_vda, 42);
        assert_eq!(usize::from(decoded[0].length) * 2, bytes.len());
    }

    #[test]
    fn decode_stops_at_zero_word() {
        let mut bytes = entry("a");
        bytes.extend_from_slice(&[0, 0, 0xFF, 0xFF]);
        assert_eq!(decode_entries(&bytes).len(), 1);
    }

    #[test]
    fn entries_are_word_aligned() {
        // Even and odd name lengths both pad to a word boundary.
        assert_eq!(entry("ab").len() % 2, 0);
        assert_eq!(entry("abc").len() % 2, 0);
    }

    #[test]
    fn name_matching_is_alto_style() {
        assert!(names_equal("SysDir.", "sysdir"));
        assert!(names_equal("HELLO.BCPL", "hello.bcpl"));
        assert!(!names_equal("hello", "hello2"));
    }
}
