//! File-level operations: leader page metadata, open, read, write, trim.

use std::time::{SystemTime, UNIX_EPOCH};

use format_diablo::PAGE_DATA_BYTES;

use crate::error::FsError;
use crate::fs::AltoFs;
use crate::label::{FileEntry, FilePosition, Label};

/// Seconds between the Alto epoch (1901-01-01) and the Unix epoch.
const ALTO_EPOCH_OFFSET: u64 = 2_177_452_800;

/// Leader page word offsets. The leader is page 0 of every file and always
/// carries `nbytes = 512`.
const LD_CREATED: usize = 0;
const LD_WRITTEN: usize = 2;
const LD_READ: usize = 4;
const LD_NAME: usize = 6;
const LD_CONSECUTIVE: usize = 26;
const LD_CHANGE_SN: usize = 27;
const LD_DIR_HINT: usize = 246;
const LD_LAST_HINT: usize = 253;

/// Maximum file name length: 40-byte BCPL string, one byte for the count.
pub const MAX_NAME_BYTES: usize = 39;

/// Convert a host timestamp to Alto seconds.
#[must_use]
pub fn alto_time_from_system(time: SystemTime) -> u32 {
    let unix = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (unix + ALTO_EPOCH_OFFSET) as u32
}

/// Metadata held in a file's leader page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub name: String,
    pub created: u32,
    pub written: u32,
    pub read: u32,
    pub consecutive: bool,
    pub change_sn: crate::label::SerialNumber,
    /// Hint to this file's own directory entry.
    pub dir_hint: FileEntry,
    /// Hint to the last page of the file.
    pub last_page_hint: Option<FilePosition>,
}

fn get_word(data: &[u8], word: usize) -> u16 {
    u16::from_le_bytes([data[word * 2], data[word * 2 + 1]])
}

fn put_word(data: &mut [u8], word: usize, value: u16) {
    data[word * 2..word * 2 + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_time(data: &[u8], word: usize) -> u32 {
    u32::from(get_word(data, word)) << 16 | u32::from(get_word(data, word + 1))
}

fn put_time(data: &mut [u8], word: usize, value: u32) {
    put_word(data, word, (value >> 16) as u16);
    put_word(data, word + 1, value as u16);
}

impl FileInfo {
    /// Decode leader page data. Malformed name bytes yield an empty name
    /// rather than an error: scavenging reads leaders that may be garbage.
    #[must_use]
    pub fn decode(data: &[u8]) -> Self {
        let name_len = data[LD_NAME * 2] as usize;
        let name = if name_len >= 1 && name_len <= MAX_NAME_BYTES {
            let bytes = &data[LD_NAME * 2 + 1..LD_NAME * 2 + 1 + name_len];
            if bytes.iter().all(|b| b.is_ascii() && !b.is_ascii_control()) {
                String::from_utf8_lossy(bytes).into_owned()
            } else {
                String::new()
            }
        } else {
            String::new()
        };

        let hint_vda = get_word(data, LD_LAST_HINT);
        let last_page_hint = if hint_vda == 0 && get_word(data, LD_LAST_HINT + 1) == 0 {
            None
        } else {
            Some(FilePosition {
                vda: u32::from(hint_vda),
                pgnum: get_word(data, LD_LAST_HINT + 1),
                pos: get_word(data, LD_LAST_HINT + 2) as usize,
            })
        };

        let mut fe_words = [0u16; 5];
        for (i, w) in fe_words.iter_mut().enumerate() {
            *w = get_word(data, LD_DIR_HINT + i);
        }

        Self {
            name,
            created: get_time(data, LD_CREATED),
            written: get_time(data, LD_WRITTEN),
            read: get_time(data, LD_READ),
            consecutive: get_word(data, LD_CONSECUTIVE) != 0,
            change_sn: crate::label::SerialNumber::new(
                get_word(data, LD_CHANGE_SN),
                get_word(data, LD_CHANGE_SN + 1),
            ),
            dir_hint: FileEntry::from_words(&fe_words),
            last_page_hint,
        }
    }

    pub fn encode(&self, data: &mut [u8]) {
        put_time(data, LD_CREATED, self.created);
        put_time(data, LD_WRITTEN, self.written);
        put_time(data, LD_READ, self.read);

        let name = self.name.as_bytes();
        debug_assert!(name.len() <= MAX_NAME_BYTES);
        data[LD_NAME * 2] = name.len() as u8;
        data[LD_NAME * 2 + 1..LD_NAME * 2 + 1 + name.len()].copy_from_slice(name);
        for b in &mut data[LD_NAME * 2 + 1 + name.len()..LD_NAME * 2 + 40] {
            *b = 0;
        }

        put_word(data, LD_CONSECUTIVE, u16::from(self.consecutive));
        put_word(data, LD_CHANGE_SN, self.change_sn.word1);
        put_word(data, LD_CHANGE_SN + 1, self.change_sn.word2);

        let fe_words = self.dir_hint.to_words();
        for (i, &w) in fe_words.iter().enumerate() {
            put_word(data, LD_DIR_HINT + i, w);
        }

        let hint = self.last_page_hint.unwrap_or(FilePosition {
            vda: 0,
            pgnum: 0,
            pos: 0,
        });
        put_word(data, LD_LAST_HINT, hint.vda as u16);
        put_word(data, LD_LAST_HINT + 1, hint.pgnum);
        put_word(data, LD_LAST_HINT + 2, hint.pos as u16);
    }
}

/// An open file: identity plus a cursor.
#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    pub fe: FileEntry,
    pub pos: FilePosition,
}

impl AltoFs {
    /// Open a file at its leader page.
    #[must_use]
    pub fn open_file(&self, fe: FileEntry) -> OpenFile {
        OpenFile {
            fe,
            pos: FilePosition {
                vda: fe.leader_vda,
                pgnum: 0,
                pos: 0,
            },
        }
    }

    /// Follow `next_rda` from a page. `Ok(None)` at the end of the chain.
    pub fn next_vda(&self, vda: u32) -> Result<Option<u32>, FsError> {
        let rda = self.label(vda).next_rda;
        if rda == 0 {
            Ok(None)
        } else {
            self.vda_of(rda).map(Some)
        }
    }

    /// Position an open file at the start of its content (page 1, offset 0).
    pub fn seek_data(&self, of: &mut OpenFile) -> Result<(), FsError> {
        match self.next_vda(of.fe.leader_vda)? {
            Some(vda) => {
                of.pos = FilePosition {
                    vda,
                    pgnum: 1,
                    pos: 0,
                };
                Ok(())
            }
            None => Err(FsError::BrokenChain {
                vda: of.fe.leader_vda,
            }),
        }
    }

    /// Read up to `buf.len()` bytes at the cursor. A page holding fewer than
    /// 512 used bytes ends the file.
    pub fn read_file(&self, of: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut total = 0;
        while total < buf.len() {
            let label = self.label(of.pos.vda);
            let used = usize::from(label.nbytes).min(PAGE_DATA_BYTES);
            if of.pos.pos < used {
                let n = (used - of.pos.pos).min(buf.len() - total);
                buf[total..total + n]
                    .copy_from_slice(&self.data(of.pos.vda)[of.pos.pos..of.pos.pos + n]);
                of.pos.pos += n;
                total += n;
                continue;
            }
            if used < PAGE_DATA_BYTES {
                break;
            }
            match self.next_vda(of.pos.vda)? {
                Some(next) => {
                    of.pos = FilePosition {
                        vda: next,
                        pgnum: of.pos.pgnum + 1,
                        pos: 0,
                    };
                }
                None => break,
            }
        }
        Ok(total)
    }

    /// Write bytes at the cursor. With `extend`, new pages are allocated and
    /// linked when the chain runs out; otherwise the write stops there.
    /// Returns the number of bytes written.
    pub fn write_file(
        &mut self,
        of: &mut OpenFile,
        buf: &[u8],
        extend: bool,
    ) -> Result<usize, FsError> {
        let mut total = 0;
        while total < buf.len() {
            if of.pos.pos < PAGE_DATA_BYTES {
                let n = (PAGE_DATA_BYTES - of.pos.pos).min(buf.len() - total);
                self.data_mut(of.pos.vda)[of.pos.pos..of.pos.pos + n]
                    .copy_from_slice(&buf[total..total + n]);
                of.pos.pos += n;
                total += n;
                let mut label = self.label(of.pos.vda);
                if usize::from(label.nbytes) < of.pos.pos {
                    label.nbytes = of.pos.pos as u16;
                    self.set_label(of.pos.vda, &label);
                }
                continue;
            }
            match self.next_vda(of.pos.vda)? {
                Some(next) => {
                    of.pos = FilePosition {
                        vda: next,
                        pgnum: of.pos.pgnum + 1,
                        pos: 0,
                    };
                }
                None => {
                    if !extend {
                        break;
                    }
                    let next = self.extend_chain(of.pos.vda)?;
                    of.pos = FilePosition {
                        vda: next,
                        pgnum: of.pos.pgnum + 1,
                        pos: 0,
                    };
                }
            }
        }
        Ok(total)
    }

    /// Allocate a fresh page and link it after `vda` in the same file.
    pub(crate) fn extend_chain(&mut self, vda: u32) -> Result<u32, FsError> {
        let mut tail = self.label(vda);
        let new = self.allocate_page()?;
        tail.next_rda = self.rda_of(new);
        self.set_label(vda, &tail);
        self.data_mut(new).fill(0);
        self.set_label(
            new,
            &Label {
                next_rda: 0,
                prev_rda: self.rda_of(vda),
                unused: 0,
                nbytes: 0,
                file_pgnum: tail.file_pgnum + 1,
                version: 1,
                sn: tail.sn,
            },
        );
        self.set_header(new, self.rda_of(new));
        Ok(new)
    }

    /// Cut the file at the cursor: the current page keeps `pos` bytes, its
    /// remainder is zeroed, and every following page returns to the free
    /// list.
    pub fn trim_file(&mut self, of: &OpenFile) -> Result<(), FsError> {
        let mut label = self.label(of.pos.vda);
        label.nbytes = of.pos.pos as u16;
        self.data_mut(of.pos.vda)[of.pos.pos..].fill(0);

        let mut next = label.next_rda;
        label.next_rda = 0;
        self.set_label(of.pos.vda, &label);

        let mut guard = self.num_pages();
        while next != 0 && guard > 0 {
            let vda = self.vda_of(next)?;
            next = self.label(vda).next_rda;
            self.free_page(vda);
            guard -= 1;
        }
        Ok(())
    }

    /// Total content bytes (leader page excluded).
    pub fn file_length(&self, leader_vda: u32) -> Result<usize, FsError> {
        let mut length = 0;
        let mut guard = self.num_pages();
        let mut cur = self.next_vda(leader_vda)?;
        while let Some(vda) = cur {
            if guard == 0 {
                return Err(FsError::BrokenChain { vda });
            }
            guard -= 1;
            length += usize::from(self.label(vda).nbytes);
            cur = self.next_vda(vda)?;
        }
        Ok(length)
    }

    /// Decode the leader page metadata.
    #[must_use]
    pub fn read_leader(&self, leader_vda: u32) -> FileInfo {
        FileInfo::decode(self.data(leader_vda))
    }

    pub fn write_leader(&mut self, leader_vda: u32, info: &FileInfo) {
        info.encode(self.data_mut(leader_vda));
    }

    /// Read the whole content of a file (leader excluded).
    pub fn read_file_bytes(&self, leader_vda: u32) -> Result<Vec<u8>, FsError> {
        let length = self.file_length(leader_vda)?;
        let fe = FileEntry {
            sn: self.label(leader_vda).sn,
            version: 1,
            blank: 0,
            leader_vda,
        };
        let mut of = self.open_file(fe);
        match self.seek_data(&mut of) {
            Ok(()) => {}
            // A leader with no data page reads as empty.
            Err(_) if length == 0 => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        let mut bytes = vec![0; length];
        let n = self.read_file(&mut of, &mut bytes)?;
        bytes.truncate(n);
        Ok(bytes)
    }

    /// Replace the whole content of a file, reusing its existing pages,
    /// extending or trimming the chain as needed. Updates the last-page
    /// hint in the leader.
    pub fn write_file_bytes(&mut self, leader_vda: u32, bytes: &[u8]) -> Result<(), FsError> {
        let fe = FileEntry {
            sn: self.label(leader_vda).sn,
            version: 1,
            blank: 0,
            leader_vda,
        };
        let mut of = self.open_file(fe);
        if self.next_vda(leader_vda)?.is_none() {
            self.extend_chain(leader_vda)?;
        }
        self.seek_data(&mut of)?;
        let written = self.write_file(&mut of, bytes, true)?;
        debug_assert_eq!(written, bytes.len());
        self.trim_file(&of)?;

        let mut info = self.read_leader(leader_vda);
        info.last_page_hint = Some(of.pos);
        self.write_leader(leader_vda, &info);
        Ok(())
    }
}
