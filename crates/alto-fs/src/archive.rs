//! Archiver operations: image formatting, the disk descriptor, and the
//! host-facing file operations `par` is built on.

use std::time::SystemTime;

use format_diablo::{DiabloImage, PAGE_DATA_BYTES};

use crate::directory::TYPE_FILE;
use crate::error::FsError;
use crate::file::{FileInfo, MAX_NAME_BYTES, alto_time_from_system};
use crate::fs::{AltoFs, BOOT_VDA, SYSDIR_VDA};
use crate::label::{FileEntry, Label, SN_DIRECTORY, SerialNumber};

/// Name of the file that mirrors the allocation state.
pub const DESCRIPTOR_NAME: &str = "DiskDescriptor.";

/// Header words of the `DiskDescriptor` content, before the bitmap.
const KDH_WORDS: usize = 10;

/// One line of a directory listing.
#[derive(Debug, Clone)]
pub struct DirListEntry {
    pub name: String,
    pub sn: u32,
    pub length: usize,
    pub missing: bool,
}

impl AltoFs {
    /// Format blank packs: every label free, a boot page, the root
    /// directory at its fixed leader address and a fresh `DiskDescriptor`.
    pub fn create(num_disks: u32) -> Result<Self, FsError> {
        let disks = (0..num_disks).map(|_| DiabloImage::new(1)).collect();
        let mut fs = Self::bare(disks);
        for vda in 0..fs.num_pages() {
            let rda = fs.rda_of(vda);
            fs.set_header(vda, rda);
            fs.set_label(vda, &Label::free());
        }

        // The boot sector is claimed from day one; install_boot fills it.
        fs.set_label(
            BOOT_VDA,
            &Label {
                next_rda: 0,
                prev_rda: 0,
                unused: 0,
                nbytes: PAGE_DATA_BYTES as u16,
                file_pgnum: 0,
                version: 1,
                sn: SerialNumber::new(0, 0),
            },
        );

        // Root directory, leader fixed at VDA 1.
        let now = alto_time_from_system(SystemTime::now());
        let sn = fs.next_sn(SN_DIRECTORY);
        let leader = fs.allocate_page()?;
        debug_assert_eq!(leader, SYSDIR_VDA);
        fs.set_label(
            leader,
            &Label {
                next_rda: 0,
                prev_rda: 0,
                unused: 0,
                nbytes: PAGE_DATA_BYTES as u16,
                file_pgnum: 0,
                version: 1,
                sn,
            },
        );
        fs.data_mut(leader).fill(0);
        fs.extend_chain(leader)?;
        let root = fs.root_entry();
        fs.write_leader(
            leader,
            &FileInfo {
                name: "SysDir.".to_string(),
                created: now,
                written: now,
                read: now,
                consecutive: false,
                change_sn: sn,
                dir_hint: root,
                last_page_hint: None,
            },
        );
        fs.add_directory_entry(SYSDIR_VDA, root, "SysDir.")?;

        fs.create_file_in(SYSDIR_VDA, DESCRIPTOR_NAME, 0)?;
        fs.update_descriptor()?;
        Ok(fs)
    }

    /// Create an empty file (leader plus one empty data page) and enter it
    /// in the given directory.
    pub fn create_file_in(
        &mut self,
        dir_vda: u32,
        name: &str,
        sn_flags: u16,
    ) -> Result<FileEntry, FsError> {
        if name.len() > MAX_NAME_BYTES {
            return Err(FsError::NameTooLong(name.to_string()));
        }
        let now = alto_time_from_system(SystemTime::now());
        let sn = self.next_sn(sn_flags);
        let leader = self.allocate_page()?;
        self.set_label(
            leader,
            &Label {
                next_rda: 0,
                prev_rda: 0,
                unused: 0,
                nbytes: PAGE_DATA_BYTES as u16,
                file_pgnum: 0,
                version: 1,
                sn,
            },
        );
        self.data_mut(leader).fill(0);
        self.extend_chain(leader)?;

        let fe = FileEntry {
            sn,
            version: 1,
            blank: 0,
            leader_vda: leader,
        };
        self.write_leader(
            leader,
            &FileInfo {
                name: name.to_string(),
                created: now,
                written: now,
                read: now,
                consecutive: false,
                change_sn: sn,
                dir_hint: fe,
                last_page_hint: None,
            },
        );
        self.add_directory_entry(dir_vda, fe, name)?;
        Ok(fe)
    }

    /// Split a path into its parent directory's leader VDA and the final
    /// component.
    pub fn resolve_parent<'a>(&self, path: &'a str) -> Result<(u32, &'a str), FsError> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some((base, parents)) = components.split_last() else {
            return Err(FsError::NotFound(path.to_string()));
        };
        let mut dir = self.root_entry();
        for component in parents {
            if !dir.sn.is_directory() {
                return Err(FsError::NotADirectory((*component).to_string()));
            }
            dir = self
                .find_in_directory(dir.leader_vda, component)?
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        }
        if !dir.sn.is_directory() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok((dir.leader_vda, base))
    }

    /// Read a file's content; with `include_leader` the 512 leader-page
    /// bytes come first.
    pub fn extract_file(&self, path: &str, include_leader: bool) -> Result<Vec<u8>, FsError> {
        let fe = self.find_file(path)?;
        let content = self.read_file_bytes(fe.leader_vda)?;
        if include_leader {
            let mut out = self.data(fe.leader_vda).to_vec();
            out.extend_from_slice(&content);
            Ok(out)
        } else {
            Ok(content)
        }
    }

    /// Create or replace `path` with `content`. `written` stamps the leader;
    /// pass the host file's mtime.
    pub fn insert_file(&mut self, path: &str, content: &[u8], written: u32) -> Result<(), FsError> {
        let fe = match self.find_file(path) {
            Ok(fe) => fe,
            Err(FsError::NotFound(_)) => {
                let (dir_vda, base) = self.resolve_parent(path)?;
                self.create_file_in(dir_vda, base, 0)?
            }
            Err(e) => return Err(e),
        };
        self.write_file_bytes(fe.leader_vda, content)?;
        let mut info = self.read_leader(fe.leader_vda);
        info.written = written;
        self.write_leader(fe.leader_vda, &info);
        Ok(())
    }

    /// Truncate an existing file and rewrite its content.
    pub fn replace_file(
        &mut self,
        path: &str,
        content: &[u8],
        written: u32,
    ) -> Result<(), FsError> {
        let fe = self.find_file(path)?;
        self.write_file_bytes(fe.leader_vda, content)?;
        let mut info = self.read_leader(fe.leader_vda);
        info.written = written;
        self.write_leader(fe.leader_vda, &info);
        Ok(())
    }

    /// Unlink a file. With `remove_underlying`, its pages go back to the
    /// free list; otherwise only the directory entry dies.
    pub fn remove_file(&mut self, path: &str, remove_underlying: bool) -> Result<(), FsError> {
        let (dir_vda, base) = self.resolve_parent(path)?;
        let fe = self.remove_directory_entry(dir_vda, base)?;
        if remove_underlying {
            let mut vda = Some(fe.leader_vda);
            let mut guard = self.num_pages();
            while let Some(v) = vda {
                if guard == 0 {
                    return Err(FsError::BrokenChain { vda: v });
                }
                guard -= 1;
                vda = self.next_vda(v)?;
                self.free_page(v);
            }
        }
        Ok(())
    }

    /// Copy a file within the image.
    pub fn copy_file(&mut self, src: &str, dst: &str) -> Result<(), FsError> {
        let content = self.extract_file(src, false)?;
        let written = alto_time_from_system(SystemTime::now());
        self.insert_file(dst, &content, written)
    }

    /// Create a subdirectory entered in its parent.
    pub fn make_directory(&mut self, path: &str) -> Result<(), FsError> {
        let (dir_vda, base) = self.resolve_parent(path)?;
        if self.find_in_directory(dir_vda, base)?.is_some() {
            return Err(FsError::Exists(path.to_string()));
        }
        self.create_file_in(dir_vda, base, SN_DIRECTORY)?;
        Ok(())
    }

    /// Install a file as the boot sector: its first data page is copied to
    /// VDA 0 and chained into the rest of the file.
    pub fn install_boot(&mut self, path: &str) -> Result<(), FsError> {
        let fe = self.find_file(path)?;
        let first = self
            .next_vda(fe.leader_vda)?
            .ok_or(FsError::BrokenChain { vda: fe.leader_vda })?;
        let data = self.data(first).to_vec();
        self.data_mut(BOOT_VDA).copy_from_slice(&data);
        let mut label = self.label(first);
        label.prev_rda = 0;
        self.set_label(BOOT_VDA, &label);
        Ok(())
    }

    /// Zero the data of every free page.
    pub fn wipe_free_pages(&mut self) {
        for vda in 0..self.num_pages() {
            if self.label(vda).is_free() {
                self.data_mut(vda).fill(0);
            }
        }
    }

    /// List a directory with per-file byte lengths.
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirListEntry>, FsError> {
        let fe = if path.is_empty() {
            self.root_entry()
        } else {
            self.find_file(path)?
        };
        if !fe.sn.is_directory() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        let mut out = Vec::new();
        for entry in self.directory_entries(fe.leader_vda)? {
            let missing = entry.etype != TYPE_FILE;
            let length = if missing {
                0
            } else {
                self.file_length(entry.fe.leader_vda).unwrap_or(0)
            };
            out.push(DirListEntry {
                name: entry.name,
                sn: entry.fe.sn.effective(),
                length,
                missing,
            });
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // DiskDescriptor
    // -----------------------------------------------------------------------

    fn descriptor_content(&self) -> Vec<u8> {
        let geometry = self.geometry();
        let mut words = Vec::with_capacity(KDH_WORDS + self.bitmap_words());
        words.push(geometry.num_disks as u16);
        words.push(geometry.num_cylinders as u16);
        words.push(geometry.num_heads as u16);
        words.push(geometry.num_sectors as u16);
        words.push(self.last_sn().word1);
        words.push(self.last_sn().word2);
        words.push(self.bitmap_words() as u16);
        words.push(0); // versions kept
        words.push(self.free_pages() as u16);
        words.push(0);
        words.extend_from_slice(self.bitmap());
        let mut bytes = Vec::with_capacity(words.len() * 2);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    /// Rewrite the `DiskDescriptor` file from the live allocation state.
    ///
    /// The first write may itself allocate descriptor pages, so the content
    /// is rebuilt and rewritten until it settles (at most one extra pass
    /// once the file has its pages).
    pub fn update_descriptor(&mut self) -> Result<(), FsError> {
        let fe = self.find_file(DESCRIPTOR_NAME)?;
        loop {
            let content = self.descriptor_content();
            self.write_file_bytes(fe.leader_vda, &content)?;
            if self.descriptor_content() == content {
                return Ok(());
            }
        }
    }
}
