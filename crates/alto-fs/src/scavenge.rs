//! Scavenging: rebuild the filesystem from page labels alone.
//!
//! The labels are the ground truth. Pages are grouped by serial number, the
//! lowest-VDA page with `file_pgnum == 0` becomes the leader, chains are
//! relinked in page-number order, and directories gain entries for any file
//! they lost. On a clean image every write lands on the value already there.

use std::collections::{HashMap, HashSet};

use format_diablo::PAGE_DATA_BYTES;

use crate::directory::{TYPE_FILE, TYPE_MISSING, decode_entries};
use crate::error::FsError;
use crate::fs::{AltoFs, BOOT_VDA, SYSDIR_VDA};
use crate::label::FileEntry;

#[derive(Debug, Default)]
pub struct ScavengeReport {
    pub files_seen: usize,
    pub pages_freed: u32,
    pub entries_added: usize,
    pub entries_removed: usize,
}

impl AltoFs {
    /// Rebuild chains, directories, bitmap and descriptor from the labels.
    pub fn scavenge(&mut self) -> Result<ScavengeReport, FsError> {
        let mut report = ScavengeReport::default();

        // Group allocated pages by owning serial number.
        let mut groups: HashMap<u32, Vec<u32>> = HashMap::new();
        for vda in 0..self.num_pages() {
            if vda == BOOT_VDA {
                continue;
            }
            let label = self.label(vda);
            if label.is_free() || label.is_bad() {
                continue;
            }
            groups.entry(label.sn.effective()).or_default().push(vda);
        }

        // Relink every group; groups with no leader page are orphans and go
        // back to the free list.
        let mut leaders = Vec::new();
        let mut group_list: Vec<(u32, Vec<u32>)> = groups.into_iter().collect();
        group_list.sort_by_key(|(sn, _)| *sn);
        for (_, members) in group_list {
            match self.relink_group(&members, &mut report)? {
                Some(leader) => leaders.push(leader),
                None => {
                    for vda in members {
                        self.free_page(vda);
                        report.pages_freed += 1;
                    }
                }
            }
        }
        report.files_seen = leaders.len();

        // Give a recovered leader a usable name if its metadata was wiped.
        for &leader in &leaders {
            let mut info = self.read_leader(leader);
            if info.name.is_empty() {
                info.name = if leader == SYSDIR_VDA {
                    "SysDir.".to_string()
                } else {
                    format!("Scavenged.{:05}.", self.label(leader).sn.effective())
                };
                self.write_leader(leader, &info);
            }
        }

        self.repair_directories(&leaders, &mut report)?;

        self.rebuild_bitmap();
        match self.update_descriptor() {
            // A pack with no DiskDescriptor file is still usable.
            Ok(()) | Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    /// Order a group's pages into a single chain. Returns the leader VDA,
    /// or `None` when the group has no page 0. Duplicate page numbers keep
    /// the lowest VDA; the rest are freed.
    fn relink_group(
        &mut self,
        members: &[u32],
        report: &mut ScavengeReport,
    ) -> Result<Option<u32>, FsError> {
        let mut pages: Vec<(u16, u32)> = members
            .iter()
            .map(|&vda| (self.label(vda).file_pgnum, vda))
            .collect();
        pages.sort_unstable();

        if pages.first().is_none_or(|&(pgnum, _)| pgnum != 0) {
            return Ok(None);
        }

        let mut chain = Vec::with_capacity(pages.len());
        let mut last_pgnum = None;
        for (pgnum, vda) in pages {
            if last_pgnum == Some(pgnum) {
                self.free_page(vda);
                report.pages_freed += 1;
                continue;
            }
            last_pgnum = Some(pgnum);
            chain.push(vda);
        }

        for (i, &vda) in chain.iter().enumerate() {
            let mut label = self.label(vda);
            label.file_pgnum = i as u16;
            label.prev_rda = if i == 0 { 0 } else { self.rda_of(chain[i - 1]) };
            label.next_rda = if i + 1 == chain.len() {
                0
            } else {
                self.rda_of(chain[i + 1])
            };
            if i == 0 {
                label.nbytes = PAGE_DATA_BYTES as u16;
            }
            if label != self.label(vda) {
                self.set_label(vda, &label);
            }
        }
        Ok(Some(chain[0]))
    }

    /// Drop directory entries that no longer resolve and re-enter files no
    /// directory lists.
    fn repair_directories(
        &mut self,
        leaders: &[u32],
        report: &mut ScavengeReport,
    ) -> Result<(), FsError> {
        let mut listed = HashSet::new();
        let mut stack = vec![SYSDIR_VDA];
        let mut visited = HashSet::new();
        while let Some(dir_vda) = stack.pop() {
            if !visited.insert(dir_vda) {
                continue;
            }
            let mut content = self.read_file_bytes(dir_vda)?;
            let mut dirty = false;
            for entry in decode_entries(&content) {
                if entry.etype != TYPE_FILE {
                    continue;
                }
                let vda = entry.fe.leader_vda;
                let resolves = vda < self.num_pages() && {
                    let label = self.label(vda);
                    !label.is_free() && label.file_pgnum == 0 && label.sn == entry.fe.sn
                };
                if resolves {
                    listed.insert(vda);
                    if entry.fe.sn.is_directory() && vda != dir_vda {
                        stack.push(vda);
                    }
                } else {
                    let header = (TYPE_MISSING << 10) | entry.length;
                    content[entry.offset * 2..entry.offset * 2 + 2]
                        .copy_from_slice(&header.to_le_bytes());
                    dirty = true;
                    report.entries_removed += 1;
                }
            }
            if dirty {
                self.write_file_bytes(dir_vda, &content)?;
            }
        }

        for &leader in leaders {
            if listed.contains(&leader) || leader == SYSDIR_VDA {
                continue;
            }
            let label = self.label(leader);
            let fe = FileEntry {
                sn: label.sn,
                version: 1,
                blank: 0,
                leader_vda: leader,
            };
            let name = self.read_leader(leader).name;
            self.add_directory_entry(SYSDIR_VDA, fe, &name)?;
            report.entries_added += 1;
        }
        Ok(())
    }
}
