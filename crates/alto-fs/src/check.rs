//! Filesystem integrity checking.
//!
//! Four passes, reported with the offending VDA; the caller decides whether
//! to continue. Checking never mutates the image — scavenging is the
//! recovery path.

use std::collections::HashSet;
use std::fmt;

use crate::directory::TYPE_FILE;
use crate::error::FsError;
use crate::fs::{AltoFs, BOOT_VDA, SYSDIR_VDA};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// A non-free page whose `prev_rda` chain never reaches a leader.
    OrphanPage { vda: u32 },
    /// A leader's `next_rda` chain loops, skips a page number, changes
    /// owner or points off the pack.
    BrokenChain { leader_vda: u32, vda: u32 },
    /// Bitmap bit disagrees with the label.
    BitmapMismatch { vda: u32, allocated: bool },
    /// Directory entry whose target is not a matching leader page.
    BadDirectoryEntry { name: String, leader_vda: u32 },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanPage { vda } => write!(f, "orphan page at VDA {vda}"),
            Self::BrokenChain { leader_vda, vda } => {
                write!(f, "broken chain of leader VDA {leader_vda} at VDA {vda}")
            }
            Self::BitmapMismatch { vda, allocated } => {
                write!(f, "bitmap says {allocated} but label disagrees at VDA {vda}")
            }
            Self::BadDirectoryEntry { name, leader_vda } => {
                write!(f, "directory entry {name} does not match leader VDA {leader_vda}")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub errors: Vec<IntegrityError>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AltoFs {
    /// Run all four integrity passes.
    pub fn check(&self) -> Result<IntegrityReport, FsError> {
        let mut report = IntegrityReport::default();
        self.check_orphans(&mut report);
        self.check_chains(&mut report);
        self.check_bitmap(&mut report);
        self.check_directories(&mut report)?;
        Ok(report)
    }

    /// Pass 1: every allocated page walks `prev_rda` back to a leader.
    fn check_orphans(&self, report: &mut IntegrityReport) {
        for vda in 0..self.num_pages() {
            if vda == BOOT_VDA {
                continue;
            }
            let label = self.label(vda);
            if label.is_free() || label.is_bad() {
                continue;
            }
            let mut cur = vda;
            let mut steps = self.num_pages();
            let reached_leader = loop {
                let l = self.label(cur);
                if l.is_free() || l.is_bad() {
                    break false;
                }
                if l.file_pgnum == 0 {
                    break true;
                }
                if steps == 0 || l.prev_rda == 0 {
                    break false;
                }
                steps -= 1;
                match self.vda_of(l.prev_rda) {
                    Ok(prev) => cur = prev,
                    Err(_) => break false,
                }
            };
            if !reached_leader {
                report.errors.push(IntegrityError::OrphanPage { vda });
            }
        }
    }

    /// Pass 2: forward chains stay within one file and terminate cleanly.
    fn check_chains(&self, report: &mut IntegrityReport) {
        for leader_vda in 0..self.num_pages() {
            if leader_vda == BOOT_VDA {
                continue;
            }
            let leader = self.label(leader_vda);
            if leader.is_free() || leader.is_bad() || leader.file_pgnum != 0 {
                continue;
            }
            let mut prev_pgnum = 0u16;
            let mut cur = leader.next_rda;
            let mut steps = self.num_pages();
            while cur != 0 {
                if steps == 0 {
                    report.errors.push(IntegrityError::BrokenChain {
                        leader_vda,
                        vda: leader_vda,
                    });
                    break;
                }
                steps -= 1;
                let Ok(vda) = self.vda_of(cur) else {
                    report.errors.push(IntegrityError::BrokenChain {
                        leader_vda,
                        vda: leader_vda,
                    });
                    break;
                };
                let label = self.label(vda);
                if label.is_free()
                    || label.sn != leader.sn
                    || label.file_pgnum != prev_pgnum + 1
                {
                    report
                        .errors
                        .push(IntegrityError::BrokenChain { leader_vda, vda });
                    break;
                }
                prev_pgnum = label.file_pgnum;
                cur = label.next_rda;
            }
        }
    }

    /// Pass 3: the bitmap mirrors `version != 0xFFFF` exactly.
    fn check_bitmap(&self, report: &mut IntegrityReport) {
        for vda in 0..self.num_pages() {
            let allocated = !self.label(vda).is_free();
            if self.page_bit(vda) != allocated {
                report.errors.push(IntegrityError::BitmapMismatch {
                    vda,
                    allocated: self.page_bit(vda),
                });
            }
        }
    }

    /// Pass 4: every live directory entry resolves to a matching leader.
    fn check_directories(&self, report: &mut IntegrityReport) -> Result<(), FsError> {
        let mut stack = vec![SYSDIR_VDA];
        let mut visited = HashSet::new();
        while let Some(dir_vda) = stack.pop() {
            if !visited.insert(dir_vda) {
                continue;
            }
            for entry in self.directory_entries(dir_vda)? {
                if entry.etype != TYPE_FILE {
                    continue;
                }
                let vda = entry.fe.leader_vda;
                let ok = vda < self.num_pages() && {
                    let label = self.label(vda);
                    !label.is_free() && label.file_pgnum == 0 && label.sn == entry.fe.sn
                };
                if !ok {
                    report.errors.push(IntegrityError::BadDirectoryEntry {
                        name: entry.name.clone(),
                        leader_vda: vda,
                    });
                } else if entry.fe.sn.is_directory() && vda != dir_vda {
                    stack.push(vda);
                }
            }
        }
        Ok(())
    }
}
