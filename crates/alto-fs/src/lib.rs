//! Alto File System (AltoFS) reader/writer over Diablo pack images.
//!
//! Every page on the pack carries a label linking it into a per-file chain:
//! `prev_rda`/`next_rda` are real disk addresses, `file_pgnum` counts pages
//! from the leader (page 0), and `version`/`sn` tie the page to its owning
//! file. The leader page holds the file's metadata; directories are ordinary
//! files whose content is a packed sequence of variable-length entries. A
//! free-page bitmap, kept redundantly in the `DiskDescriptor` file, mirrors
//! the `version == 0xFFFF` convention in the labels.

mod archive;
mod check;
mod directory;
mod error;
mod file;
mod fs;
mod label;
mod scavenge;

pub use archive::{DESCRIPTOR_NAME, DirListEntry};
pub use check::{IntegrityError, IntegrityReport};
pub use directory::{DirectoryEntry, TYPE_FILE, TYPE_MISSING, names_equal};
pub use error::FsError;
pub use file::{FileInfo, MAX_NAME_BYTES, OpenFile, alto_time_from_system};
pub use fs::{AltoFs, BOOT_VDA, SYSDIR_VDA};
pub use label::{FileEntry, FilePosition, Label, SerialNumber, VERSION_BAD, VERSION_FREE};
pub use scavenge::ScavengeReport;
