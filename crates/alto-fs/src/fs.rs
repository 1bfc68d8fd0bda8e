//! The in-memory filesystem: page access, bitmap and allocation.

use format_diablo::{DiabloImage, Geometry, PAGES_PER_DISK};

use crate::error::FsError;
use crate::label::{Label, SerialNumber};

/// Leader page of the root directory. Fixed by convention.
pub const SYSDIR_VDA: u32 = 1;

/// Page 0 holds the boot loader and never joins a file chain by itself.
pub const BOOT_VDA: u32 = 0;

/// An Alto filesystem over one or two Diablo packs.
///
/// Page links in labels are disk addresses (plain integers), never owned
/// references; the pages themselves live in the backing images.
pub struct AltoFs {
    disks: Vec<DiabloImage>,
    geometry: Geometry,
    /// One bit per VDA, MSB first within each word, 1 = allocated.
    bitmap: Vec<u16>,
    free_pages: u32,
    last_sn: SerialNumber,
}

impl AltoFs {
    /// Adopt loaded pack images as a filesystem.
    ///
    /// # Errors
    ///
    /// Returns `NoFilesystem` if the root directory leader is missing.
    pub fn open(disks: Vec<DiabloImage>) -> Result<Self, FsError> {
        let geometry = Geometry::new(disks.len() as u32);
        let mut fs = Self {
            disks,
            geometry,
            bitmap: Vec::new(),
            free_pages: 0,
            last_sn: SerialNumber::default(),
        };
        fs.rebuild_bitmap();

        let root = fs.label(SYSDIR_VDA);
        if root.is_free() || root.file_pgnum != 0 || !root.sn.is_directory() {
            return Err(FsError::NoFilesystem);
        }
        Ok(fs)
    }

    /// Construct `AltoFs` state without checking for a root directory.
    /// Used by `create` before the directory exists.
    pub(crate) fn bare(disks: Vec<DiabloImage>) -> Self {
        let geometry = Geometry::new(disks.len() as u32);
        let mut fs = Self {
            disks,
            geometry,
            bitmap: Vec::new(),
            free_pages: 0,
            last_sn: SerialNumber::default(),
        };
        fs.rebuild_bitmap();
        fs
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.geometry.num_pages()
    }

    #[must_use]
    pub fn free_pages(&self) -> u32 {
        self.free_pages
    }

    #[must_use]
    pub fn last_sn(&self) -> SerialNumber {
        self.last_sn
    }

    /// The backing images, for serialisation.
    #[must_use]
    pub fn disks(&self) -> &[DiabloImage] {
        &self.disks
    }

    fn disk_of(&self, vda: u32) -> (usize, u32) {
        ((vda / PAGES_PER_DISK) as usize, vda % PAGES_PER_DISK)
    }

    #[must_use]
    pub fn label(&self, vda: u32) -> Label {
        let (disk, local) = self.disk_of(vda);
        Label::from_words(&self.disks[disk].label_words(local))
    }

    pub fn set_label(&mut self, vda: u32, label: &Label) {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].set_label_words(local, &label.to_words());
        self.set_page_bit(vda, !label.is_free());
    }

    #[must_use]
    pub fn data(&self, vda: u32) -> &[u8] {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].data(local)
    }

    pub fn data_mut(&mut self, vda: u32) -> &mut [u8] {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].data_mut(local)
    }

    #[must_use]
    pub fn data_word(&self, vda: u32, index: usize) -> u16 {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].data_word(local, index)
    }

    pub fn set_data_word(&mut self, vda: u32, index: usize, value: u16) {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].set_data_word(local, index, value);
    }

    pub fn set_header(&mut self, vda: u32, rda: u16) {
        let (disk, local) = self.disk_of(vda);
        self.disks[disk].set_header_word(local, 0, rda);
        self.disks[disk].set_header_word(local, 1, 0);
    }

    #[must_use]
    pub fn rda_of(&self, vda: u32) -> u16 {
        self.geometry.vda_to_rda(vda)
    }

    /// Resolve a label link. `rda == 0` is the chain terminator.
    pub fn vda_of(&self, rda: u16) -> Result<u32, FsError> {
        self.geometry
            .rda_to_vda(rda)
            .ok_or(FsError::BadDiskAddress(rda))
    }

    // -----------------------------------------------------------------------
    // Free-page bitmap
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn page_bit(&self, vda: u32) -> bool {
        self.bitmap[(vda / 16) as usize] & (0x8000u16 >> (vda % 16)) != 0
    }

    fn set_page_bit(&mut self, vda: u32, allocated: bool) {
        let word = (vda / 16) as usize;
        let mask = 0x8000u16 >> (vda % 16);
        let was = self.bitmap[word] & mask != 0;
        if allocated {
            self.bitmap[word] |= mask;
        } else {
            self.bitmap[word] &= !mask;
        }
        if was != allocated {
            if allocated {
                self.free_pages -= 1;
            } else {
                self.free_pages += 1;
            }
        }
    }

    /// Number of 16-bit words in the bitmap.
    #[must_use]
    pub fn bitmap_words(&self) -> usize {
        self.bitmap.len()
    }

    #[must_use]
    pub fn bitmap(&self) -> &[u16] {
        &self.bitmap
    }

    /// Recompute the bitmap, free-page count and last serial number from the
    /// labels. The labels are the ground truth; the `DiskDescriptor` copy is
    /// a hint.
    pub fn rebuild_bitmap(&mut self) {
        let pages = self.num_pages();
        self.bitmap = vec![0; pages.div_ceil(16) as usize];
        self.free_pages = pages;
        let mut last = SerialNumber::default();
        for vda in 0..pages {
            let label = self.label(vda);
            if !label.is_free() {
                self.set_page_bit(vda, true);
                if label.sn.effective() > last.effective() {
                    last = label.sn;
                }
            }
        }
        self.last_sn = last;
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Claim the first free page. The caller must give the page a non-free
    /// label in the same operation; until then the bitmap and labels disagree.
    pub fn allocate_page(&mut self) -> Result<u32, FsError> {
        let pages = self.num_pages();
        let mut found = None;
        'scan: for (word, &bits) in self.bitmap.iter().enumerate() {
            if bits == 0xFFFF {
                continue;
            }
            for bit in 0u32..16 {
                if bits & (0x8000u16 >> bit) == 0 {
                    let vda = (word as u32) * 16 + bit;
                    if vda < pages {
                        found = Some(vda);
                    }
                    break 'scan;
                }
            }
        }
        match found {
            Some(vda) => {
                self.set_page_bit(vda, true);
                Ok(vda)
            }
            None => Err(FsError::DiskFull),
        }
    }

    /// Return a page to the free list.
    pub fn free_page(&mut self, vda: u32) {
        self.set_label(vda, &Label::free());
    }

    /// Allocate the next file serial number, preserving the given flags.
    pub fn next_sn(&mut self, flags: u16) -> SerialNumber {
        let next = self.last_sn.successor();
        self.last_sn = next;
        SerialNumber::new((next.word1 & 0x1FFF) | flags, next.word2)
    }
}
