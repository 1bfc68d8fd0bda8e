//! Diablo Model 31 disk pack image parser.
//!
//! A pack is 203 cylinders x 2 heads x 12 sectors = 4872 pages. Each page is
//! stored on disk as 266 little-endian 16-bit words: a 2-word header, an
//! 8-word label and 256 data words (512 bytes). Images hold one or two packs
//! back to back; pages are addressed linearly by VDA (virtual disk address).
//!
//! Two container formats exist: `Raw` is the bare sector dump; `Bfs` prefixes
//! it with a 512-byte descriptor block carrying the pack geometry.

use std::fmt;

pub const NUM_CYLINDERS: u32 = 203;
pub const NUM_HEADS: u32 = 2;
pub const NUM_SECTORS: u32 = 12;
pub const PAGES_PER_DISK: u32 = NUM_CYLINDERS * NUM_HEADS * NUM_SECTORS;

/// Bytes in the data region of a page.
pub const PAGE_DATA_BYTES: usize = 512;
pub const HEADER_WORDS: usize = 2;
pub const LABEL_WORDS: usize = 8;
/// On-disk size of one page: header + label + data, as 16-bit words.
pub const PAGE_ON_DISK_BYTES: usize = (HEADER_WORDS + LABEL_WORDS) * 2 + PAGE_DATA_BYTES;

/// Size of the BFS descriptor block that precedes the sector dump.
pub const BFS_HEADER_BYTES: usize = 512;
const BFS_MAGIC: [u8; 4] = *b"BFS1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Bare sector dump.
    Raw,
    /// Sector dump prefixed with a 512-byte geometry descriptor.
    Bfs,
}

#[derive(Debug)]
pub enum DiabloError {
    InvalidSize(usize),
    BadBfsHeader,
    GeometryMismatch { disks: u16, cylinders: u16, heads: u16, sectors: u16 },
}

impl fmt::Display for DiabloError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize(size) => write!(
                f,
                "invalid image size: {} bytes (expected {} for one pack or {} for two)",
                size,
                PAGES_PER_DISK as usize * PAGE_ON_DISK_BYTES,
                2 * PAGES_PER_DISK as usize * PAGE_ON_DISK_BYTES,
            ),
            Self::BadBfsHeader => write!(f, "missing or corrupt BFS descriptor"),
            Self::GeometryMismatch {
                disks,
                cylinders,
                heads,
                sectors,
            } => write!(
                f,
                "unsupported geometry: {disks} disk(s), {cylinders} cylinders, {heads} heads, {sectors} sectors",
            ),
        }
    }
}

impl std::error::Error for DiabloError {}

/// Pack geometry. Fixed per drive model; the disk count is the only variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub num_disks: u32,
    pub num_cylinders: u32,
    pub num_heads: u32,
    pub num_sectors: u32,
}

impl Geometry {
    #[must_use]
    pub const fn new(num_disks: u32) -> Self {
        Self {
            num_disks,
            num_cylinders: NUM_CYLINDERS,
            num_heads: NUM_HEADS,
            num_sectors: NUM_SECTORS,
        }
    }

    /// Total pages across all packs.
    #[must_use]
    pub const fn num_pages(&self) -> u32 {
        self.num_disks * self.num_cylinders * self.num_heads * self.num_sectors
    }

    /// Pack a VDA into the Diablo real disk address word:
    /// sector in bits 12-15, cylinder in 3-11, head in bit 2, disk in bit 1.
    /// Bit 0 is the restore flag and is never set for an address.
    #[must_use]
    pub fn vda_to_rda(&self, vda: u32) -> u16 {
        let disk = vda / PAGES_PER_DISK;
        let rest = vda % PAGES_PER_DISK;
        let cylinder = rest / (self.num_heads * self.num_sectors);
        let rest = rest % (self.num_heads * self.num_sectors);
        let head = rest / self.num_sectors;
        let sector = rest % self.num_sectors;
        ((sector << 12) | (cylinder << 3) | (head << 2) | (disk << 1)) as u16
    }

    /// Unpack a real disk address word. Returns `None` for out-of-range
    /// cylinder/sector fields or a disk beyond the pack count.
    #[must_use]
    pub fn rda_to_vda(&self, rda: u16) -> Option<u32> {
        let sector = u32::from(rda >> 12) & 0xF;
        let cylinder = (u32::from(rda) >> 3) & 0x1FF;
        let head = (u32::from(rda) >> 2) & 1;
        let disk = (u32::from(rda) >> 1) & 1;
        if sector >= self.num_sectors || cylinder >= self.num_cylinders || disk >= self.num_disks {
            return None;
        }
        Some(
            disk * PAGES_PER_DISK
                + cylinder * self.num_heads * self.num_sectors
                + head * self.num_sectors
                + sector,
        )
    }
}

/// A Diablo pack image held in memory.
pub struct DiabloImage {
    data: Vec<u8>,
    geometry: Geometry,
}

impl DiabloImage {
    /// Create a blank (all-zero) image for the given number of packs.
    #[must_use]
    pub fn new(num_disks: u32) -> Self {
        let geometry = Geometry::new(num_disks);
        Self {
            data: vec![0; geometry.num_pages() as usize * PAGE_ON_DISK_BYTES],
            geometry,
        }
    }

    /// Parse an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte count matches neither a one- nor a
    /// two-pack dump, or if the BFS descriptor is missing or inconsistent.
    pub fn from_bytes(data: Vec<u8>, format: ImageFormat) -> Result<Self, DiabloError> {
        let data = match format {
            ImageFormat::Raw => data,
            ImageFormat::Bfs => Self::strip_bfs_header(data)?,
        };
        let page_bytes = PAGES_PER_DISK as usize * PAGE_ON_DISK_BYTES;
        let num_disks = match data.len() {
            n if n == page_bytes => 1,
            n if n == 2 * page_bytes => 2,
            other => return Err(DiabloError::InvalidSize(other)),
        };
        Ok(Self {
            data,
            geometry: Geometry::new(num_disks),
        })
    }

    fn strip_bfs_header(data: Vec<u8>) -> Result<Vec<u8>, DiabloError> {
        if data.len() < BFS_HEADER_BYTES || data[0..4] != BFS_MAGIC {
            return Err(DiabloError::BadBfsHeader);
        }
        let word = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let disks = word(4);
        let cylinders = word(6);
        let heads = word(8);
        let sectors = word(10);
        if !(disks == 1 || disks == 2)
            || u32::from(cylinders) != NUM_CYLINDERS
            || u32::from(heads) != NUM_HEADS
            || u32::from(sectors) != NUM_SECTORS
        {
            return Err(DiabloError::GeometryMismatch {
                disks,
                cylinders,
                heads,
                sectors,
            });
        }
        Ok(data[BFS_HEADER_BYTES..].to_vec())
    }

    /// Serialise the image in the requested container format.
    #[must_use]
    pub fn to_bytes(&self, format: ImageFormat) -> Vec<u8> {
        match format {
            ImageFormat::Raw => self.data.clone(),
            ImageFormat::Bfs => {
                let mut out = vec![0u8; BFS_HEADER_BYTES];
                out[0..4].copy_from_slice(&BFS_MAGIC);
                let mut put = |i: usize, v: u16| out[i..i + 2].copy_from_slice(&v.to_le_bytes());
                put(4, self.geometry.num_disks as u16);
                put(6, self.geometry.num_cylinders as u16);
                put(8, self.geometry.num_heads as u16);
                put(10, self.geometry.num_sectors as u16);
                out.extend_from_slice(&self.data);
                out
            }
        }
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.geometry.num_pages()
    }

    fn page_offset(&self, vda: u32) -> usize {
        debug_assert!(vda < self.num_pages());
        vda as usize * PAGE_ON_DISK_BYTES
    }

    fn word_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn set_word_at(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[must_use]
    pub fn header_word(&self, vda: u32, index: usize) -> u16 {
        debug_assert!(index < HEADER_WORDS);
        self.word_at(self.page_offset(vda) + index * 2)
    }

    pub fn set_header_word(&mut self, vda: u32, index: usize, value: u16) {
        debug_assert!(index < HEADER_WORDS);
        let offset = self.page_offset(vda) + index * 2;
        self.set_word_at(offset, value);
    }

    #[must_use]
    pub fn label_word(&self, vda: u32, index: usize) -> u16 {
        debug_assert!(index < LABEL_WORDS);
        self.word_at(self.page_offset(vda) + (HEADER_WORDS + index) * 2)
    }

    pub fn set_label_word(&mut self, vda: u32, index: usize, value: u16) {
        debug_assert!(index < LABEL_WORDS);
        let offset = self.page_offset(vda) + (HEADER_WORDS + index) * 2;
        self.set_word_at(offset, value);
    }

    #[must_use]
    pub fn label_words(&self, vda: u32) -> [u16; LABEL_WORDS] {
        let mut words = [0u16; LABEL_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.label_word(vda, i);
        }
        words
    }

    pub fn set_label_words(&mut self, vda: u32, words: &[u16; LABEL_WORDS]) {
        for (i, &w) in words.iter().enumerate() {
            self.set_label_word(vda, i, w);
        }
    }

    /// The 512-byte data region of a page.
    #[must_use]
    pub fn data(&self, vda: u32) -> &[u8] {
        let start = self.page_offset(vda) + (HEADER_WORDS + LABEL_WORDS) * 2;
        &self.data[start..start + PAGE_DATA_BYTES]
    }

    pub fn data_mut(&mut self, vda: u32) -> &mut [u8] {
        let start = self.page_offset(vda) + (HEADER_WORDS + LABEL_WORDS) * 2;
        &mut self.data[start..start + PAGE_DATA_BYTES]
    }

    /// A 16-bit word from the data region, little-endian.
    #[must_use]
    pub fn data_word(&self, vda: u32, index: usize) -> u16 {
        debug_assert!(index < PAGE_DATA_BYTES / 2);
        let start = self.page_offset(vda) + (HEADER_WORDS + LABEL_WORDS) * 2;
        self.word_at(start + index * 2)
    }

    pub fn set_data_word(&mut self, vda: u32, index: usize, value: u16) {
        debug_assert!(index < PAGE_DATA_BYTES / 2);
        let offset = self.page_offset(vda) + (HEADER_WORDS + LABEL_WORDS) * 2 + index * 2;
        self.set_word_at(offset, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_invalid_size() {
        assert!(DiabloImage::from_bytes(vec![0; 100], ImageFormat::Raw).is_err());
    }

    #[test]
    fn accept_one_and_two_packs() {
        let one = PAGES_PER_DISK as usize * PAGE_ON_DISK_BYTES;
        assert_eq!(
            DiabloImage::from_bytes(vec![0; one], ImageFormat::Raw)
                .expect("one pack")
                .num_pages(),
            PAGES_PER_DISK
        );
        assert_eq!(
            DiabloImage::from_bytes(vec![0; 2 * one], ImageFormat::Raw)
                .expect("two packs")
                .num_pages(),
            2 * PAGES_PER_DISK
        );
    }

    #[test]
    fn rda_round_trip() {
        let geometry = Geometry::new(2);
        for vda in [0, 1, 11, 12, 23, 24, 4871, 4872, 9743] {
            let rda = geometry.vda_to_rda(vda);
            assert_eq!(geometry.rda_to_vda(rda), Some(vda), "vda {vda}");
        }
    }

    #[test]
    fn rda_field_packing() {
        let geometry = Geometry::new(1);
        // cylinder 1, head 0, sector 0 -> VDA 24
        assert_eq!(geometry.vda_to_rda(24), 1 << 3);
        // cylinder 0, head 1, sector 0 -> VDA 12
        assert_eq!(geometry.vda_to_rda(12), 1 << 2);
        // cylinder 0, head 0, sector 5 -> VDA 5
        assert_eq!(geometry.vda_to_rda(5), 5 << 12);
    }

    #[test]
    fn rda_rejects_bad_fields() {
        let geometry = Geometry::new(1);
        // sector 13 does not exist
        assert_eq!(geometry.rda_to_vda(13 << 12), None);
        // disk 1 on a one-pack image
        assert_eq!(geometry.rda_to_vda(1 << 1), None);
    }

    #[test]
    fn label_and_data_round_trip() {
        let mut image = DiabloImage::new(1);
        let words = [1, 2, 3, 4, 5, 6, 7, 8];
        image.set_label_words(100, &words);
        assert_eq!(image.label_words(100), words);

        image.data_mut(100)[0..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&image.data(100)[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(image.data_word(100, 0), 0xADDE);
        // Neighbouring pages untouched
        assert_eq!(image.label_words(99), [0; 8]);
        assert_eq!(image.label_words(101), [0; 8]);
    }

    #[test]
    fn bfs_round_trip() {
        let mut image = DiabloImage::new(1);
        image.set_label_word(7, 0, 0x1234);
        let bytes = image.to_bytes(ImageFormat::Bfs);
        assert_eq!(
            bytes.len(),
            BFS_HEADER_BYTES + PAGES_PER_DISK as usize * PAGE_ON_DISK_BYTES
        );
        let parsed = DiabloImage::from_bytes(bytes, ImageFormat::Bfs).expect("valid BFS");
        assert_eq!(parsed.label_word(7, 0), 0x1234);
    }

    #[test]
    fn bfs_rejects_raw_dump() {
        let raw = DiabloImage::new(1).to_bytes(ImageFormat::Raw);
        assert!(DiabloImage::from_bytes(raw, ImageFormat::Bfs).is_err());
    }
}
