//! End-to-end filesystem tests on freshly formatted packs.

use alto_fs::{AltoFs, FsError, IntegrityError, Label};
use format_diablo::ImageFormat;

fn fresh() -> AltoFs {
    AltoFs::create(1).expect("format")
}

/// The bitmap must mirror `label.version != 0xFFFF` for every page.
fn assert_bitmap_invariant(fs: &AltoFs) {
    for vda in 0..fs.num_pages() {
        assert_eq!(
            fs.page_bit(vda),
            !fs.label(vda).is_free(),
            "bitmap/label disagree at VDA {vda}"
        );
    }
}

/// Walk a file's chain checking page numbers are 0, 1, 2, ... to the end.
fn assert_chain_closure(fs: &AltoFs, leader_vda: u32) {
    let mut expected = 0u16;
    let mut vda = Some(leader_vda);
    while let Some(v) = vda {
        let label = fs.label(v);
        assert!(!label.is_free(), "free page {v} inside chain");
        assert_eq!(label.file_pgnum, expected, "page number at VDA {v}");
        expected += 1;
        vda = fs.next_vda(v).expect("valid link");
    }
    assert!(expected > 0);
}

#[test]
fn fresh_image_is_clean() {
    let fs = fresh();
    let report = fs.check().expect("check runs");
    assert!(report.is_clean(), "fresh image: {:?}", report.errors);
    assert_bitmap_invariant(&fs);
}

#[test]
fn insert_extract_round_trip() {
    let mut fs = fresh();
    let content: Vec<u8> = (0..1300u32).map(|i| (i * 7) as u8).collect();
    fs.insert_file("doc.txt", &content, 12345).expect("insert");

    let back = fs.extract_file("doc.txt", false).expect("extract");
    assert_eq!(back, content);

    let fe = fs.find_file("doc.txt").expect("find");
    assert_eq!(fs.read_leader(fe.leader_vda).name, "doc.txt");
    assert_eq!(fs.read_leader(fe.leader_vda).written, 12345);
    assert_chain_closure(&fs, fe.leader_vda);
    assert_bitmap_invariant(&fs);
}

#[test]
fn listing_reports_host_size() {
    let mut fs = fresh();
    fs.insert_file("doc.txt", &[0xAB; 777], 1).expect("insert");
    let listing = fs.list_directory("SysDir").expect("list");
    let entry = listing
        .iter()
        .find(|e| e.name == "doc.txt")
        .expect("listed");
    assert_eq!(entry.length, 777);
}

#[test]
fn find_file_is_case_insensitive() {
    let mut fs = fresh();
    fs.insert_file("Hello.Bcpl", b"resultis 0", 1).expect("insert");
    assert!(fs.find_file("hello.bcpl").is_ok());
    assert!(fs.find_file("HELLO.BCPL").is_ok());
    assert!(matches!(
        fs.find_file("hello.bcp"),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn replace_shrinks_and_frees_pages() {
    let mut fs = fresh();
    fs.insert_file("big", &[1u8; 5000], 1).expect("insert");
    let free_after_big = fs.free_pages();
    fs.replace_file("big", &[2u8; 100], 2).expect("replace");
    assert!(fs.free_pages() > free_after_big, "tail pages not freed");
    assert_eq!(fs.extract_file("big", false).expect("extract"), vec![2u8; 100]);
    assert_bitmap_invariant(&fs);
}

#[test]
fn remove_frees_pages_and_preserves_following_entries() {
    let mut fs = fresh();
    fs.insert_file("first", &[1u8; 2000], 1).expect("insert");
    fs.insert_file("second", &[2u8; 100], 1).expect("insert");
    let free_before = fs.free_pages();

    fs.remove_file("first", true).expect("remove");
    assert!(fs.free_pages() > free_before);
    assert!(matches!(fs.find_file("first"), Err(FsError::NotFound(_))));
    // The entry behind the removed one must still resolve.
    assert!(fs.find_file("second").is_ok());
    assert_bitmap_invariant(&fs);
}

#[test]
fn remove_without_underlying_keeps_pages() {
    let mut fs = fresh();
    fs.insert_file("keep", &[3u8; 600], 1).expect("insert");
    let free_before = fs.free_pages();
    fs.remove_file("keep", false).expect("remove");
    assert_eq!(fs.free_pages(), free_before);
    assert!(fs.find_file("keep").is_err());
}

#[test]
fn subdirectories_resolve_by_path() {
    let mut fs = fresh();
    fs.make_directory("src").expect("mkdir");
    fs.insert_file("src/main.bcpl", b"let main() be []", 1)
        .expect("insert");
    let back = fs.extract_file("src/main.bcpl", false).expect("extract");
    assert_eq!(back, b"let main() be []");
    // The file is not in the root directory.
    assert!(matches!(
        fs.find_file("main.bcpl"),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn trim_cuts_the_chain() {
    let mut fs = fresh();
    fs.insert_file("t", &[9u8; 1500], 1).expect("insert");
    let fe = fs.find_file("t").expect("find");
    let mut of = fs.open_file(fe);
    fs.seek_data(&mut of).expect("seek");
    let mut buf = [0u8; 700];
    assert_eq!(fs.read_file(&mut of, &mut buf).expect("read"), 700);
    fs.trim_file(&of).expect("trim");
    assert_eq!(fs.file_length(fe.leader_vda).expect("length"), 700);
    assert_chain_closure(&fs, fe.leader_vda);
    assert_bitmap_invariant(&fs);
}

#[test]
fn scavenge_on_clean_image_is_a_no_op() {
    let mut fs = fresh();
    fs.insert_file("a.txt", &[1u8; 900], 1).expect("insert");
    fs.insert_file("b.txt", &[2u8; 40], 1).expect("insert");
    fs.update_descriptor().expect("descriptor");
    let before = fs.disks()[0].to_bytes(ImageFormat::Raw);

    let report = fs.scavenge().expect("scavenge");
    assert_eq!(report.pages_freed, 0);
    assert_eq!(report.entries_added, 0);
    assert_eq!(report.entries_removed, 0);

    let after = fs.disks()[0].to_bytes(ImageFormat::Raw);
    assert_eq!(before, after, "scavenge changed a clean image");
}

#[test]
fn scavenge_recovers_from_wiped_root_leader() {
    let mut fs = fresh();
    fs.insert_file("hello.bcpl", b"get \"streams.d\"", 1)
        .expect("insert");

    // Wipe the root directory leader page's contents.
    fs.data_mut(alto_fs::SYSDIR_VDA).fill(0);

    fs.scavenge().expect("scavenge");
    let fe = fs.find_file("hello.bcpl").expect("recovered");
    assert_eq!(
        fs.extract_file("hello.bcpl", false).expect("extract"),
        b"get \"streams.d\""
    );
    assert_eq!(fs.read_leader(alto_fs::SYSDIR_VDA).name, "SysDir.");
    assert_chain_closure(&fs, fe.leader_vda);
    assert_bitmap_invariant(&fs);
    assert!(fs.check().expect("check").is_clean());
}

#[test]
fn scavenge_readds_files_lost_from_the_directory() {
    let mut fs = fresh();
    fs.insert_file("lost.run", &[7u8; 1024], 1).expect("insert");
    // Drop the directory entry but keep the pages.
    fs.remove_file("lost.run", false).expect("unlink");
    assert!(fs.find_file("lost.run").is_err());

    let report = fs.scavenge().expect("scavenge");
    assert_eq!(report.entries_added, 1);
    assert_eq!(
        fs.extract_file("lost.run", false).expect("extract"),
        vec![7u8; 1024]
    );
}

#[test]
fn check_reports_chain_damage() {
    let mut fs = fresh();
    fs.insert_file("x", &[1u8; 600], 1).expect("insert");
    let fe = fs.find_file("x").expect("find");
    let data_vda = fs.next_vda(fe.leader_vda).expect("link").expect("page");

    // Knock a data page out of the chain.
    fs.set_label(data_vda, &Label::free());

    let report = fs.check().expect("check");
    assert!(!report.is_clean());
    assert!(
        report
            .errors
            .iter()
            .any(|e| matches!(e, IntegrityError::BrokenChain { .. })),
        "damage not reported: {:?}",
        report.errors
    );
}

#[test]
fn check_reports_dangling_directory_entry() {
    let mut fs = fresh();
    fs.insert_file("gone", &[1u8; 10], 1).expect("insert");
    let fe = fs.find_file("gone").expect("find");

    // Free the whole file behind the directory's back.
    let mut vda = Some(fe.leader_vda);
    while let Some(v) = vda {
        vda = fs.next_vda(v).expect("link");
        fs.set_label(v, &Label::free());
    }

    let report = fs.check().expect("check");
    assert!(
        report
            .errors
            .iter()
            .any(|e| matches!(e, IntegrityError::BadDirectoryEntry { .. })),
        "dangling entry not reported: {:?}",
        report.errors
    );
}

#[test]
fn disk_full_is_reported() {
    let mut fs = fresh();
    // One data page per file: exhaust the pack.
    let mut err = None;
    for i in 0..fs.num_pages() {
        match fs.insert_file(&format!("f{i}"), &[0u8; 1], 1) {
            Ok(()) => {}
            Err(e) => {
                err = Some(e);
                break;
            }
        }
    }
    assert!(matches!(err, Some(FsError::DiskFull)));
}
