#![forbid(unsafe_code)]
//! Namespace operation tests over an in-memory volume.

use flatfs_block::{BlockDevice, MemBlockDevice};
use flatfs_core::{FlatFs, ListEntry};
use flatfs_error::FsError;
use flatfs_ondisk::Superblock;
use flatfs_types::{BlockIndex, DirRef, SlotIndex, BLOCK_SIZE};

/// Mount a freshly formatted volume, keeping a handle on the device so the
/// tests can inspect what actually hit the disk.
fn mount_empty() -> (FlatFs, MemBlockDevice) {
    let dev = MemBlockDevice::new();
    dev.write_block(BlockIndex::METADATA, &Superblock::new_empty().to_bytes())
        .unwrap();
    let mut fs = FlatFs::new();
    fs.mount_device("vdisk", Box::new(dev.clone())).unwrap();
    (fs, dev)
}

fn on_disk_superblock(dev: &MemBlockDevice) -> Superblock {
    Superblock::parse(&dev.read_block(BlockIndex::METADATA).unwrap())
}

#[test]
fn fresh_mount_starts_at_root() {
    let (fs, _dev) = mount_empty();
    assert!(fs.is_mounted());
    assert_eq!(fs.current_dir(), Some(DirRef::Root));
    assert_eq!(fs.disk_name(), Some("vdisk"));
}

#[test]
fn create_file_allocates_first_fit_and_persists() {
    let (mut fs, dev) = mount_empty();
    fs.create("memo", 3).unwrap();

    let sb = fs.superblock().unwrap();
    let rec = &sb.records[0];
    assert!(rec.is_used());
    assert!(!rec.is_directory());
    assert_eq!(rec.name(), "memo");
    assert_eq!(rec.size_blocks(), 3);
    assert_eq!(rec.start_block(), BlockIndex(1));
    assert_eq!(rec.parent(), DirRef::Root);

    for b in 1..=3u8 {
        assert!(!flatfs_alloc::is_free(&sb.free_block_list, BlockIndex(b)));
    }
    assert!(flatfs_alloc::is_free(&sb.free_block_list, BlockIndex(4)));

    // The metadata block on disk matches the in-memory state.
    assert_eq!(&on_disk_superblock(&dev), fs.superblock().unwrap());
}

#[test]
fn duplicate_names_conflict_case_insensitively() {
    let (mut fs, _dev) = mount_empty();
    fs.create("memo", 3).unwrap();
    let before = fs.superblock().unwrap().to_bytes();

    match fs.create("MEMO", 2) {
        Err(FsError::NameConflict(name)) => assert_eq!(name, "MEMO"),
        other => panic!("expected NameConflict, got {other:?}"),
    }
    // Failed create is a complete no-op.
    assert_eq!(fs.superblock().unwrap().to_bytes(), before);
}

#[test]
fn dot_names_are_reserved() {
    let (mut fs, _dev) = mount_empty();
    assert!(matches!(fs.create(".", 0), Err(FsError::NameConflict(_))));
    assert!(matches!(fs.create("..", 1), Err(FsError::NameConflict(_))));
}

#[test]
fn free_slot_is_checked_before_the_name() {
    let (mut fs, _dev) = mount_empty();
    for i in 0..126u8 {
        fs.create(&format!("d{i}"), 0).unwrap();
    }
    // "d0" is both a duplicate and unplaceable; the slot check runs first.
    match fs.create("d0", 0) {
        Err(FsError::TableFull { disk, name }) => {
            assert_eq!(disk, "vdisk");
            assert_eq!(name, "d0");
        }
        other => panic!("expected TableFull, got {other:?}"),
    }
}

#[test]
fn allocation_fails_without_a_long_enough_run() {
    let (mut fs, _dev) = mount_empty();
    fs.create("a", 60).unwrap(); // blocks 1-60
    fs.create("b", 60).unwrap(); // blocks 61-120
    fs.delete("a").unwrap(); // free: 1-60 and 121-127

    match fs.create("c", 61) {
        Err(FsError::AllocationFailure { disk, size }) => {
            assert_eq!(disk, "vdisk");
            assert_eq!(size, 61);
        }
        other => panic!("expected AllocationFailure, got {other:?}"),
    }
    // A fit-sized request still succeeds, first-fit at block 1.
    fs.create("c", 60).unwrap();
    let sb = fs.superblock().unwrap();
    let c = sb
        .records
        .iter()
        .find(|r| r.is_used() && r.name() == "c")
        .unwrap();
    assert_eq!(c.start_block(), BlockIndex(1));
}

#[test]
fn buffer_round_trips_through_a_file_block() {
    let (mut fs, dev) = mount_empty();
    fs.create("memo", 3).unwrap();

    fs.set_buffer(&[0xAA; BLOCK_SIZE]).unwrap();
    fs.write("memo", 1).unwrap();

    // Clobber the buffer, then read the block back.
    fs.set_buffer(b"something else").unwrap();
    fs.read("memo", 1).unwrap();
    assert_eq!(fs.buffer(), &[0xAA; BLOCK_SIZE]);

    // write() landed at absolute block start + 1 = 2.
    assert_eq!(dev.read_block(BlockIndex(2)).unwrap(), [0xAA; BLOCK_SIZE]);
    // Unwritten neighbors stay zero (create zero-fills).
    assert_eq!(dev.read_block(BlockIndex(1)).unwrap(), [0u8; BLOCK_SIZE]);
}

#[test]
fn set_buffer_zero_fills_the_tail() {
    let (mut fs, _dev) = mount_empty();
    fs.set_buffer(&[0xFF; BLOCK_SIZE]).unwrap();
    fs.set_buffer(b"abc").unwrap();
    assert_eq!(&fs.buffer()[..3], b"abc");
    assert!(fs.buffer()[3..].iter().all(|&b| b == 0));
}

#[test]
fn write_does_not_touch_metadata() {
    let (mut fs, dev) = mount_empty();
    fs.create("memo", 1).unwrap();
    let metadata_before = dev.read_block(BlockIndex::METADATA).unwrap();

    fs.set_buffer(&[7u8; 16]).unwrap();
    fs.write("memo", 0).unwrap();
    assert_eq!(
        dev.read_block(BlockIndex::METADATA).unwrap(),
        metadata_before
    );
}

#[test]
fn create_then_delete_restores_state_byte_for_byte() {
    let (mut fs, dev) = mount_empty();
    let pristine = fs.superblock().unwrap().to_bytes();

    fs.create("memo", 3).unwrap();
    fs.set_buffer(&[0x5A; BLOCK_SIZE]).unwrap();
    fs.write("memo", 0).unwrap();
    fs.delete("memo").unwrap();

    assert_eq!(fs.superblock().unwrap().to_bytes(), pristine);
    assert_eq!(&on_disk_superblock(&dev), fs.superblock().unwrap());
    // Freed blocks are zero-filled on disk.
    for b in 1..=3u8 {
        assert_eq!(dev.read_block(BlockIndex(b)).unwrap(), [0u8; BLOCK_SIZE]);
    }

    let (mut fs2, _dev2) = mount_empty();
    fs2.create("sub", 0).unwrap();
    fs2.delete("sub").unwrap();
    assert_eq!(fs2.superblock().unwrap().to_bytes(), pristine);
}

#[test]
fn deleting_a_directory_cascades() {
    let (mut fs, dev) = mount_empty();
    let pristine = fs.superblock().unwrap().to_bytes();

    fs.create("sub", 0).unwrap();
    fs.change_directory("sub").unwrap();
    fs.create("inner", 0).unwrap();
    fs.create("data", 4).unwrap();
    fs.change_directory("inner").unwrap();
    fs.create("deep", 2).unwrap();
    fs.change_directory("..").unwrap();
    fs.change_directory("..").unwrap();

    fs.delete("sub").unwrap();

    assert_eq!(fs.superblock().unwrap().to_bytes(), pristine);
    let sb = on_disk_superblock(&dev);
    assert!(sb.records.iter().all(flatfs_ondisk::Record::is_zeroed));
    for b in 1..=6u8 {
        assert_eq!(dev.read_block(BlockIndex(b)).unwrap(), [0u8; BLOCK_SIZE]);
    }
}

#[test]
fn delete_reports_not_found_distinctly() {
    let (mut fs, _dev) = mount_empty();
    match fs.delete("nope") {
        Err(FsError::NotFound(name)) => assert_eq!(name, "nope"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn read_and_write_unify_absent_and_directory() {
    let (mut fs, _dev) = mount_empty();
    fs.create("sub", 0).unwrap();

    assert!(matches!(fs.read("nope", 0), Err(FsError::NotAFile(_))));
    assert!(matches!(fs.read("sub", 0), Err(FsError::NotAFile(_))));
    assert!(matches!(fs.write("nope", 0), Err(FsError::NotAFile(_))));
    assert!(matches!(fs.write("sub", 0), Err(FsError::NotAFile(_))));
}

#[test]
fn block_index_must_be_inside_the_file() {
    let (mut fs, _dev) = mount_empty();
    fs.create("memo", 2).unwrap();
    fs.read("memo", 1).unwrap();
    match fs.read("memo", 2) {
        Err(FsError::BlockOutOfRange { name, block }) => {
            assert_eq!(name, "memo");
            assert_eq!(block, 2);
        }
        other => panic!("expected BlockOutOfRange, got {other:?}"),
    }
    assert!(matches!(
        fs.write("memo", 126),
        Err(FsError::BlockOutOfRange { .. })
    ));
}

#[test]
fn listing_orders_dot_dotdot_then_slot_order() {
    let (mut fs, _dev) = mount_empty();
    fs.create("bravo", 2).unwrap();
    fs.create("alpha", 0).unwrap();
    fs.create("chrly", 1).unwrap();

    let entries = fs.list().unwrap();
    assert_eq!(
        entries,
        vec![
            ListEntry::Directory {
                name: ".".to_owned(),
                entries: 5
            },
            ListEntry::Directory {
                name: "..".to_owned(),
                entries: 5
            },
            ListEntry::File {
                name: "bravo".to_owned(),
                size: 2
            },
            ListEntry::Directory {
                name: "alpha".to_owned(),
                entries: 2
            },
            ListEntry::File {
                name: "chrly".to_owned(),
                size: 1
            },
        ]
    );
}

#[test]
fn root_listing_reports_equal_counts_for_both_dots() {
    let (mut fs, _dev) = mount_empty();
    fs.create("memo", 1).unwrap();
    let entries = fs.list().unwrap();
    let (dot, dotdot) = (&entries[0], &entries[1]);
    match (dot, dotdot) {
        (
            ListEntry::Directory { entries: a, .. },
            ListEntry::Directory { entries: b, .. },
        ) => assert_eq!(a, b),
        other => panic!("expected two directory entries, got {other:?}"),
    }
}

#[test]
fn subdirectory_listing_counts_parent_separately() {
    let (mut fs, _dev) = mount_empty();
    fs.create("sub", 0).unwrap();
    fs.create("memo", 1).unwrap();
    fs.change_directory("sub").unwrap();
    fs.create("note", 1).unwrap();

    let entries = fs.list().unwrap();
    // "." counts note + dots = 3; ".." counts sub + memo + dots = 4.
    assert_eq!(
        entries[0],
        ListEntry::Directory {
            name: ".".to_owned(),
            entries: 3
        }
    );
    assert_eq!(
        entries[1],
        ListEntry::Directory {
            name: "..".to_owned(),
            entries: 4
        }
    );
}

#[test]
fn change_directory_walks_and_stays_at_root() {
    let (mut fs, _dev) = mount_empty();
    fs.create("sub", 0).unwrap();
    fs.create("memo", 1).unwrap();

    fs.change_directory(".").unwrap();
    assert_eq!(fs.current_dir(), Some(DirRef::Root));

    fs.change_directory("..").unwrap();
    assert_eq!(fs.current_dir(), Some(DirRef::Root));

    fs.change_directory("SUB").unwrap();
    assert_eq!(fs.current_dir(), Some(DirRef::Slot(SlotIndex(0))));

    fs.change_directory("..").unwrap();
    assert_eq!(fs.current_dir(), Some(DirRef::Root));

    assert!(matches!(
        fs.change_directory("memo"),
        Err(FsError::NotADirectory(_))
    ));
    assert!(matches!(
        fs.change_directory("nope"),
        Err(FsError::NotADirectory(_))
    ));
}

#[test]
fn lookups_are_case_insensitive_everywhere() {
    let (mut fs, _dev) = mount_empty();
    fs.create("Memo", 1).unwrap();
    fs.create("Sub", 0).unwrap();

    fs.read("MEMO", 0).unwrap();
    fs.write("memo", 0).unwrap();
    fs.change_directory("sUB").unwrap();
    fs.change_directory("..").unwrap();
    fs.delete("mEmO").unwrap();
    assert!(matches!(fs.read("memo", 0), Err(FsError::NotAFile(_))));
}

#[test]
fn same_name_allowed_in_different_directories() {
    let (mut fs, _dev) = mount_empty();
    fs.create("memo", 1).unwrap();
    fs.create("sub", 0).unwrap();
    fs.change_directory("sub").unwrap();
    fs.create("memo", 2).unwrap();

    let entries = fs.list().unwrap();
    assert!(entries.contains(&ListEntry::File {
        name: "memo".to_owned(),
        size: 2
    }));
}

#[test]
fn truncated_store_does_not_match_the_long_query() {
    let (mut fs, _dev) = mount_empty();
    // Stored as "image" (5 bytes).
    fs.create("image", 1).unwrap();
    assert!(matches!(fs.read("images", 0), Err(FsError::NotAFile(_))));
    fs.read("image", 0).unwrap();
}
