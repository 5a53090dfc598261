//! Integration tests scanning synthetic package libraries on disk.

use simidge::simpe::compare_with_package;
use simidge::{
    DbpfError, FetchDepth, FieldChange, PackageWriter, ReportQuery, ResourceKey, ResourceRegistry,
    ScanOptions, SearchFilter, Survey, Tag,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn global_group() -> Tag {
    Tag::from_u32(0x7F00_0001)
}

fn key(rtype: Tag, group: Tag, instance: u32) -> ResourceKey {
    ResourceKey::new(rtype, group, Tag::ZERO, Tag::from_u32(instance))
}

/// Payload with a NUL-terminated name in the first 64 bytes and `body` after.
fn named(name: &str, body: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 64];
    data[..name.len()].copy_from_slice(name.as_bytes());
    data.extend_from_slice(body);
    data
}

fn write_package(dir: &Path, filename: &str, resources: &[(ResourceKey, Vec<u8>)]) -> PathBuf {
    let mut writer = PackageWriter::new();
    for (key, data) in resources {
        writer.add(*key, data.clone());
    }
    let path = dir.join(filename);
    writer.write_to(&path).unwrap();
    path
}

fn string_table(name: &str, declared: u16, entries: &[&str]) -> Vec<u8> {
    let mut data = vec![0u8; 66];
    data[..name.len()].copy_from_slice(name.as_bytes());
    data.extend_from_slice(&declared.to_le_bytes());
    let joined: Vec<&[u8]> = entries.iter().map(|e| e.as_bytes()).collect();
    data.extend_from_slice(&joined.join(&[0x00, 0x01][..]));
    data.extend_from_slice(&[0x00, 0x00]);
    data
}

#[test]
fn test_two_file_conflict_report() {
    let dir = TempDir::new().unwrap();
    let test_type = Tag::from_mnemonic("TEST").unwrap();
    let shared = key(test_type, Tag::ZERO, 1);
    write_package(dir.path(), "file1.package", &[(shared, b"A".to_vec())]);
    write_package(dir.path(), "file2.package", &[(shared, b"B".to_vec())]);

    let mut registry = ResourceRegistry::new(SearchFilter::new([test_type]));
    let summary = registry.scan_directory(dir.path(), &ScanOptions::new()).unwrap();
    assert_eq!(summary.files_scanned, 2);

    let report = registry.report(&ReportQuery { min_files: 2, ..ReportQuery::default() });
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].files, vec!["file1.package", "file2.package"]);

    let tracked = registry.get(&shared).unwrap();
    assert_eq!(tracked.versions, vec![b"A".to_vec(), b"B".to_vec()]);
    let changed = registry.report(&ReportQuery { min_versions: 2, ..ReportQuery::default() });
    assert_eq!(changed.len(), 1);
}

#[test]
fn test_directory_scan_skips_bad_files() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("Nested");
    std::fs::create_dir(&nested).unwrap();

    let bhav = key(Tag::BHAV, global_group(), 0x1001);
    write_package(&nested, "inner.PACKAGE", &[(bhav, named("Main", b"inner"))]);
    write_package(dir.path(), "outer.package", &[(bhav, named("Main", b"outer"))]);
    PackageWriter::new().write_to(dir.path().join("empty.package")).unwrap();
    std::fs::write(dir.path().join("short.package"), b"DBPF").unwrap();
    std::fs::write(dir.path().join("zero.package"), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a package").unwrap();

    let mut registry = ResourceRegistry::new(SearchFilter::new([Tag::BHAV]));
    let summary = registry.scan_directory(dir.path(), &ScanOptions::new()).unwrap();

    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.files_skipped, 3);
    assert!(!summary.cancelled);

    let tracked = registry.get(&bhav).unwrap();
    assert_eq!(tracked.files, vec!["inner.PACKAGE", "outer.package"]);
    assert_eq!(tracked.resource.name.as_deref(), Some("Main"));
}

#[test]
fn test_directory_scan_visits_subdirectories_first() {
    let dir = TempDir::new().unwrap();
    let mods = dir.path().join("zmods");
    std::fs::create_dir(&mods).unwrap();

    let bhav = key(Tag::BHAV, global_group(), 0x1001);
    write_package(dir.path(), "a_parent.package", &[(bhav, named("Main", b"\x01\x00"))]);
    write_package(&mods, "child.package", &[(bhav, named("Main", b"\x02\x00"))]);

    let mut registry = ResourceRegistry::new(SearchFilter::new([Tag::BHAV]));
    registry.scan_directory(dir.path(), &ScanOptions::new()).unwrap();

    let tracked = registry.get(&bhav).unwrap();
    assert_eq!(tracked.files, vec!["child.package", "a_parent.package"]);
    assert_eq!(
        tracked.diff().changes,
        vec![FieldChange { field: 0, old: 1, new: 2 }]
    );
}

#[test]
fn test_missing_directory_is_error() {
    let dir = TempDir::new().unwrap();
    let mut registry = ResourceRegistry::new(SearchFilter::new([Tag::BHAV]));
    let result = registry.scan_directory(dir.path().join("missing"), &ScanOptions::new());
    assert!(matches!(result, Err(DbpfError::UnreadableFile { .. })));

    let result = registry.scan_file(dir.path().join("missing.package"), &ScanOptions::new());
    assert!(matches!(result, Err(DbpfError::UnreadableFile { .. })));
}

#[test]
fn test_cancelled_scan_stops_before_files() {
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), "a.package", &[(key(Tag::BHAV, global_group(), 1), named("A", b""))]);

    let cancel = Arc::new(AtomicBool::new(true));
    let mut registry = ResourceRegistry::new(SearchFilter::new([Tag::BHAV]));
    let summary = registry
        .scan_directory(dir.path(), &ScanOptions::new().with_cancel(cancel))
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files_scanned, 0);
    assert!(registry.is_empty());
}

#[test]
fn test_conflicts_survey() {
    let dir = TempDir::new().unwrap();
    let global = key(Tag::BHAV, global_group(), 0x2000);
    let local = key(Tag::BHAV, Tag::from_u32(0x1C05_0000), 0x2000);
    let body: Vec<u8> = (0..400u32).map(|i| (i % 11) as u8).collect();

    let mut writer = PackageWriter::new();
    writer.add_compressed(global, named("Shared Init", &body));
    writer.add(local, named("Local", b""));
    writer.write_to(dir.path().join("mod_a.package")).unwrap();
    write_package(dir.path(), "mod_b.package", &[(global, named("Shared Init", b"other")), (local, named("Local", b""))]);

    let (report, summary) = Survey::conflicts().run_directory(dir.path()).unwrap();
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].name.as_deref(), Some("Shared Init"));
    assert_eq!(report.entries[0].group, "0x7f000001");
    assert!(report.to_string().ends_with("1 results found."));
}

#[test]
fn test_folder_conflicts_ignore_property_sets() {
    let dir = TempDir::new().unwrap();
    let gzps = key(Tag::GZPS, global_group(), 0x10);
    let bhav = key(Tag::BHAV, global_group(), 0x20);
    for name in ["recolour_a.package", "recolour_b.package"] {
        write_package(dir.path(), name, &[(gzps, named("Skin", b"")), (bhav, named("Init", b""))]);
    }

    let (library, _) = Survey::conflicts().run_directory(dir.path()).unwrap();
    assert_eq!(library.len(), 2);

    let (folder, _) = Survey::conflicts_in_folder().run_directory(dir.path()).unwrap();
    assert_eq!(folder.len(), 1);
    assert_eq!(folder.entries[0].rtype, "BHAV");
}

#[test]
fn test_conflicts_with_file_only_tracks_seeded_keys() {
    let library = TempDir::new().unwrap();
    let chosen_dir = TempDir::new().unwrap();

    let seeded = key(Tag::BCON, global_group(), 1);
    let unrelated = key(Tag::BCON, global_group(), 2);
    let chosen = write_package(chosen_dir.path(), "chosen.package", &[(seeded, named("Tuning", b"\x01\x00"))]);
    write_package(library.path(), "x.package", &[(seeded, named("Tuning", b"\x02\x00")), (unrelated, named("Other", b""))]);
    write_package(library.path(), "y.package", &[(unrelated, named("Other", b""))]);

    let (report, _) = Survey::conflicts_with_file().run_seeded(&chosen, library.path()).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].files, vec!["chosen.package", "x.package"]);
}

#[test]
fn test_translations_survey() {
    let dir = TempDir::new().unwrap();
    write_package(
        dir.path(),
        "strings.package",
        &[
            (key(Tag::STR, global_group(), 1), string_table("Catalog", 3, &["Sofa", "A sofa"])),
            (key(Tag::STR, global_group(), 2), string_table("Clean", 2, &["Chair", "A chair"])),
            (key(Tag::STR, global_group(), 3), string_table("Lua Scripts", 0, &[])),
        ],
    );

    let (report, _) = Survey::translations().run_directory(dir.path()).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].name.as_deref(), Some("Catalog"));
}

#[test]
fn test_duplicate_meshes_survey() {
    let dir = TempDir::new().unwrap();
    let mesh = key(Tag::GMDC, simidge::survey::MESH_GROUP, 7);
    write_package(dir.path(), "hair1.package", &[(mesh, vec![1; 200])]);
    write_package(dir.path(), "hair2.package", &[(mesh, vec![2; 200])]);

    let (report, _) = Survey::duplicate_meshes().run_directory(dir.path()).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].rtype, "GMDC");
    assert_eq!(report.entries[0].files.len(), 2);
}

#[test]
fn test_compare_files() {
    let dir = TempDir::new().unwrap();
    let changed = key(Tag::BHAV, global_group(), 1);
    let same = key(Tag::BHAV, global_group(), 2);
    let added = key(Tag::BHAV, global_group(), 3);
    let old = write_package(dir.path(), "v1.package", &[(changed, named("Run", b"\x01\x00")), (same, named("Idle", b""))]);
    let new = write_package(
        dir.path(),
        "v2.package",
        &[(changed, named("Run", b"\x02\x00")), (same, named("Idle", b"")), (added, named("New", b""))],
    );
    let files = [new, old];

    let (report, _) = Survey::compare_changed().run_files(&files);
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].name.as_deref(), Some("Run"));

    let (report, _) = Survey::compare_unchanged().run_files(&files);
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].name.as_deref(), Some("Idle"));

    let (report, _) = Survey::compare_added_removed().run_files(&files);
    assert_eq!(report.len(), 1);
    assert_eq!(report.entries[0].name.as_deref(), Some("New"));
}

#[test]
fn test_single_file_search_hides_file_list() {
    let dir = TempDir::new().unwrap();
    let path = write_package(dir.path(), "objects.package", &[(key(Tag::BHAV, global_group(), 1), named("Main", b""))]);

    let (report, _) = Survey::custom(SearchFilter::new([Tag::BHAV])).run_files(&[path]);
    assert_eq!(report.len(), 1);
    assert!(!report.to_string().contains("Packages Using This Procedure"));
}

#[test]
fn test_fetch_depths_agree_on_keys() {
    let dir = TempDir::new().unwrap();
    let body: Vec<u8> = (0..2000u32).map(|i| (i % 17) as u8).collect();
    let mut writer = PackageWriter::new().with_class_ids();
    writer.add_compressed(ResourceKey::new(Tag::BHAV, global_group(), Tag::from_u32(9), Tag::from_u32(1)), named("Deep", &body));
    writer.write_to(dir.path().join("deep.package")).unwrap();

    for depth in [FetchDepth::KeyOnly, FetchDepth::Prefix, FetchDepth::Limit(500), FetchDepth::Full] {
        let mut registry = ResourceRegistry::new(SearchFilter::new([Tag::BHAV]));
        registry
            .scan_file(dir.path().join("deep.package"), &ScanOptions::new().with_depth(depth))
            .unwrap();
        let tracked = registry.iter().next().unwrap();
        assert_eq!(tracked.key().class_id, Tag::from_u32(9));
        match depth {
            FetchDepth::KeyOnly => assert_eq!(tracked.resource.name, None),
            _ => assert_eq!(tracked.resource.name.as_deref(), Some("Deep")),
        }
        if depth == FetchDepth::Full {
            assert_eq!(tracked.versions[0].len(), 64 + body.len());
        }
    }
}

#[test]
fn test_compare_extracted_resource() {
    let dir = TempDir::new().unwrap();
    let bcon = key(Tag::BCON, global_group(), 0x1001);

    let mut old = vec![0u8; 66];
    old[..6].copy_from_slice(b"Tuning");
    let mut new = old.clone();
    for value in [1u16, 2, 3] {
        old.extend_from_slice(&value.to_le_bytes());
    }
    for value in [1u16, 5, 0xFFFF] {
        new.extend_from_slice(&value.to_le_bytes());
    }

    let objects = write_package(dir.path(), "objects.package", &[(bcon, old)]);
    std::fs::write(dir.path().join("BCON - Tuning.simpe"), &new).unwrap();
    let descriptor = dir.path().join("BCON - Tuning.simpe.xml");
    std::fs::write(
        &descriptor,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package type="2">
  <packedfile path="" name="BCON - Tuning.simpe">
    <type><number>1111707470</number></type>
    <classid>0</classid>
    <group>2130706433</group>
    <instance>4097</instance>
  </packedfile>
</package>"#,
    )
    .unwrap();

    let diff = compare_with_package(&descriptor, &objects).unwrap();
    assert!(diff.compared);
    assert_eq!(
        diff.changes,
        vec![
            FieldChange { field: 1, old: 2, new: 5 },
            FieldChange { field: 2, old: 3, new: 0 },
        ]
    );
    assert_eq!(
        diff.to_string(),
        "Changed Lines:\nLine:\t1\tValue:\t2\t->\t5\nLine:\t2\tValue:\t3\t->\t0\n"
    );
}

#[test]
fn test_compare_extracted_resource_missing_from_package() {
    let dir = TempDir::new().unwrap();
    let objects = write_package(dir.path(), "objects.package", &[(key(Tag::BHAV, global_group(), 1), named("x", b""))]);
    std::fs::write(dir.path().join("payload.simpe"), named("Tuning", b"\x01\x00")).unwrap();
    let descriptor = dir.path().join("payload.simpe.xml");
    std::fs::write(
        &descriptor,
        r#"<package><packedfile name="payload.simpe"><type><number>1111707470</number></type><classid>0</classid><group>2130706433</group><instance>4097</instance></packedfile></package>"#,
    )
    .unwrap();

    let diff = compare_with_package(&descriptor, &objects).unwrap();
    assert!(!diff.compared);
    assert_eq!(diff.to_string(), "No differences found.");
}
