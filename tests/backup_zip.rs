#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn fake_db_bytes(tag: &str) -> Vec<u8> {
    let mut bytes = b"SQLite format 3\0".to_vec();
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("commentlog-backup-src");
    let workspace2 = temp_dir("commentlog-backup-dst");
    let out_dir = temp_dir("commentlog-backup-out");

    let bytes = fake_db_bytes("roundtrip");
    std::fs::write(workspace.join("commentlog.sqlite3"), &bytes).expect("write source db");

    let bundle_path = out_dir.join("nested").join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/commentlog.sqlite3")
        .expect("database entry in bundle");

    std::fs::write(workspace2.join("commentlog.sqlite3"), fake_db_bytes("old")).expect("seed dst");
    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("commentlog.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2.join("commentlog.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_sqlite_file_is_accepted_and_other_files_are_not() {
    let src_dir = temp_dir("commentlog-backup-raw");
    let workspace = temp_dir("commentlog-backup-raw-dst");

    let raw = src_dir.join("copy.sqlite3");
    let bytes = fake_db_bytes("raw");
    std::fs::write(&raw, &bytes).expect("write raw db");
    let import = backup::import_workspace_bundle(&raw, &workspace).expect("import raw");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);
    assert_eq!(
        std::fs::read(workspace.join("commentlog.sqlite3")).expect("read db"),
        bytes
    );

    let junk = src_dir.join("notes.txt");
    std::fs::write(&junk, b"definitely not a database").expect("write junk");
    assert!(backup::import_workspace_bundle(&junk, &workspace).is_err());
    assert_eq!(
        std::fs::read(workspace.join("commentlog.sqlite3")).expect("read db"),
        bytes
    );

    let _ = std::fs::remove_dir_all(src_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tampered_bundle_is_rejected_before_replacing_the_database() {
    let out_dir = temp_dir("commentlog-backup-tamper");
    let workspace = temp_dir("commentlog-backup-tamper-dst");
    let original = fake_db_bytes("keep me");
    std::fs::write(workspace.join("commentlog.sqlite3"), &original).expect("seed db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest");
        let manifest = serde_json::json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "version": 1,
            "dbSha256": "0".repeat(64),
        });
        zip.write_all(manifest.to_string().as_bytes())
            .expect("write manifest");
        zip.start_file("db/commentlog.sqlite3", opts).expect("db entry");
        zip.write_all(&fake_db_bytes("swapped")).expect("write db");
        zip.finish().expect("finish zip");
    }

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("checksum mismatch must fail");
    assert!(err.to_string().contains("checksum"));
    assert_eq!(
        std::fs::read(workspace.join("commentlog.sqlite3")).expect("read db"),
        original
    );

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
