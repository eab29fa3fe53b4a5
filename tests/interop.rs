//! Archives written here must open with independent readers, and archives
//! from independent writers must extract here.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use pretty_assertions::assert_eq;
use treearc::{
    ArchiveOptions, ExtractOptions, ZipOptions, create_archive, create_zip_archive,
    extract_archive, extract_zip_archive,
};

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

fn source_tree() -> tempfile::TempDir {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub/b.txt"), "world!".repeat(500)).unwrap();
    #[cfg(unix)]
    {
        set_mode(&src.path().join("a.txt"), 0o644);
        set_mode(&src.path().join("sub/b.txt"), 0o600);
    }
    src
}

#[tokio::test]
async fn zip_crate_reads_our_archives() {
    let src = source_tree();
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("out.zip");
    create_zip_archive(src.path(), &path, &ZipOptions::default())
        .await
        .unwrap();

    let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(archive.len(), 2);

    let mut a = archive.by_name("a.txt").unwrap();
    let mut content = String::new();
    a.read_to_string(&mut content).unwrap();
    assert_eq!(content, "hello");
    assert_eq!(a.compression(), zip::CompressionMethod::Stored);
    #[cfg(unix)]
    assert_eq!(a.unix_mode().unwrap() & 0o7777, 0o644);
    drop(a);

    let mut b = archive.by_name("sub/b.txt").unwrap();
    let mut content = String::new();
    b.read_to_string(&mut content).unwrap();
    assert_eq!(content, "world!".repeat(500));
    assert_eq!(b.compression(), zip::CompressionMethod::Deflated);
    #[cfg(unix)]
    assert_eq!(b.unix_mode().unwrap() & 0o7777, 0o600);
}

#[tokio::test]
async fn we_read_zip_crate_archives() {
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("foreign.zip");
    {
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .add_directory("docs/", zip::write::FileOptions::default())
            .unwrap();
        let deflated = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o640);
        writer.start_file("docs/readme.md", deflated).unwrap();
        writer.write_all("# readme\n".repeat(200).as_bytes()).unwrap();
        let stored = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o600);
        writer.start_file("raw.bin", stored).unwrap();
        writer.write_all(&[1, 2, 3, 4]).unwrap();
        writer.finish().unwrap();
    }

    let dest = work.path().join("out");
    let summary = extract_zip_archive(&path, &dest).await.unwrap();
    assert_eq!(summary.files, 2);
    assert!(dest.join("docs").is_dir());
    assert_eq!(
        fs::read_to_string(dest.join("docs/readme.md")).unwrap(),
        "# readme\n".repeat(200)
    );
    assert_eq!(fs::read(dest.join("raw.bin")).unwrap(), vec![1, 2, 3, 4]);
    #[cfg(unix)]
    {
        assert_eq!(mode_of(&dest.join("docs/readme.md")), 0o640);
        assert_eq!(mode_of(&dest.join("raw.bin")), 0o600);
    }
}

#[tokio::test]
async fn tar_crate_reads_our_archives() {
    let src = source_tree();
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("out.tar");
    create_archive(src.path(), &path, &ArchiveOptions::default())
        .await
        .unwrap();

    let mut archive = tar::Archive::new(File::open(&path).unwrap());
    let mut seen = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mode = entry.header().mode().unwrap();
        assert_eq!(entry.header().entry_type(), tar::EntryType::Regular);
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        seen.push((name, mode, content));
    }

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "a.txt");
    assert_eq!(seen[0].2, "hello");
    assert_eq!(seen[1].0, "sub/b.txt");
    assert_eq!(seen[1].2, "world!".repeat(500));
    #[cfg(unix)]
    {
        assert_eq!(seen[0].1, 0o644);
        assert_eq!(seen[1].1, 0o600);
    }
}

#[tokio::test]
async fn tar_crate_unpacks_our_gzip_archives() {
    let src = source_tree();
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("out.tar.gz");
    let options = ArchiveOptions {
        compress: true,
        ..Default::default()
    };
    create_archive(src.path(), &path, &options).await.unwrap();

    let dest = work.path().join("unpacked");
    let gz = flate2::read::GzDecoder::new(File::open(&path).unwrap());
    tar::Archive::new(gz).unpack(&dest).unwrap();
    assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
    assert_eq!(
        fs::read_to_string(dest.join("sub/b.txt")).unwrap(),
        "world!".repeat(500)
    );
}

fn foreign_tar() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut dir = tar::Header::new_ustar();
    dir.set_path("lib/").unwrap();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_cksum();
    builder.append(&dir, io::empty()).unwrap();

    let body = b"fn main() {}\n";
    let mut file = tar::Header::new_ustar();
    file.set_path("lib/main.rs").unwrap();
    file.set_entry_type(tar::EntryType::Regular);
    file.set_size(body.len() as u64);
    file.set_mode(0o640);
    file.set_mtime(1_700_000_000);
    file.set_cksum();
    builder.append(&file, &body[..]).unwrap();

    builder.into_inner().unwrap()
}

#[tokio::test]
async fn we_read_tar_crate_archives() {
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("foreign.tar");
    fs::write(&path, foreign_tar()).unwrap();

    let dest = work.path().join("out");
    let summary = extract_archive(&path, &dest, &ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        fs::read_to_string(dest.join("lib/main.rs")).unwrap(),
        "fn main() {}\n"
    );
    #[cfg(unix)]
    assert_eq!(mode_of(&dest.join("lib/main.rs")), 0o640);
}

#[tokio::test]
async fn we_read_flate2_gzipped_tar() {
    let work = tempfile::tempdir().unwrap();
    let path = work.path().join("foreign.tar.gz");
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&foreign_tar()).unwrap();
    fs::write(&path, gz.finish().unwrap()).unwrap();

    let dest = work.path().join("out");
    let summary = extract_archive(&path, &dest, &ExtractOptions { decompress: true })
        .await
        .unwrap();
    assert_eq!(summary.files, 1);
    assert!(dest.join("lib/main.rs").is_file());
}
