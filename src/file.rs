// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

/// Magic bytes stamped at the start of a primary TOC file.
pub const TOC_MAGIC: [u8; 4] = [b'F', b'D', b'B', 1];

pub const TOC_FILE_NAME: &str = "toc";
pub const SCHEMA_FILE_NAME: &str = "schema";

/// Builds the name of a sub-TOC file for a given writer-unique suffix.
pub fn sub_toc_name(suffix: &str) -> String {
    format!("toc.{suffix}")
}

/// Atomically rewrites a file: write to a sibling temp file, fsync, rename
/// over the destination, then fsync the containing directory.
///
/// Used for the schema-file copy and for any whole-file metadata rewrite
/// (never for the TOC log itself, which is pure append).
pub fn rewrite_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let folder = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
        fsync_directory(folder)?;
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory(path: &Path) -> std::io::Result<()> {
    let file = File::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Appends `content` to `path` in a single `write` call, opening the file
/// in append mode if it does not already exist.
///
/// Relies on POSIX `O_APPEND` atomicity for writes at or below `PIPE_BUF`;
/// callers are responsible for keeping individual records within that bound
/// (see `toc::record::RECORD_SIZE_DEFAULT`).
pub fn append_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::fs::OpenOptions;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content)?;
    Ok(())
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn touch(path: &Path) -> std::io::Result<()> {
    File::create(path)?;
    Ok(())
}

pub fn join(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.txt");

        std::fs::write(&path, b"asdasdasdasdasd")?;
        rewrite_atomic(&path, b"newcontent")?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }

    #[test]
    fn append_is_cumulative() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log");

        append_atomic(&path, b"a")?;
        append_atomic(&path, b"b")?;

        assert_eq!(b"ab", std::fs::read(&path)?.as_slice());

        Ok(())
    }
}
