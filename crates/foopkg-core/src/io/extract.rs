//! Source archive extraction.
//!
//! gzip, zstd and uncompressed tarballs are unpacked in-process. Anything
//! else (xz, bzip2, lzip...) is handed to the system `tar`, which knows how
//! to pick a decompressor.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;
use zstd::stream::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid path in archive: {0}")]
    UnsafePath(PathBuf),

    #[error("`{tar}` failed to unpack the archive: {stderr}")]
    SystemTar { tar: PathBuf, stderr: String },
}

/// Compression detected from the first bytes of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarZst,
    Tar,
    /// Not handled in-process; passed to the system `tar`.
    Other,
}

/// Sniff the archive format from its magic bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn detect_format(path: &Path) -> io::Result<ArchiveFormat> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;

    Ok(if head.starts_with(&[0x1f, 0x8b]) {
        ArchiveFormat::TarGz
    } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        ArchiveFormat::TarZst
    } else if head.get(257..262) == Some(b"ustar".as_slice()) {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Other
    })
}

/// Unpacks a source archive into an existing directory.
pub trait Unpacker: Send + Sync {
    /// Unpack `archive` into `dest`, dropping the first `strip` components
    /// of every member path.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is unreadable, corrupt, or contains a
    /// member that would land outside `dest`.
    fn unpack(&self, archive: &Path, dest: &Path, strip: usize) -> Result<(), ExtractError>;
}

/// Tar unpacker backed by the `tar` crate, with a system `tar` fallback.
#[derive(Debug, Clone)]
pub struct TarUnpacker {
    system_tar: PathBuf,
}

impl Default for TarUnpacker {
    fn default() -> Self {
        Self {
            system_tar: which::which("tar").unwrap_or_else(|_| PathBuf::from("tar")),
        }
    }
}

impl TarUnpacker {
    pub fn with_system_tar(system_tar: impl Into<PathBuf>) -> Self {
        Self {
            system_tar: system_tar.into(),
        }
    }

    fn unpack_with_system_tar(
        &self,
        archive: &Path,
        dest: &Path,
        strip: usize,
    ) -> Result<(), ExtractError> {
        debug!(
            "Unpacking {} with {}",
            archive.display(),
            self.system_tar.display()
        );
        let output = Command::new(&self.system_tar)
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .arg(format!("--strip-components={strip}"))
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ExtractError::SystemTar {
                tar: self.system_tar.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Unpacker for TarUnpacker {
    fn unpack(&self, archive: &Path, dest: &Path, strip: usize) -> Result<(), ExtractError> {
        let format = detect_format(archive)?;
        debug!("Unpacking {} ({format:?})", archive.display());

        let reader = BufReader::new(File::open(archive)?);
        match format {
            ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader), dest, strip),
            ArchiveFormat::TarZst => extract_tar(ZstdDecoder::new(reader)?, dest, strip),
            ArchiveFormat::Tar => extract_tar(reader, dest, strip),
            ArchiveFormat::Other => self.unpack_with_system_tar(archive, dest, strip),
        }
    }
}

/// Drop the first `strip` components of `path`.
///
/// Returns `Ok(None)` when nothing is left, as for the top-level directory
/// entry itself.
fn stripped(path: &Path, strip: usize) -> Result<Option<PathBuf>, ExtractError> {
    let mut rest = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(ExtractError::UnsafePath(path.to_path_buf())),
        }
    }
    for component in path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .skip(strip)
    {
        rest.push(component);
    }
    Ok((!rest.as_os_str().is_empty()).then_some(rest))
}

/// Fail if any directory between `dest` and `relative` is a symlink, so a
/// member can never be written through a link planted by an earlier one.
fn check_no_symlinked_parent(dest: &Path, relative: &Path) -> Result<(), ExtractError> {
    let mut current = dest.to_path_buf();
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractError::UnsafePath(relative.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path, strip: usize) -> Result<(), ExtractError> {
    fs::create_dir_all(dest)?;

    let mut archive = tar::Archive::new(reader);
    let mut hardlinks = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let Some(relative) = stripped(&entry_path, strip)? else {
            continue;
        };
        check_no_symlinked_parent(dest, &relative)?;
        let target = dest.join(&relative);

        // Hard links name another member; resolve them once every regular
        // file has landed.
        if entry.header().entry_type().is_hard_link() {
            if let Some(link) = entry.link_name()? {
                if let Some(source) = stripped(&link, strip)? {
                    check_no_symlinked_parent(dest, &source)?;
                    hardlinks.push((dest.join(source), target));
                }
            }
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    for (source, target) in hardlinks {
        if target.exists() {
            fs::remove_file(&target)?;
        }
        fs::hard_link(&source, &target)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn append_file(builder: &mut tar::Builder<impl Write>, path: &str, mode: u32, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, data).unwrap();
    }

    fn source_tarball(writer: impl Write) {
        let mut builder = tar::Builder::new(writer);
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, "hello-2.12/", io::empty()).unwrap();
        append_file(&mut builder, "hello-2.12/configure", 0o755, b"#!/bin/sh\n");
        append_file(&mut builder, "hello-2.12/src/hello.c", 0o644, b"int main(){}\n");
        builder.into_inner().unwrap().flush().unwrap();
    }

    fn assert_source_tree(dest: &Path) {
        assert!(dest.join("src/hello.c").is_file());
        let mode = fs::metadata(dest.join("configure")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0, "configure lost its exec bit");
        assert!(!dest.join("hello-2.12").exists());
    }

    #[test]
    fn test_unpack_tar_gz_strips_top_directory() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("hello-2.12.dl");
        let encoder = flate2::write::GzEncoder::new(
            File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        source_tarball(encoder);
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::TarGz);

        let dest = tmp.path().join("hello-2.12");
        fs::create_dir(&dest).unwrap();
        TarUnpacker::default().unpack(&archive, &dest, 1).unwrap();
        assert_source_tree(&dest);
    }

    #[test]
    fn test_unpack_tar_zst() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("hello-2.12.dl");
        let encoder = zstd::stream::Encoder::new(File::create(&archive).unwrap(), 3)
            .unwrap()
            .auto_finish();
        source_tarball(encoder);
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::TarZst);

        let dest = tmp.path().join("out");
        TarUnpacker::default().unpack(&archive, &dest, 1).unwrap();
        assert_source_tree(&dest);
    }

    #[test]
    fn test_unpack_plain_tar() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("hello-2.12.dl");
        source_tarball(File::create(&archive).unwrap());
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::Tar);

        let dest = tmp.path().join("out");
        TarUnpacker::default().unpack(&archive, &dest, 1).unwrap();
        assert_source_tree(&dest);
    }

    #[test]
    fn test_hardlink_is_resolved_inside_dest() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("links.dl");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            append_file(&mut builder, "pkg-1.0/a.txt", 0o644, b"shared\n");
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Link);
            link.set_size(0);
            link.set_mode(0o644);
            builder
                .append_link(&mut link, "pkg-1.0/b.txt", "pkg-1.0/a.txt")
                .unwrap();
            builder.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        TarUnpacker::default().unpack(&archive, &dest, 1).unwrap();
        assert_eq!(fs::read(dest.join("b.txt")).unwrap(), b"shared\n");
    }

    #[test]
    fn test_parent_dir_member_is_rejected() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("evil.dl");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            let data = b"gotcha";
            let mut header = tar::Header::new_gnu();
            let name = b"pkg-1.0/../../evil";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        let dest = tmp.path().join("deep/out");
        let result = TarUnpacker::default().unpack(&archive, &dest, 1);
        assert!(matches!(result, Err(ExtractError::UnsafePath(_))));
        assert!(!tmp.path().join("evil").exists());
        assert!(!tmp.path().join("deep/evil").exists());
    }

    #[test]
    fn test_member_behind_symlinked_directory_is_rejected() {
        let tmp = tempdir().unwrap();
        let outside = tmp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let archive = tmp.path().join("symlink.dl");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder
                .append_link(&mut link, "pkg-1.0/esc", &outside)
                .unwrap();
            append_file(&mut builder, "pkg-1.0/esc/written", 0o644, b"gotcha");
            builder.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        let result = TarUnpacker::default().unpack(&archive, &dest, 1);
        assert!(matches!(result, Err(ExtractError::UnsafePath(_))));
        assert!(!outside.join("written").exists());
    }

    #[test]
    fn test_relative_symlinks_inside_tree_are_kept() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("links.dl");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            append_file(&mut builder, "pkg-1.0/lib/real.h", 0o644, b"#pragma once\n");
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder
                .append_link(&mut link, "pkg-1.0/include/alias.h", "../lib/real.h")
                .unwrap();
            builder.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        TarUnpacker::default().unpack(&archive, &dest, 1).unwrap();
        assert_eq!(fs::read(dest.join("include/alias.h")).unwrap(), b"#pragma once\n");
    }

    #[test]
    fn test_unknown_format_goes_to_system_tar() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("weird.dl");
        fs::write(&archive, b"definitely not an archive").unwrap();
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::Other);

        let result = TarUnpacker::with_system_tar("/bin/false").unpack(&archive, tmp.path(), 1);
        assert!(matches!(result, Err(ExtractError::SystemTar { .. })));
    }

    #[test]
    fn test_stripped() {
        assert_eq!(stripped(Path::new("gmp-6.3.0/"), 1).unwrap(), None);
        assert_eq!(
            stripped(Path::new("./gmp-6.3.0/mpz/add.c"), 1).unwrap(),
            Some(PathBuf::from("mpz/add.c"))
        );
        assert!(stripped(Path::new("/etc/passwd"), 0).is_err());
    }
}
