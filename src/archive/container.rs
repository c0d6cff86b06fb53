//! Tar container writing and reading
//!
//! - Plain tar for the current layout, gzip-wrapped tar for the legacy one
//! - Members are written in the order given; directory members are expanded
//!   with entries sorted by name, so identical inputs give identical archives
//! - Readers sniff the gzip magic instead of trusting file extensions
//! - archive file is staged as `<dest>.partial`, fsynced, then renamed into place

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use super::errors::{ArchiveError, ArchiveResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Container encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed tar (backup version 2)
    Tar,
    /// Gzip-compressed tar (backup version 1)
    TarGz,
}

impl ArchiveFormat {
    /// File name extension, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    /// MIME type recorded when the container is uploaded
    pub fn content_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "application/x-tar",
            ArchiveFormat::TarGz => "application/x-gzip",
        }
    }

    /// Format for an uploaded content type, if it is one we can read
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/x-tar" => Some(ArchiveFormat::Tar),
            "application/x-gzip" | "application/gzip" => Some(ArchiveFormat::TarGz),
            _ => None,
        }
    }
}

/// Staging path for a container under construction
pub fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Write `members` (archive name, filesystem path) into a new container
///
/// Nothing appears at `output_path` unless the whole container was written.
pub fn write_container(
    output_path: &Path,
    format: ArchiveFormat,
    compression_level: u32,
    members: &[(&str, PathBuf)],
) -> ArchiveResult<()> {
    let staging = partial_path(output_path);
    let result = write_staged(&staging, format, compression_level, members).and_then(|_| {
        fs::rename(&staging, output_path).map_err(|e| {
            ArchiveError::io_error(
                format!("Failed to move archive into place: {}", output_path.display()),
                e,
            )
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn write_staged(
    output_path: &Path,
    format: ArchiveFormat,
    compression_level: u32,
    members: &[(&str, PathBuf)],
) -> ArchiveResult<()> {
    let file = File::create(output_path).map_err(|e| {
        ArchiveError::io_error(
            format!("Failed to create archive file: {}", output_path.display()),
            e,
        )
    })?;
    let writer = BufWriter::new(file);

    let writer = match format {
        ArchiveFormat::Tar => {
            let mut builder = Builder::new(writer);
            append_members(&mut builder, members)?;
            builder.into_inner().map_err(|e| {
                ArchiveError::io_error("Failed to finish archive", e)
            })?
        }
        ArchiveFormat::TarGz => {
            let encoder = GzEncoder::new(writer, Compression::new(compression_level));
            let mut builder = Builder::new(encoder);
            append_members(&mut builder, members)?;
            let encoder = builder.into_inner().map_err(|e| {
                ArchiveError::io_error("Failed to finish archive", e)
            })?;
            encoder.finish().map_err(|e| {
                ArchiveError::io_error("Failed to finish gzip stream", e)
            })?
        }
    };

    let file = writer
        .into_inner()
        .map_err(|e| ArchiveError::io_error("Failed to flush archive buffer", e.into_error()))?;

    file.sync_all().map_err(|e| {
        ArchiveError::io_error(
            format!("Failed to fsync archive: {}", output_path.display()),
            e,
        )
    })
}

fn append_members<W: Write>(
    builder: &mut Builder<W>,
    members: &[(&str, PathBuf)],
) -> ArchiveResult<()> {
    for (name, path) in members {
        if path.is_dir() {
            builder
                .append_dir(name, path)
                .map_err(|e| ArchiveError::io_error(format!("Failed to add directory: {}", name), e))?;

            for (archive_path, fs_path) in collect_entries(path, name)? {
                append_one(builder, &archive_path, &fs_path)?;
            }
        } else {
            append_one(builder, name, path)?;
        }
    }
    Ok(())
}

fn append_one<W: Write>(builder: &mut Builder<W>, name: &str, path: &Path) -> ArchiveResult<()> {
    if path.is_dir() {
        builder
            .append_dir(name, path)
            .map_err(|e| ArchiveError::io_error(format!("Failed to add directory: {}", name), e))
    } else {
        let mut file = File::open(path).map_err(|e| ArchiveError::io_error_at_path(path, e))?;
        builder
            .append_file(name, &mut file)
            .map_err(|e| ArchiveError::io_error(format!("Failed to add file: {}", name), e))
    }
}

/// Collect all entries below `dir`, depth first, sorted by name per level
fn collect_entries(dir: &Path, prefix: &str) -> ArchiveResult<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    collect_entries_recursive(dir, prefix, &mut entries)?;
    Ok(entries)
}

fn collect_entries_recursive(
    current_dir: &Path,
    prefix: &str,
    entries: &mut Vec<(String, PathBuf)>,
) -> ArchiveResult<()> {
    let mut dir_entries: Vec<_> = fs::read_dir(current_dir)
        .map_err(|e| ArchiveError::io_error_at_path(current_dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ArchiveError::io_error_at_path(current_dir, e))?;

    dir_entries.sort_by_key(|entry| entry.file_name());

    for entry in dir_entries {
        let fs_path = entry.path();
        let archive_path = format!("{}/{}", prefix, entry.file_name().to_string_lossy());

        entries.push((archive_path.clone(), fs_path.clone()));

        if fs_path.is_dir() {
            collect_entries_recursive(&fs_path, &archive_path, entries)?;
        }
    }

    Ok(())
}

/// Unpack every member of a container read from `reader` into `dest`.
///
/// `on_member` is called with each member name after it has been written.
/// Members whose path would escape `dest` are skipped.
pub fn read_container<R: Read>(
    reader: R,
    dest: &Path,
    mut on_member: impl FnMut(&str),
) -> ArchiveResult<ArchiveFormat> {
    let mut reader = BufReader::new(reader);
    let head = reader
        .fill_buf()
        .map_err(|e| ArchiveError::io_error("Failed to read archive header", e))?;
    let format = if head.starts_with(&GZIP_MAGIC) {
        ArchiveFormat::TarGz
    } else {
        ArchiveFormat::Tar
    };

    match format {
        ArchiveFormat::Tar => unpack(Archive::new(reader), dest, &mut on_member)?,
        ArchiveFormat::TarGz => unpack(Archive::new(GzDecoder::new(reader)), dest, &mut on_member)?,
    }

    Ok(format)
}

fn unpack<R: Read>(
    mut archive: Archive<R>,
    dest: &Path,
    on_member: &mut impl FnMut(&str),
) -> ArchiveResult<()> {
    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::invalid_format("Failed to read archive entries", e))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ArchiveError::invalid_format("Corrupt archive entry", e))?;

        let name = entry
            .path()
            .map_err(|e| ArchiveError::invalid_format("Invalid archive member path", e))?
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();

        let unpacked = entry.unpack_in(dest).map_err(|e| {
            ArchiveError::io_error(format!("Failed to extract {} to {}", name, dest.display()), e)
        })?;

        if unpacked {
            on_member(&name);
        }
    }

    Ok(())
}
