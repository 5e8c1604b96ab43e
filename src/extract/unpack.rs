//! Tar unpacking and document discovery.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Width of the identifier suffix used to key per-archive unpack
/// directories. Archive keys end in a zero-padded `YYMM_SEQ` pair, so eight
/// characters is both collision-free and stable.
const SLUG_WIDTH: usize = 8;

/// Derive the unpack-directory slug for an archive key.
///
/// The slug is the fixed-width suffix of the key's file stem:
/// `pdf/arXiv_pdf_2301_001.tar` becomes `2301_001`. Keys with short stems
/// use the whole stem.
pub fn archive_slug(key: &str) -> String {
    let stem = Path::new(key)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string());

    let chars: Vec<char> = stem.chars().collect();
    if chars.len() <= SLUG_WIDTH {
        stem
    } else {
        chars[chars.len() - SLUG_WIDTH..].iter().collect()
    }
}

/// Local filename for a downloaded archive: the basename of its object key.
pub fn archive_filename(key: &str) -> String {
    Path::new(key)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

/// Unpack a tar archive into `dest_dir`.
///
/// Blocking; callers on the async runtime run this under `spawn_blocking`.
pub fn unpack_archive(tar_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(tar_path)
        .with_context(|| format!("Failed to open archive {}", tar_path.display()))?;

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    let mut archive = tar::Archive::new(file);
    archive
        .unpack(dest_dir)
        .with_context(|| format!("Failed to unpack {}", tar_path.display()))?;

    Ok(())
}

/// Recursively collect every PDF under `dir`, in a deterministic order.
///
/// The archives nest documents one level down (`2301/2301.00001.pdf`), but
/// the walk makes no assumption about depth.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    collect_pdfs(dir, &mut documents)?;
    documents.sort();
    Ok(documents)
}

fn collect_pdfs(dir: &Path, documents: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_pdfs(&path, documents)?;
        } else if path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
        {
            documents.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an in-memory tar with the given (path, contents) entries.
    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_archive_slug_fixed_width_suffix() {
        assert_eq!(archive_slug("pdf/arXiv_pdf_2301_001.tar"), "2301_001");
        assert_eq!(archive_slug("pdf/arXiv_pdf_0001_012.tar"), "0001_012");
    }

    #[test]
    fn test_archive_slug_short_stem() {
        assert_eq!(archive_slug("a.tar"), "a");
    }

    #[test]
    fn test_archive_slugs_distinct_for_distinct_keys() {
        let a = archive_slug("pdf/arXiv_pdf_2301_001.tar");
        let b = archive_slug("pdf/arXiv_pdf_2301_002.tar");
        assert_ne!(a, b);
    }

    #[test]
    fn test_archive_filename_strips_prefix() {
        assert_eq!(
            archive_filename("pdf/arXiv_pdf_2301_001.tar"),
            "arXiv_pdf_2301_001.tar"
        );
    }

    #[test]
    fn test_unpack_and_discover() {
        let tar_bytes = build_tar(&[
            ("2301/2301.00001.pdf", b"pdf-one" as &[u8]),
            ("2301/2301.00002.pdf", b"pdf-two" as &[u8]),
            ("2301/notes.txt", b"not a pdf" as &[u8]),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("arXiv_pdf_2301_001.tar");
        std::fs::write(&tar_path, &tar_bytes).unwrap();

        let dest = dir.path().join("unpacked");
        unpack_archive(&tar_path, &dest).unwrap();

        let documents = discover_documents(&dest).unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents[0].ends_with("2301/2301.00001.pdf"));
        assert!(documents[1].ends_with("2301/2301.00002.pdf"));
    }

    #[test]
    fn test_unpack_corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("corrupt.tar");
        std::fs::write(&tar_path, b"this is not a tar archive").unwrap();

        let dest = dir.path().join("unpacked");
        assert!(unpack_archive(&tar_path, &dest).is_err());
    }

    #[test]
    fn test_discover_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DOC.PDF"), b"x").unwrap();
        let documents = discover_documents(dir.path()).unwrap();
        assert_eq!(documents.len(), 1);
    }
}
