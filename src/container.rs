//! Maps a slide path to its on-disk directory tree and produces canonical
//! file paths for image, mask and histogram data.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SldyError;

const IMGDIR_SUFFIX: &str = ".imgdir";
const IMAGE_RECORD_NAME: &str = "ImageRecord.yaml";

/// Strips the `.sldy` / `.sldyz` suffix from `path` and appends `.dir`,
/// returning the sibling root directory that holds every image group.
///
/// Also reports whether the slide is the compressed (`.sldyz`) variant,
/// since every optional file suffix under the root flips accordingly.
pub fn slide_root(path: &Path) -> Result<(PathBuf, bool), SldyError> {
    let stem = path
        .file_stem()
        .ok_or_else(|| SldyError::PathSyntax {
            path: path.to_path_buf(),
        })?
        .to_owned();

    let compressed = match path.extension().and_then(OsStr::to_str) {
        Some("sldy") => false,
        Some("sldyz") => true,
        _ => {
            return Err(SldyError::PathSyntax {
                path: path.to_path_buf(),
            })
        }
    };

    let mut dir_name = stem;
    dir_name.push(".dir");

    let root = path
        .parent()
        .map(|parent| parent.join(&dir_name))
        .unwrap_or_else(|| PathBuf::from(&dir_name));

    Ok((root, compressed))
}

/// Lists the titles of every valid image group directly under `root`.
///
/// A subdirectory is a valid image group iff its name ends `.imgdir`, it
/// contains an `ImageRecord.yaml` document, and at least one file with
/// suffix `.npy` or `.npyz`. Backslashes in the title are normalised to
/// forward slashes.
pub fn list_image_groups(root: &Path) -> Result<Vec<String>, SldyError> {
    let mut titles = Vec::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return Err(SldyError::NotFound {
                path: root.to_path_buf(),
            })
        }
        Err(source) => return Err(SldyError::Io { source }),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = match path.file_name().and_then(OsStr::to_str) {
            Some(name) => name,
            None => continue,
        };

        if !name.ends_with(IMGDIR_SUFFIX) {
            continue;
        }

        if !path.join(IMAGE_RECORD_NAME).is_file() {
            continue;
        }

        if !has_npy_sibling(&path)? {
            continue;
        }

        let title = name.trim_end_matches(IMGDIR_SUFFIX).replace('\\', "/");
        titles.push(title);
    }

    Ok(titles)
}

fn has_npy_sibling(group_dir: &Path) -> Result<bool, SldyError> {
    for entry in fs::read_dir(group_dir)? {
        let entry = entry?;
        let path = entry.path();
        match path.extension().and_then(OsStr::to_str) {
            Some("npy") | Some("npyz") => return Ok(true),
            _ => continue,
        }
    }
    Ok(false)
}

fn group_dir(root: &Path, title: &str) -> PathBuf {
    root.join(format!("{}{}", title, IMGDIR_SUFFIX))
}

fn ext(compressed: bool) -> &'static str {
    if compressed {
        ".npyz"
    } else {
        ".npy"
    }
}

/// `<group>/ImageData_Ch<channel>_TP<timepoint:07d><ext>`
pub fn image_data_path(root: &Path, title: &str, channel: u32, timepoint: u32, compressed: bool) -> PathBuf {
    group_dir(root, title).join(format!(
        "ImageData_Ch{}_TP{:07}{}",
        channel,
        timepoint,
        ext(compressed)
    ))
}

/// `<group>/MaskData_TP<timepoint:07d><ext>`
pub fn mask_data_path(root: &Path, title: &str, timepoint: u32, compressed: bool) -> PathBuf {
    group_dir(root, title).join(format!("MaskData_TP{:07}{}", timepoint, ext(compressed)))
}

/// `<group>/HistogramData_Ch<channel>_TP<timepoint:07d><ext>`
pub fn histogram_data_path(root: &Path, title: &str, channel: u32, timepoint: u32, compressed: bool) -> PathBuf {
    group_dir(root, title).join(format!(
        "HistogramData_Ch{}_TP{:07}{}",
        channel,
        timepoint,
        ext(compressed)
    ))
}

/// `<group>/HistogramSummary_Ch<channel><ext>`
pub fn histogram_summary_path(root: &Path, title: &str, channel: u32, compressed: bool) -> PathBuf {
    group_dir(root, title).join(format!("HistogramSummary_Ch{}{}", channel, ext(compressed)))
}

/// Parses the digits following the last `_Ch` token in `path`.
pub fn channel_of(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let idx = name.rfind("_Ch")?;
    let rest = &name[idx + 3..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Parses the exactly-7-digit timepoint token following the last `_TP` in `path`.
pub fn timepoint_of(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let idx = name.rfind("_TP")?;
    let rest = &name[idx + 3..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != 7 {
        return None;
    }
    digits.parse().ok()
}

/// Rewrites the 7-digit timepoint token embedded in `path` to `0000000`.
pub fn rename_to_tp0(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let idx = name.rfind("_TP")?;
    let rest = &name[idx + 3..];
    let digit_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_len != 7 {
        return None;
    }

    let mut new_name = String::with_capacity(name.len());
    new_name.push_str(&name[..idx + 3]);
    new_name.push_str("0000000");
    new_name.push_str(&rest[digit_len..]);

    Some(path.with_file_name(new_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_root_strips_suffix_and_appends_dir() {
        let (root, compressed) = slide_root(Path::new("/data/demo.sldy")).unwrap();
        assert_eq!(root, Path::new("/data/demo.dir"));
        assert!(!compressed);

        let (root, compressed) = slide_root(Path::new("/data/demo.sldyz")).unwrap();
        assert_eq!(root, Path::new("/data/demo.dir"));
        assert!(compressed);
    }

    #[test]
    fn slide_root_rejects_unknown_suffix() {
        assert!(matches!(
            slide_root(Path::new("/data/demo.txt")),
            Err(SldyError::PathSyntax { .. })
        ));
    }

    #[test]
    fn channel_and_timepoint_parsing() {
        let path = PathBuf::from("ImageData_Ch3_TP0000042.npy");
        assert_eq!(channel_of(&path), Some(3));
        assert_eq!(timepoint_of(&path), Some(42));
    }

    #[test]
    fn timepoint_must_be_exactly_seven_digits() {
        let path = PathBuf::from("ImageData_Ch3_TP42.npy");
        assert_eq!(timepoint_of(&path), None);
    }

    #[test]
    fn rename_to_tp0_rewrites_digit_token_only() {
        let path = PathBuf::from("ImageData_Ch1_TP0000123.npy");
        let renamed = rename_to_tp0(&path).unwrap();
        assert_eq!(renamed, PathBuf::from("ImageData_Ch1_TP0000000.npy"));
    }

    #[test]
    fn list_image_groups_reports_not_found_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.dir");
        assert!(matches!(
            list_image_groups(&missing),
            Err(SldyError::NotFound { .. })
        ));
    }

    #[test]
    fn image_data_path_matches_documented_layout() {
        let root = Path::new("/data/demo.dir");
        let path = image_data_path(root, "cap", 2, 5, false);
        assert_eq!(
            path,
            PathBuf::from("/data/demo.dir/cap.imgdir/ImageData_Ch2_TP0000005.npy")
        );
    }
}
