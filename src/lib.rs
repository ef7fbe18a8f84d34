//! Reader for the SlideBook 7 scientific-microscopy container format
//! (directory-packaged multi-dimensional image sets, suffixes `.sldy` /
//! `.sldyz`). Given the path to a slide, exposes a uniform multi-capture,
//! multi-plane pixel and metadata interface.
//!
//! # Example
//!
//! ```no_run
//! use sldy::Slide;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let slide = Slide::open("/data/demo.sldy")?;
//!     println!("{} captures", slide.num_captures());
//!     Ok(())
//! }
//! ```

mod capture;
mod codec;
mod container;
mod document;
pub mod emit;
mod error;
mod handle_cache;
pub mod npy;
pub mod records;

pub use capture::Capture;
pub use emit::{CaptureMetadata, Dimensions, MetadataSink, PixelType, PlaneFact, RgbInference, RoiShape};
pub use error::SldyError;
pub use handle_cache::DEFAULT_CAPACITY;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use capture::CaptureLoader;
use handle_cache::HandleCache;

/// Print-to-writer trait, used by [`fmt::Display`] for a human-readable
/// summary of an opened slide.
pub trait Print {
    fn print<W: fmt::Write + ?Sized>(&self, writer: &mut W, indent: usize) -> fmt::Result;
}

/// A fully opened SlideBook 7 container: the slide's sentinel file plus
/// every image group beneath its sibling root directory that loaded
/// successfully (§4.6: "any failure aborts the group and excludes it from
/// the reader's published list").
pub struct Slide {
    slide_path: PathBuf,
    root: PathBuf,
    captures: Vec<Capture>,
    handle_cache: HandleCache,
}

impl Slide {
    /// Opens `path` (must end `.sldy` or `.sldyz`) with the default
    /// file-handle cache capacity (§4.5).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SldyError> {
        Self::open_with_capacity(path, DEFAULT_CAPACITY)
    }

    /// As [`Slide::open`], but with an explicit file-handle cache capacity.
    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self, SldyError> {
        let path = path.as_ref();
        let (root, compressed) = container::slide_root(path)?;

        let mut titles = container::list_image_groups(&root)?;
        titles.sort();

        let mut captures = Vec::with_capacity(titles.len());
        for title in &titles {
            match CaptureLoader::load(&root, title, compressed) {
                Ok(capture) => captures.push(capture),
                Err(err) => {
                    log::warn!("skipping image group `{}` in {}: {}", title, root.display(), err);
                }
            }
        }

        if captures.is_empty() {
            return Err(SldyError::EmptyContainer { path: root });
        }

        Ok(Slide {
            slide_path: path.to_path_buf(),
            root,
            captures,
            handle_cache: HandleCache::with_capacity(capacity),
        })
    }

    /// Number of successfully loaded image groups.
    pub fn num_captures(&self) -> usize {
        self.captures.len()
    }

    /// Returns the capture at `series`, or `None` if out of range.
    pub fn capture(&self, series: usize) -> Option<&Capture> {
        self.captures.get(series)
    }

    /// Published dimensions for `series`: X, Y, C, Z, T and the positional
    /// axis embedded in T.
    pub fn dimensions(&self, series: usize) -> Option<Dimensions> {
        let capture = self.captures.get(series)?;
        let record = capture.image_record();
        Some(Dimensions {
            width: record.width(),
            height: record.height(),
            num_channels: capture.num_channels(),
            num_planes: record.num_planes(),
            num_timepoints: capture.num_timepoints_out(),
            num_positions: capture.num_positions(),
        })
    }

    /// Decodes and copies one 2-D pixel plane into `out_buf` (§4.6 "Serve a
    /// plane"). `position_idx` is accepted for interface symmetry with the
    /// published axis order (X, Y, C, Z, T) but always passed as `0` — the
    /// position axis is folded into `t` by the caller before this call.
    pub fn read_plane(
        &mut self,
        series: usize,
        position_idx: usize,
        t: i32,
        z: i32,
        c: i32,
        out_buf: &mut [u8],
    ) -> Result<(), SldyError> {
        let capture = self
            .captures
            .get_mut(series)
            .ok_or_else(|| SldyError::format(format!("no such capture series {}", series)))?;

        capture.read_plane(&self.root, &mut self.handle_cache, position_idx, t, z, c, out_buf)
    }

    /// Enumerates the slide sentinel file and every file under its root
    /// directory, excluding lock files (`*.lck`), copies (`*.copy`), and
    /// `*.dat`; pixel files (`*.npy`/`*.npyz`) are also excluded unless
    /// `include_pixels` is set. Subdirectories are walked concurrently with
    /// `rayon` (§5): the walk is read-only and each subtree is independent.
    pub fn used_files(&self, include_pixels: bool) -> Result<Vec<PathBuf>, SldyError> {
        let mut files = vec![self.slide_path.clone()];
        files.extend(collect_used_files(&self.root, include_pixels)?);
        Ok(files)
    }

    /// Closes every stream held in the file-handle cache (§5: "callers
    /// abort by closing the reader, which MUST close every stream in the
    /// LRU").
    pub fn close(&mut self) {
        self.handle_cache.close_all();
    }
}

fn collect_used_files(dir: &Path, include_pixels: bool) -> Result<Vec<PathBuf>, SldyError> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            subdirs.push(path);
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "lck" | "copy" | "dat" => continue,
            "npy" | "npyz" if !include_pixels => continue,
            _ => {}
        }

        files.push(path);
    }

    let nested: Result<Vec<Vec<PathBuf>>, SldyError> = subdirs
        .par_iter()
        .map(|subdir| collect_used_files(subdir, include_pixels))
        .collect();
    files.extend(nested?.into_iter().flatten());

    Ok(files)
}

#[rustfmt::skip]
impl Print for Slide {
    fn print<W: fmt::Write + ?Sized>(&self, writer: &mut W, indent: usize) -> fmt::Result {
        writeln!(writer, "Slide: {}", self.slide_path.display())?;
        writeln!(writer, "Root: {}", self.root.display())?;

        for (series, capture) in self.captures.iter().enumerate() {
            let record = capture.image_record();
            write!(writer, "{:indent$}", "", indent = indent)?;
            writeln!(
                writer,
                "[{0}] {1} | {2}x{3} | C={4} Z={5} T={6} P={7}",
                series,
                capture.title(),
                record.width(),
                record.height(),
                capture.num_channels(),
                record.num_planes(),
                capture.num_timepoints_out(),
                capture.num_positions(),
            )?;
        }

        Ok(())
    }
}

impl fmt::Display for Slide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.print(f, 0)
    }
}
