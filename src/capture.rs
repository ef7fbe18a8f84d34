//! Capture Loader (§4.6): composes the container layout, structured record
//! decoder, NPY header parser and codec dispatch to load one image group's
//! metadata in sequence and serve arbitrary plane reads.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::{self, Algorithm};
use crate::container;
use crate::document::tokenize;
use crate::error::SldyError;
use crate::handle_cache::HandleCache;
use crate::npy::{self, DType, NpyHeader};
use crate::records::{self, Annotations, AuxData, ChannelRecord, ImageRecord, Masks};

/// The per-group cache slot: NPY header and the `(channel, timepoint)`
/// latch that invalidates it. Kept as one value so both are replaced
/// atomically (§9 Design Notes).
struct CachedHeader {
    channel: i32,
    timepoint: i32,
    header: NpyHeader,
}

/// One fully loaded image group ("capture").
pub struct Capture {
    title: String,
    compressed: bool,
    image_record: ImageRecord,
    channels: Vec<ChannelRecord>,
    masks: Masks,
    annotations: Annotations,
    elapsed_times: Vec<i64>,
    sa_positions: Vec<Vec<i32>>,
    stage_positions: Vec<(f64, f64, f64)>,
    aux_data: AuxData,
    is_sfmt: bool,
    num_channels: i32,
    num_timepoints_raw: i32,
    num_positions: i32,
    dtype: DType,
    cached_header: Option<CachedHeader>,
}

impl Capture {
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }
    #[inline]
    pub fn image_record(&self) -> &ImageRecord {
        &self.image_record
    }
    #[inline]
    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }
    #[inline]
    pub fn masks(&self) -> &Masks {
        &self.masks
    }
    #[inline]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
    #[inline]
    pub fn elapsed_times(&self) -> &[i64] {
        &self.elapsed_times
    }
    #[inline]
    pub fn sa_positions(&self) -> &[Vec<i32>] {
        &self.sa_positions
    }
    #[inline]
    pub fn stage_positions(&self) -> &[(f64, f64, f64)] {
        &self.stage_positions
    }
    #[inline]
    pub fn aux_data(&self) -> &AuxData {
        &self.aux_data
    }
    #[inline]
    pub fn is_sfmt(&self) -> bool {
        self.is_sfmt
    }
    #[inline]
    pub fn num_channels(&self) -> i32 {
        self.num_channels
    }
    /// `#timepoints` as stored on disk, before dividing out stage positions.
    #[inline]
    pub fn num_timepoints_raw(&self) -> i32 {
        self.num_timepoints_raw
    }
    #[inline]
    pub fn num_positions(&self) -> i32 {
        self.num_positions
    }
    /// Pixel element type, established once at load time by peeking the
    /// first plane's NPY header (§4.7: pixel type is published per capture,
    /// not re-derived on every plane read).
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.dtype.bytes_per_pixel()
    }
    /// `#timepoints` as published to callers: `stored_timepoints / #positions`.
    #[inline]
    pub fn num_timepoints_out(&self) -> i32 {
        if self.num_positions == 0 {
            self.num_timepoints_raw
        } else {
            self.num_timepoints_raw / self.num_positions
        }
    }

    /// Serves plane `(t, z, c)`. `positionIdx` is accepted for interface
    /// symmetry with the published axis order but always passed as `0`
    /// here — callers encode position into the raw timepoint index
    /// upstream (§4.6).
    pub(crate) fn read_plane(
        &mut self,
        root: &Path,
        handle_cache: &mut HandleCache,
        _position_idx: usize,
        t: i32,
        z: i32,
        c: i32,
        out_buf: &mut [u8],
    ) -> Result<(), SldyError> {
        let mut path = container::image_data_path(root, &self.title, c as u32, t as u32, self.compressed);

        if self.is_sfmt && t > 0 {
            path = container::rename_to_tp0(&path)
                .ok_or_else(|| SldyError::format("SFMT path missing a 7-digit timepoint token"))?;
        }

        let needs_reparse = match &self.cached_header {
            Some(cached) => cached.channel != c || cached.timepoint != t,
            None => true,
        };

        let stream = handle_cache.get_or_open(&path)?;

        if needs_reparse {
            stream.seek(SeekFrom::Start(0))?;
            let header = npy::parse_header(stream)?;
            self.cached_header = Some(CachedHeader {
                channel: c,
                timepoint: t,
                header,
            });
        }

        let header = &self.cached_header.as_ref().expect("just populated above").header;
        let plane_size = header.plane_size()?;

        if out_buf.len() < plane_size {
            return Err(SldyError::format(format!(
                "output buffer is {} bytes, plane requires {}",
                out_buf.len(),
                plane_size
            )));
        }

        if !header.is_compressed() {
            let seek_index = if self.is_sfmt { t } else { z };
            let offset = header.data_start() + (plane_size as u64) * (seek_index as u64);
            stream.seek(SeekFrom::Start(offset))?;
            stream.read_exact(&mut out_buf[..plane_size])?;
        } else {
            let raw = npy::read_block_bytes(stream, header, z as usize)?;
            let algorithm = Algorithm::from_tag(header.algorithm_tag())?;
            let decoded = codec::decode(algorithm, &raw, plane_size)?;
            let n = decoded.len().min(out_buf.len());
            out_buf[..n].copy_from_slice(&decoded[..n]);
        }

        Ok(())
    }
}

/// Loads one image group's metadata documents in the order §4.6 mandates.
/// Any failure aborts the group (the caller excludes it from the published
/// list).
pub struct CaptureLoader;

impl CaptureLoader {
    pub fn load(root: &Path, title: &str, compressed: bool) -> Result<Capture, SldyError> {
        let group_dir = root.join(format!("{}.imgdir", title));

        let image_record = load_image_record(&group_dir)?;
        let channels = load_channel_records(&group_dir)?;
        let masks = load_masks(&group_dir)?;
        let annotations = load_annotations(&group_dir)?;
        let elapsed_times = load_elapsed_times(&group_dir)?;
        let sa_positions = load_sa_positions(&group_dir)?;
        let stage_positions = load_stage_positions(&group_dir)?;
        let aux_data = load_aux_data(&group_dir)?;

        if (elapsed_times.len() as i32) < image_record.num_timepoints() {
            log::warn!(
                "group {} has {} elapsed times but declares {} timepoints",
                title,
                elapsed_times.len(),
                image_record.num_timepoints()
            );
        }

        let (num_channels, num_timepoints_raw, is_sfmt) =
            count_image_files(root, title, &image_record)?;

        let num_positions = count_positions(&stage_positions);
        let dtype = peek_dtype(root, title, compressed)?;

        Ok(Capture {
            title: title.to_string(),
            compressed,
            image_record,
            channels,
            masks,
            annotations,
            elapsed_times,
            sa_positions,
            stage_positions,
            aux_data,
            is_sfmt,
            num_channels,
            num_timepoints_raw,
            num_positions: num_positions as i32,
            dtype,
            cached_header: None,
        })
    }
}

fn load_document(group_dir: &Path, file_name: &str) -> Result<Vec<crate::document::Entry>, SldyError> {
    let path = group_dir.join(file_name);
    let text = fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SldyError::NotFound { path: path.clone() }
        } else {
            SldyError::Io { source }
        }
    })?;
    Ok(tokenize(&text))
}

fn load_image_record(group_dir: &Path) -> Result<ImageRecord, SldyError> {
    let entries = load_document(group_dir, "ImageRecord.yaml")?;
    let (record, _) = records::decode_image_record(&entries, 0)?;
    Ok(record)
}

fn load_channel_records(group_dir: &Path) -> Result<Vec<ChannelRecord>, SldyError> {
    let entries = load_document(group_dir, "ChannelRecord.yaml")?;
    let (channels, _) = records::decode_channel_records(&entries, 0)?;
    Ok(channels)
}

fn load_masks(group_dir: &Path) -> Result<Masks, SldyError> {
    let entries = load_document(group_dir, "MaskRecord.yaml")?;
    let (masks, _) = records::decode_masks(&entries, 0)?;
    Ok(masks)
}

fn load_annotations(group_dir: &Path) -> Result<Annotations, SldyError> {
    let entries = load_document(group_dir, "AnnotationRecord.yaml")?;
    let (annotations, _) = records::decode_annotations(&entries, 0)?;
    Ok(annotations)
}

fn load_elapsed_times(group_dir: &Path) -> Result<Vec<i64>, SldyError> {
    let entries = load_document(group_dir, "ElapsedTimes.yaml")?;
    let (times, _) = records::decode_elapsed_times(&entries, 0)?;
    Ok(times)
}

fn load_sa_positions(group_dir: &Path) -> Result<Vec<Vec<i32>>, SldyError> {
    let entries = load_document(group_dir, "SAPositionData.yaml")?;
    let (positions, _) = records::decode_sa_positions(&entries, 0)?;
    Ok(positions)
}

fn load_stage_positions(group_dir: &Path) -> Result<Vec<(f64, f64, f64)>, SldyError> {
    let entries = load_document(group_dir, "StagePositionData.yaml")?;
    let (positions, _) = records::decode_stage_positions(&entries, 0)?;
    Ok(positions)
}

fn load_aux_data(group_dir: &Path) -> Result<AuxData, SldyError> {
    let entries = load_document(group_dir, "AuxData.yaml")?;
    let (aux, _) = records::decode_aux_data(&entries, 0)?;
    Ok(aux)
}

/// Reads just enough of channel 0, timepoint 0's NPY header to learn the
/// capture's pixel element type (§4.7).
fn peek_dtype(root: &Path, title: &str, compressed: bool) -> Result<DType, SldyError> {
    let path = container::image_data_path(root, title, 0, 0, compressed);
    let mut file = fs::File::open(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SldyError::NotFound { path: path.clone() }
        } else {
            SldyError::Io { source }
        }
    })?;
    let header = npy::parse_header(&mut file)?;
    Ok(header.dtype())
}

/// Determines `(#channels, #timepoints, is_sfmt)` per the §4.6 "Counting
/// image files" algorithm.
fn count_image_files(
    root: &Path,
    title: &str,
    image_record: &ImageRecord,
) -> Result<(i32, i32, bool), SldyError> {
    let group_dir = root.join(format!("{}.imgdir", title));

    let mut image_files = Vec::new();
    for entry in fs::read_dir(&group_dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with("ImageData_") {
                image_files.push(path);
            }
        }
    }

    let f = image_files.len() as i32;
    let declared_channels = image_record.num_channels();
    let declared_timepoints = image_record.num_timepoints();

    if f == declared_channels * declared_timepoints {
        return Ok((declared_channels, declared_timepoints, false));
    }

    if f == declared_channels && image_record.num_planes() == 1 {
        // Candidate single-file-multi-timepoint layout: parse each
        // channel's header and take the maximum leading shape dimension.
        // The source's own "crashed between channels" comment argues for
        // `min`; the behaviour actually implemented (and thus mandated
        // here) uses `max`, tolerating a channel truncated mid-acquisition
        // rather than truncating every channel down to the shortest one.
        let mut max_timepoints = 1;
        for path in &image_files {
            let mut file = fs::File::open(path)?;
            let header = npy::parse_header(&mut file)?;
            if header.shape().len() == 3 && header.shape()[0] > 1 {
                max_timepoints = max_timepoints.max(header.shape()[0] as i32);
            }
        }
        return Ok((declared_channels, max_timepoints, true));
    }

    let mut max_channel = -1i32;
    let mut max_timepoint = -1i32;
    for path in &image_files {
        if let Some(channel) = container::channel_of(path) {
            max_channel = max_channel.max(channel as i32);
        }
        if let Some(timepoint) = container::timepoint_of(path) {
            max_timepoint = max_timepoint.max(timepoint as i32);
        }
    }

    let num_channels = max_channel + 1;
    let num_timepoints = max_timepoint + 1;

    if num_channels == 0 || num_timepoints == 0 {
        return Err(SldyError::format(format!(
            "could not determine channel/timepoint count for group {} from {} image files",
            title, f
        )));
    }

    Ok((num_channels, num_timepoints, false))
}

/// `#positions` = the largest `n` such that the first `n` entries have
/// pairwise distinct `(x, y)` prefixes compared to position 0 (§4.6).
/// Equivalently, scan forward from index 1 and stop as soon as an entry's
/// `(x, y)` equals position 0's. Z is intentionally ignored (§9 open
/// question: positions are compared on XY only).
fn count_positions(stage_positions: &[(f64, f64, f64)]) -> usize {
    if stage_positions.len() <= 1 {
        return 1;
    }

    let (x0, y0, _) = stage_positions[0];
    for (i, &(x, y, _)) in stage_positions.iter().enumerate().skip(1) {
        if x == x0 && y == y0 {
            return i;
        }
    }

    stage_positions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_count_detects_first_xy_repeat() {
        let stage = vec![(1.0, 1.0, 0.0), (2.0, 1.0, 0.0), (1.0, 1.0, 0.0), (2.0, 1.0, 0.0)];
        assert_eq!(count_positions(&stage), 2);
    }

    #[test]
    fn position_count_with_single_entry_is_one() {
        let stage = vec![(1.0, 1.0, 0.0)];
        assert_eq!(count_positions(&stage), 1);
    }

    #[test]
    fn position_count_with_no_positions_is_one() {
        let stage: Vec<(f64, f64, f64)> = vec![];
        assert_eq!(count_positions(&stage), 1);
    }

    #[test]
    fn position_count_ignores_z_difference_at_same_xy() {
        let stage = vec![(1.0, 1.0, 0.0), (1.0, 1.0, 5.0)];
        assert_eq!(count_positions(&stage), 1);
    }
}
