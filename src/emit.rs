//! External metadata emission contract (§4.7, §6): the set of facts a
//! capture publishes to the downstream microscopy metadata store. That
//! store is an opaque collaborator out of scope for this crate (§1); this
//! module only builds the [`CaptureMetadata`] value and defines the
//! [`MetadataSink`] trait a caller implements to receive it.

use crate::capture::Capture;
use crate::npy::DType;
use crate::records::{Annotation, ChannelRecord, LensDef, OptovarDef};

/// Dimensions published for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
    pub num_channels: i32,
    pub num_planes: i32,
    pub num_timepoints: i32,
    pub num_positions: i32,
}

/// Pixel element type, inferred from byte width and signedness (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U16,
    I16,
    U32,
    I32,
}

impl From<DType> for PixelType {
    fn from(dtype: DType) -> Self {
        match dtype {
            DType::U16 => PixelType::U16,
            DType::I16 => PixelType::I16,
            DType::U32 => PixelType::U32,
            DType::I32 => PixelType::I32,
        }
    }
}

/// RGB inference result: bytes-per-pixel divisible by 3 splits the channel
/// count by 3 and marks the capture as RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbInference {
    pub is_rgb: bool,
    pub effective_channels: i32,
}

pub fn infer_rgb(bytes_per_pixel: usize, num_channels: i32) -> RgbInference {
    if bytes_per_pixel % 3 == 0 && bytes_per_pixel > 0 {
        RgbInference {
            is_rgb: true,
            effective_channels: num_channels * 3,
        }
    } else {
        RgbInference {
            is_rgb: false,
            effective_channels: num_channels,
        }
    }
}

/// Per-plane timing and stage facts (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFact {
    pub delta_t_ms: i64,
    pub exposure_ms: f64,
    pub stage_x_um: f64,
    pub stage_y_um: f64,
    pub stage_z_um: f64,
}

/// Computes the Z stage position for a plane: `stage.z + interplane_spacing * zplane`.
pub fn plane_stage_z(stage_z: f64, interplane_spacing_um: f64, zplane: i32) -> f64 {
    stage_z + interplane_spacing_um * zplane as f64
}

/// A geometric ROI shape derived from an annotation's `mGraphicType70` tag,
/// per the §4.7 table. Types 4-7 are explicitly skipped (return `None`).
#[derive(Debug, Clone, PartialEq)]
pub enum RoiShape {
    Point { x: f64, y: f64 },
    Line { from: (f64, f64), to: (f64, f64) },
    Rectangle { x: f64, y: f64, width: f64, height: f64 },
    Polygon { vertices: Vec<(f64, f64)> },
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
}

/// Derives the ROI shape for `annotation`, or `None` for graphic types 4-7
/// or an annotation that lacks the vertices its shape needs.
pub fn roi_shape(annotation: &Annotation) -> Option<RoiShape> {
    let vertices = annotation.vertices();

    match annotation.graphic_type() {
        0 => {
            let (x, y, _) = *vertices.first()?;
            Some(RoiShape::Point { x, y })
        }
        1 => {
            let (x0, y0, _) = *vertices.first()?;
            let (x1, y1, _) = *vertices.get(1)?;
            Some(RoiShape::Line {
                from: (x0, y0),
                to: (x1, y1),
            })
        }
        2 => {
            let (x0, y0, _) = *vertices.first()?;
            let (x1, y1, _) = *vertices.get(1)?;
            Some(RoiShape::Rectangle {
                x: x0,
                y: y0,
                width: x1 - x0,
                height: y1 - y0,
            })
        }
        3 => Some(RoiShape::Polygon {
            vertices: vertices.iter().map(|&(x, y, _)| (x, y)).collect(),
        }),
        4..=7 => None,
        8 => {
            let (x0, y0, _) = *vertices.first()?;
            let (x1, y1, _) = *vertices.get(1)?;
            Some(RoiShape::Ellipse {
                cx: (x0 + x1) / 2.0,
                cy: (y0 + y1) / 2.0,
                rx: (x1 - x0) / 2.0,
                ry: (y1 - y0) / 2.0,
            })
        }
        _ => None,
    }
}

/// `lens.micronPerPixel / optovar.magnification * channel[0].xFactor`, only
/// when each divisor/multiplier is positive (§4.7).
pub fn voxel_size_um(lens: &LensDef, optovar: &OptovarDef, first_channel: Option<&ChannelRecord>) -> Option<f64> {
    let micron_per_pixel = lens.micron_per_pixel();
    let magnification = optovar.magnification();
    let x_factor = first_channel.map(ChannelRecord::x_factor).unwrap_or(0.0);

    if micron_per_pixel > 0.0 && magnification > 0.0 && x_factor > 0.0 {
        Some(micron_per_pixel / magnification * x_factor)
    } else {
        None
    }
}

/// The full set of facts published for one capture.
#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    pub dimensions: Dimensions,
    pub rgb: RgbInference,
    pub pixel_type: PixelType,
    pub channel_names: Vec<String>,
    pub objective_name: String,
    pub voxel_size_um: Option<f64>,
}

/// Implemented by the downstream metadata store; this crate never
/// implements it (§1 scopes the store out as an opaque collaborator).
pub trait MetadataSink {
    fn accept_capture(&mut self, metadata: &CaptureMetadata);
    fn accept_plane(&mut self, series: usize, t: i32, z: i32, c: i32, fact: PlaneFact);
    fn accept_roi(&mut self, series: usize, t: i32, shape: RoiShape);
}

/// Assembles the full set of facts `capture` publishes (§4.7): the only
/// place a [`CaptureMetadata`] value is actually built. Channel names are
/// trimmed, since the on-disk field may carry trailing whitespace the
/// unescape step doesn't strip.
pub fn capture_metadata(capture: &Capture) -> CaptureMetadata {
    let record = capture.image_record();

    let dimensions = Dimensions {
        width: record.width(),
        height: record.height(),
        num_channels: capture.num_channels(),
        num_planes: record.num_planes(),
        num_timepoints: capture.num_timepoints_out(),
        num_positions: capture.num_positions(),
    };

    let rgb = infer_rgb(capture.bytes_per_pixel(), capture.num_channels());
    let pixel_type = PixelType::from(capture.dtype());

    let channel_names = capture
        .channels()
        .iter()
        .map(|channel| channel.name().trim().to_string())
        .collect();

    CaptureMetadata {
        dimensions,
        rgb,
        pixel_type,
        channel_names,
        objective_name: record.main_view().objective_name().to_string(),
        voxel_size_um: voxel_size_um(record.lens(), record.optovar(), capture.channels().first()),
    }
}

/// Builds the timing/stage fact for raw timepoint `t`, Z plane `zplane`, and
/// `channel`'s exposure characteristics (§4.7). `None` if `t` falls outside
/// either the elapsed-time or stage-position tables, or `channel` is out of
/// range.
pub fn capture_plane_fact(capture: &Capture, channel: usize, t: i32, zplane: i32) -> Option<PlaneFact> {
    let delta_t_ms = *capture.elapsed_times().get(t as usize)?;
    let (stage_x_um, stage_y_um, stage_z_um) = *capture.stage_positions().get(t as usize)?;
    let exposure = capture.channels().get(channel)?.exposure();

    Some(PlaneFact {
        delta_t_ms,
        exposure_ms: exposure.exposure_time_ms(),
        stage_x_um,
        stage_y_um,
        stage_z_um: plane_stage_z(stage_z_um, exposure.interplane_spacing_um(), zplane),
    })
}

/// Every ROI published across `capture`'s annotation timepoints, paired with
/// the raw timepoint index it belongs to (§4.7).
pub fn capture_rois(capture: &Capture) -> Vec<(i32, RoiShape)> {
    let mut rois = Vec::new();

    for (t, timepoint) in capture.annotations().timepoints().iter().enumerate() {
        let groups: [&[Annotation]; 4] = [
            timepoint.cube(),
            timepoint.base(),
            timepoint.frap(),
            timepoint.unknown(),
        ];
        for group in groups {
            for annotation in group {
                if let Some(shape) = roi_shape(annotation) {
                    rois.push((t as i32, shape));
                }
            }
        }
    }

    rois
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureLoader;
    use crate::document::tokenize;
    use crate::records::decode_annotations;
    use std::fs;
    use std::io::Write;

    fn build_capture_fixture(group_dir: &std::path::Path) {
        fs::create_dir_all(group_dir).unwrap();

        let image_record = "StartClass:\n  ClassName: ImageRecord\n  Width: 2\n  Height: 2\n  NumPlanes: 1\n  NumChannels: 1\n  NumTimepoints: 1\nEndClass:\nStartClass:\n  ClassName: LensDef\n  MicronPerPixel: 0.5\n  Name: 10x\nEndClass:\nStartClass:\n  ClassName: OptovarDef\n  Magnification: 1.0\nEndClass:\nStartClass:\n  ClassName: MainViewRecord\n  ObjectiveName: 20x/0.8\nEndClass:\n";
        fs::write(group_dir.join("ImageRecord.yaml"), image_record).unwrap();

        let channel_record = "StartClass:\n  ClassName: ChannelRecord\n  Name: GFP_#32;_#32;\n  Camera: CamA\nEndClass:\nStartClass:\n  ClassName: ExposureRecord\n  ExposureTimeMs: 10.0\n  InterplaneSpacingUm: 1.0\n  XFactor: 2.0\n  YFactor: 2.0\nEndClass:\n";
        fs::write(group_dir.join("ChannelRecord.yaml"), channel_record).unwrap();

        fs::write(group_dir.join("MaskRecord.yaml"), "").unwrap();
        fs::write(group_dir.join("AnnotationRecord.yaml"), "").unwrap();

        let elapsed = "StartClass:\n  ClassName: ElapsedTimes\n  Times:\n    - 1\n    - 0\nEndClass:\n";
        fs::write(group_dir.join("ElapsedTimes.yaml"), elapsed).unwrap();
        fs::write(group_dir.join("SAPositionData.yaml"), "").unwrap();

        let stage = "StartClass:\n  ClassName: StagePositionData\n  X:\n    - 1\n    - 5.0\n  Y:\n    - 1\n    - 6.0\n  Z:\n    - 1\n    - 0.0\nEndClass:\n";
        fs::write(group_dir.join("StagePositionData.yaml"), stage).unwrap();
        fs::write(group_dir.join("AuxData.yaml"), "").unwrap();

        let header_text = "{'descr': '<u2', 'fortran_order': False, 'shape': (2, 2), }\n";
        let mut npy_bytes = Vec::new();
        npy_bytes.extend_from_slice(b"\x93NUMPY");
        npy_bytes.push(1);
        npy_bytes.push(0);
        npy_bytes.extend_from_slice(&(header_text.len() as u16).to_le_bytes());
        npy_bytes.extend_from_slice(header_text.as_bytes());
        npy_bytes.extend_from_slice(&[0u8; 8]);
        let mut file = fs::File::create(group_dir.join("ImageData_Ch0_TP0000000.npy")).unwrap();
        file.write_all(&npy_bytes).unwrap();
    }

    #[test]
    fn capture_metadata_assembles_trimmed_names_and_pixel_type() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("demo.dir");
        build_capture_fixture(&root.join("cap.imgdir"));

        let capture = CaptureLoader::load(&root, "cap", false).unwrap();
        let metadata = capture_metadata(&capture);

        assert_eq!(metadata.pixel_type, PixelType::U16);
        assert_eq!(metadata.channel_names, vec!["GFP".to_string()]);
        assert_eq!(metadata.objective_name, "20x/0.8");
        assert_eq!(metadata.dimensions.width, 2);
        assert!(!metadata.rgb.is_rgb);
        assert_eq!(
            metadata.voxel_size_um,
            Some(0.5 / 1.0 * 2.0)
        );
    }

    #[test]
    fn capture_plane_fact_reads_elapsed_time_and_stage_position() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("demo.dir");
        build_capture_fixture(&root.join("cap.imgdir"));

        let capture = CaptureLoader::load(&root, "cap", false).unwrap();
        let fact = capture_plane_fact(&capture, 0, 0, 2).unwrap();

        assert_eq!(fact.delta_t_ms, 0);
        assert_eq!(fact.exposure_ms, 10.0);
        assert_eq!(fact.stage_x_um, 5.0);
        assert_eq!(fact.stage_y_um, 6.0);
        assert_eq!(fact.stage_z_um, 2.0);

        assert!(capture_plane_fact(&capture, 0, 5, 0).is_none());
    }

    #[test]
    fn rgb_inference_splits_channel_count() {
        let rgb = infer_rgb(3, 1);
        assert!(rgb.is_rgb);
        assert_eq!(rgb.effective_channels, 3);

        let not_rgb = infer_rgb(2, 4);
        assert!(!not_rgb.is_rgb);
        assert_eq!(not_rgb.effective_channels, 4);
    }

    #[test]
    fn rectangle_from_cube_annotation_matches_scenario_s4() {
        let text = "StartClass:\n  ClassName: AnnotationTimepoint\nEndClass:\nStartClass:\n  ClassName: CubeAnnotation\n  GraphicType70: 2\n  Vertices:\n    - 2\n    - 10,20,0\n    - 110,220,0\nEndClass:\n";
        let entries = tokenize(text);
        let (annotations, _) = decode_annotations(&entries, 0).unwrap();
        let annotation = &annotations.timepoints()[0].cube()[0];

        let shape = roi_shape(annotation).unwrap();
        assert_eq!(
            shape,
            RoiShape::Rectangle {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 200.0,
            }
        );
    }

    #[test]
    fn voxel_size_requires_all_positive_factors() {
        let lens = crate::records::LensDef::default();
        let optovar = crate::records::OptovarDef::default();
        assert_eq!(voxel_size_um(&lens, &optovar, None), None);
    }
}
