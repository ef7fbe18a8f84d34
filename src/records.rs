//! Typed record types materialised by the structured record decoder (§3,
//! §4.2): image/channel definitions, masks, annotations, and the
//! per-timepoint auxiliary tables. Every type follows an
//! accessor-method-over-private-fields shape, built via a `decode` function
//! that walks a [`Block`] rather than exposing public fields directly.

use crate::document::{self, Block, Value};
use crate::error::SldyError;

/// Decoded `ImageRecord`: width, height, plane/channel/timepoint counts and
/// the optical chain (`LensDef` -> `OptovarDef` -> `MainViewRecord`).
#[derive(Debug, Clone)]
pub struct ImageRecord {
    width: i32,
    height: i32,
    num_planes: i32,
    num_channels: i32,
    num_timepoints: i32,
    acquisition_timestamp: i64,
    lens: LensDef,
    optovar: OptovarDef,
    main_view: MainViewRecord,
}

impl ImageRecord {
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }
    #[inline]
    pub fn num_planes(&self) -> i32 {
        self.num_planes
    }
    #[inline]
    pub fn num_channels(&self) -> i32 {
        self.num_channels
    }
    #[inline]
    pub fn num_timepoints(&self) -> i32 {
        self.num_timepoints
    }
    #[inline]
    pub fn acquisition_timestamp(&self) -> i64 {
        self.acquisition_timestamp
    }
    #[inline]
    pub fn lens(&self) -> &LensDef {
        &self.lens
    }
    #[inline]
    pub fn optovar(&self) -> &OptovarDef {
        &self.optovar
    }
    #[inline]
    pub fn main_view(&self) -> &MainViewRecord {
        &self.main_view
    }
}

/// Decodes the `ImageRecord` block at `pos`, then chains the `LensDef`,
/// `OptovarDef` and `MainViewRecord` sibling blocks that document the
/// optical path, in that documented order (§4.2 "Composite records").
pub fn decode_image_record(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(ImageRecord, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "ImageRecord")?;

    let mut width = None;
    let mut height = None;
    let mut num_planes = None;
    let mut num_channels = None;
    let mut num_timepoints = None;
    let mut acquisition_timestamp = 0i64;

    for (key, value) in &block.fields {
        match key.as_str() {
            "Width" => width = Some(document::coerce_i32(key, scalar(value))),
            "Height" => height = Some(document::coerce_i32(key, scalar(value))),
            "NumPlanes" => num_planes = Some(document::coerce_i32(key, scalar(value))),
            "NumChannels" => num_channels = Some(document::coerce_i32(key, scalar(value))),
            "NumTimepoints" => num_timepoints = Some(document::coerce_i32(key, scalar(value))),
            "AcquisitionTimestamp" => acquisition_timestamp = document::coerce_i64(key, scalar(value)),
            _ => { /* decode_unknown: flattened/unrecognised fields are ignored here */ }
        }
    }

    let width = width.ok_or_else(|| SldyError::format("ImageRecord missing Width"))?;
    let height = height.ok_or_else(|| SldyError::format("ImageRecord missing Height"))?;
    let num_planes = num_planes.ok_or_else(|| SldyError::format("ImageRecord missing NumPlanes"))?;
    let num_channels =
        num_channels.ok_or_else(|| SldyError::format("ImageRecord missing NumChannels"))?;
    let num_timepoints =
        num_timepoints.ok_or_else(|| SldyError::format("ImageRecord missing NumTimepoints"))?;

    if width <= 0 || height <= 0 || num_planes < 1 || num_channels < 1 || num_timepoints < 1 {
        return Err(SldyError::format(
            "ImageRecord violates width/height/planes/channels/timepoints invariant",
        ));
    }

    let (lens, pos) = decode_lens_def(entries, pos)?;
    let (optovar, pos) = decode_optovar_def(entries, pos)?;
    let (main_view, pos) = decode_main_view_record(entries, pos)?;

    Ok((
        ImageRecord {
            width,
            height,
            num_planes,
            num_channels,
            num_timepoints,
            acquisition_timestamp,
            lens,
            optovar,
            main_view,
        },
        pos,
    ))
}

/// Microscope objective lens characteristics.
#[derive(Debug, Clone, Default)]
pub struct LensDef {
    micron_per_pixel: f64,
    name: String,
}

impl LensDef {
    #[inline]
    pub fn micron_per_pixel(&self) -> f64 {
        self.micron_per_pixel
    }
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn decode_lens_def(entries: &[document::Entry], pos: usize) -> Result<(LensDef, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "LensDef")?;
    let mut lens = LensDef::default();
    for (key, value) in &block.fields {
        match key.as_str() {
            "MicronPerPixel" => lens.micron_per_pixel = document::coerce_f64(key, scalar(value)),
            "Name" => lens.name = document::coerce_string(scalar(value)),
            _ => {}
        }
    }
    Ok((lens, pos))
}

/// Optovar (magnification changer) characteristics.
#[derive(Debug, Clone, Default)]
pub struct OptovarDef {
    magnification: f64,
}

impl OptovarDef {
    #[inline]
    pub fn magnification(&self) -> f64 {
        self.magnification
    }
}

fn decode_optovar_def(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(OptovarDef, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "OptovarDef")?;
    let mut optovar = OptovarDef::default();
    for (key, value) in &block.fields {
        if key == "Magnification" {
            optovar.magnification = document::coerce_f64(key, scalar(value));
        }
    }
    Ok((optovar, pos))
}

/// The main view record names the objective actually in use for the capture.
#[derive(Debug, Clone, Default)]
pub struct MainViewRecord {
    objective_name: String,
}

impl MainViewRecord {
    #[inline]
    pub fn objective_name(&self) -> &str {
        &self.objective_name
    }
}

fn decode_main_view_record(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(MainViewRecord, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "MainViewRecord")?;
    let mut main_view = MainViewRecord::default();
    for (key, value) in &block.fields {
        if key == "ObjectiveName" {
            main_view.objective_name = document::coerce_string(scalar(value));
        }
    }
    Ok((main_view, pos))
}

/// Per-channel exposure and timing characteristics.
#[derive(Debug, Clone, Default)]
pub struct ExposureRecord {
    exposure_time_ms: f64,
    interplane_spacing_um: f64,
    x_factor: f64,
    y_factor: f64,
}

impl ExposureRecord {
    #[inline]
    pub fn exposure_time_ms(&self) -> f64 {
        self.exposure_time_ms
    }
    #[inline]
    pub fn interplane_spacing_um(&self) -> f64 {
        self.interplane_spacing_um
    }
    #[inline]
    pub fn x_factor(&self) -> f64 {
        self.x_factor
    }
    #[inline]
    pub fn y_factor(&self) -> f64 {
        self.y_factor
    }
}

/// Non-exhaustive set of per-channel manipulation records that may appear
/// between successive `ChannelRecord`s in arbitrary but ordered positions.
#[derive(Debug, Clone)]
pub enum ChannelManipulation {
    Align,
    Ratio,
    Fret,
    Remap,
    Histogram,
    Unknown(String),
}

/// One channel's full definition: exposure timing, camera/fluor identity,
/// and any manipulation records found between it and the next channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelRecord {
    name: String,
    camera: String,
    fluor: String,
    exposure: ExposureRecord,
    manipulations: Vec<ChannelManipulation>,
}

impl ChannelRecord {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn camera(&self) -> &str {
        &self.camera
    }
    #[inline]
    pub fn fluor(&self) -> &str {
        &self.fluor
    }
    #[inline]
    pub fn exposure(&self) -> &ExposureRecord {
        &self.exposure
    }
    #[inline]
    pub fn x_factor(&self) -> f64 {
        self.exposure.x_factor
    }
    #[inline]
    pub fn manipulations(&self) -> &[ChannelManipulation] {
        &self.manipulations
    }
}

impl Default for ChannelManipulation {
    fn default() -> Self {
        ChannelManipulation::Unknown(String::new())
    }
}

/// Decodes every `ChannelRecord` (and its trailing manipulation records)
/// until the next class in the stream is not one of those kinds, returning
/// the channel list and the advanced cursor.
pub fn decode_channel_records(
    entries: &[document::Entry],
    mut pos: usize,
) -> Result<(Vec<ChannelRecord>, usize), SldyError> {
    let mut channels = Vec::new();

    loop {
        let next = document::find_next_class(entries, pos);
        match next.as_deref() {
            Some((class_name, _)) if class_name == "ChannelRecord" => {
                let (channel, new_pos) = decode_one_channel(entries, pos)?;
                channels.push(channel);
                pos = new_pos;
            }
            _ => break,
        }
    }

    Ok((channels, pos))
}

fn decode_one_channel(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(ChannelRecord, usize), SldyError> {
    let (block, mut pos) = document::expect_block(entries, pos, "ChannelRecord")?;
    let mut channel = ChannelRecord::default();

    for (key, value) in &block.fields {
        match key.as_str() {
            "Name" => channel.name = document::coerce_string(scalar(value)),
            "Camera" => channel.camera = document::coerce_string(scalar(value)),
            "Fluor" => channel.fluor = document::coerce_string(scalar(value)),
            _ => {}
        }
    }

    let (exposure_block, new_pos) = document::expect_block(entries, pos, "ExposureRecord")?;
    pos = new_pos;
    channel.exposure = decode_exposure_fields(&exposure_block);

    // Trailing manipulation records, consumed until the next channel or a
    // class this loader doesn't recognise as a manipulation kind.
    loop {
        match document::find_next_class(entries, pos).as_deref() {
            Some(("AlignRecord", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "AlignRecord")?;
                channel.manipulations.push(ChannelManipulation::Align);
                pos = new_pos;
            }
            Some(("RatioRecord", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "RatioRecord")?;
                channel.manipulations.push(ChannelManipulation::Ratio);
                pos = new_pos;
            }
            Some(("FretRecord", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "FretRecord")?;
                channel.manipulations.push(ChannelManipulation::Fret);
                pos = new_pos;
            }
            Some(("RemapRecord", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "RemapRecord")?;
                channel.manipulations.push(ChannelManipulation::Remap);
                pos = new_pos;
            }
            Some(("HistogramRecord", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "HistogramRecord")?;
                channel.manipulations.push(ChannelManipulation::Histogram);
                pos = new_pos;
            }
            _ => break,
        }
    }

    Ok((channel, pos))
}

fn decode_exposure_fields(block: &Block) -> ExposureRecord {
    let mut exposure = ExposureRecord::default();
    for (key, value) in &block.fields {
        match key.as_str() {
            "ExposureTimeMs" => exposure.exposure_time_ms = document::coerce_f64(key, scalar(value)),
            "InterplaneSpacingUm" => {
                exposure.interplane_spacing_um = document::coerce_f64(key, scalar(value))
            }
            "XFactor" => exposure.x_factor = document::coerce_f64(key, scalar(value)),
            "YFactor" => exposure.y_factor = document::coerce_f64(key, scalar(value)),
            _ => {}
        }
    }
    exposure
}

/// One named submask record (`Masks` §3: "a count N of MaskRecords").
#[derive(Debug, Clone, Default)]
pub struct MaskRecord {
    name: String,
    id: i32,
}

impl MaskRecord {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }
}

/// Per-timepoint compressed-block location table for submasks.
#[derive(Debug, Clone, Default)]
pub struct MaskTimepoint {
    block_sizes: Vec<i64>,
    offsets: Vec<i64>,
}

impl MaskTimepoint {
    #[inline]
    pub fn block_sizes(&self) -> &[i64] {
        &self.block_sizes
    }
    #[inline]
    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }
}

/// The full mask document: named mask records plus one location table per
/// timepoint.
#[derive(Debug, Clone, Default)]
pub struct Masks {
    records: Vec<MaskRecord>,
    per_timepoint: Vec<MaskTimepoint>,
}

impl Masks {
    #[inline]
    pub fn records(&self) -> &[MaskRecord] {
        &self.records
    }
    #[inline]
    pub fn per_timepoint(&self) -> &[MaskTimepoint] {
        &self.per_timepoint
    }
}

pub fn decode_masks(entries: &[document::Entry], mut pos: usize) -> Result<(Masks, usize), SldyError> {
    let mut masks = Masks::default();

    loop {
        match document::find_next_class(entries, pos).as_deref() {
            Some(("MaskRecord", _)) => {
                let (block, new_pos) = document::expect_block(entries, pos, "MaskRecord")?;
                let mut record = MaskRecord::default();
                for (key, value) in &block.fields {
                    match key.as_str() {
                        "Name" => record.name = document::coerce_string(scalar(value)),
                        "Id" => record.id = document::coerce_i32(key, scalar(value)),
                        _ => {}
                    }
                }
                masks.records.push(record);
                pos = new_pos;
            }
            Some(("MaskTimepoint", _)) => {
                let (block, new_pos) = document::expect_block(entries, pos, "MaskTimepoint")?;
                let mut timepoint = MaskTimepoint::default();
                for (key, value) in &block.fields {
                    match key.as_str() {
                        "BlockSizes" => timepoint.block_sizes = document::coerce_i64_vec(key, value),
                        "Offsets" => timepoint.offsets = document::coerce_i64_vec(key, value),
                        _ => {}
                    }
                }
                masks.per_timepoint.push(timepoint);
                pos = new_pos;
            }
            _ => break,
        }
    }

    Ok((masks, pos))
}

/// Discriminates the four parallel annotation lists per timepoint (§3/§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Cube,
    Base,
    Frap,
    Unknown,
}

/// One geometric region-of-interest annotation.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    graphic_type: i32,
    vertices: Vec<(f64, f64, f64)>,
    channel_mask: i64,
    group: i32,
    plane: i32,
    sequence: i32,
    object: i32,
    stage_offset: (f64, f64, f64),
    field_offset: (f64, f64),
}

impl Annotation {
    #[inline]
    pub fn graphic_type(&self) -> i32 {
        self.graphic_type
    }
    #[inline]
    pub fn vertices(&self) -> &[(f64, f64, f64)] {
        &self.vertices
    }
    #[inline]
    pub fn channel_mask(&self) -> i64 {
        self.channel_mask
    }
    #[inline]
    pub fn group(&self) -> i32 {
        self.group
    }
    #[inline]
    pub fn plane(&self) -> i32 {
        self.plane
    }
    #[inline]
    pub fn sequence(&self) -> i32 {
        self.sequence
    }
    #[inline]
    pub fn object(&self) -> i32 {
        self.object
    }
    #[inline]
    pub fn stage_offset(&self) -> (f64, f64, f64) {
        self.stage_offset
    }
    #[inline]
    pub fn field_offset(&self) -> (f64, f64) {
        self.field_offset
    }
}

/// One timepoint's four parallel annotation lists.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTimepoint {
    cube: Vec<Annotation>,
    base: Vec<Annotation>,
    frap: Vec<Annotation>,
    unknown: Vec<Annotation>,
}

impl AnnotationTimepoint {
    #[inline]
    pub fn cube(&self) -> &[Annotation] {
        &self.cube
    }
    #[inline]
    pub fn base(&self) -> &[Annotation] {
        &self.base
    }
    #[inline]
    pub fn frap(&self) -> &[Annotation] {
        &self.frap
    }
    #[inline]
    pub fn unknown(&self) -> &[Annotation] {
        &self.unknown
    }
}

/// The full annotation document: one [`AnnotationTimepoint`] per timepoint.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    timepoints: Vec<AnnotationTimepoint>,
}

impl Annotations {
    #[inline]
    pub fn timepoints(&self) -> &[AnnotationTimepoint] {
        &self.timepoints
    }
}

pub fn decode_annotations(
    entries: &[document::Entry],
    mut pos: usize,
) -> Result<(Annotations, usize), SldyError> {
    let mut annotations = Annotations::default();

    loop {
        let class = document::find_next_class(entries, pos);
        let kind = match class.as_deref() {
            Some(("CubeAnnotation", _)) => AnnotationKind::Cube,
            Some(("BaseAnnotation", _)) => AnnotationKind::Base,
            Some(("FrapAnnotation", _)) => AnnotationKind::Frap,
            Some(("UnknownAnnotation", _)) => AnnotationKind::Unknown,
            Some(("AnnotationTimepoint", _)) => {
                let (_, new_pos) = document::expect_block(entries, pos, "AnnotationTimepoint")?;
                annotations.timepoints.push(AnnotationTimepoint::default());
                pos = new_pos;
                continue;
            }
            _ => break,
        };

        let class_name = match kind {
            AnnotationKind::Cube => "CubeAnnotation",
            AnnotationKind::Base => "BaseAnnotation",
            AnnotationKind::Frap => "FrapAnnotation",
            AnnotationKind::Unknown => "UnknownAnnotation",
        };
        let (block, new_pos) = document::expect_block(entries, pos, class_name)?;
        let annotation = decode_annotation_fields(&block);
        pos = new_pos;

        let current = match annotations.timepoints.last_mut() {
            Some(tp) => tp,
            None => {
                annotations.timepoints.push(AnnotationTimepoint::default());
                annotations.timepoints.last_mut().unwrap()
            }
        };

        match kind {
            AnnotationKind::Cube => current.cube.push(annotation),
            AnnotationKind::Base => current.base.push(annotation),
            AnnotationKind::Frap => current.frap.push(annotation),
            AnnotationKind::Unknown => current.unknown.push(annotation),
        }
    }

    Ok((annotations, pos))
}

fn decode_annotation_fields(block: &Block) -> Annotation {
    let mut annotation = Annotation::default();
    let mut stage_x = 0.0;
    let mut stage_y = 0.0;
    let mut stage_z = 0.0;
    let mut field_x = 0.0;
    let mut field_y = 0.0;

    for (key, value) in &block.fields {
        match key.as_str() {
            "GraphicType70" => annotation.graphic_type = document::coerce_i32(key, scalar(value)),
            "ChannelMask" => annotation.channel_mask = document::coerce_i64(key, scalar(value)),
            "Group" => annotation.group = document::coerce_i32(key, scalar(value)),
            "Plane" => annotation.plane = document::coerce_i32(key, scalar(value)),
            "Sequence" => annotation.sequence = document::coerce_i32(key, scalar(value)),
            "Object" => annotation.object = document::coerce_i32(key, scalar(value)),
            "StageOffsetMicrons.mX" => stage_x = document::coerce_f64(key, scalar(value)),
            "StageOffsetMicrons.mY" => stage_y = document::coerce_f64(key, scalar(value)),
            "StageOffsetMicrons.mZ" => stage_z = document::coerce_f64(key, scalar(value)),
            "FieldOffset.mX" => field_x = document::coerce_f64(key, scalar(value)),
            "FieldOffset.mY" => field_y = document::coerce_f64(key, scalar(value)),
            "Vertices" => annotation.vertices = decode_vertices(key, value),
            _ => { /* decode_unknown: other flattened/dotted fields ignored */ }
        }
    }

    annotation.stage_offset = (stage_x, stage_y, stage_z);
    annotation.field_offset = (field_x, field_y);
    annotation
}

fn decode_vertices(field: &str, value: &Value) -> Vec<(f64, f64, f64)> {
    document::sequence_items(field, value)
        .iter()
        .map(|item| {
            let mut parts = item.splitn(3, ',');
            let x = parts.next().unwrap_or("0").trim().parse().unwrap_or(0.0);
            let y = parts.next().unwrap_or("0").trim().parse().unwrap_or(0.0);
            let z = parts.next().unwrap_or("0").trim().parse().unwrap_or(0.0);
            (x, y, z)
        })
        .collect()
}

/// Dense milliseconds-since-start sequence, length = #timepoints.
pub fn decode_elapsed_times(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(Vec<i64>, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "ElapsedTimes")?;
    let times = block
        .field("Times")
        .map(|value| document::coerce_i64_vec("Times", value))
        .unwrap_or_default();
    Ok((times, pos))
}

/// Per-(timepoint, position) vector of auxiliary integers.
pub fn decode_sa_positions(
    entries: &[document::Entry],
    mut pos: usize,
) -> Result<(Vec<Vec<i32>>, usize), SldyError> {
    let mut sa_positions = Vec::new();

    loop {
        match document::find_next_class(entries, pos).as_deref() {
            Some(("SAPosition", _)) => {
                let (block, new_pos) = document::expect_block(entries, pos, "SAPosition")?;
                let values = block
                    .field("Values")
                    .map(|value| document::coerce_i32_vec("Values", value))
                    .unwrap_or_default();
                sa_positions.push(values);
                pos = new_pos;
            }
            _ => break,
        }
    }

    Ok((sa_positions, pos))
}

/// Flattened (timepoint x position) stage coordinates. `#positions`
/// extraction happens in `capture.rs` (§4.6), not here — this decoder only
/// materialises the dense sequence.
pub fn decode_stage_positions(
    entries: &[document::Entry],
    pos: usize,
) -> Result<(Vec<(f64, f64, f64)>, usize), SldyError> {
    let (block, pos) = document::expect_block(entries, pos, "StagePositionData")?;
    let xs = block
        .field("X")
        .map(|v| document::coerce_f64_vec("X", v))
        .unwrap_or_default();
    let ys = block
        .field("Y")
        .map(|v| document::coerce_f64_vec("Y", v))
        .unwrap_or_default();
    let zs = block
        .field("Z")
        .map(|v| document::coerce_f64_vec("Z", v))
        .unwrap_or_default();

    let len = xs.len().max(ys.len()).max(zs.len());
    let mut positions = Vec::with_capacity(len);
    for i in 0..len {
        positions.push((
            xs.get(i).copied().unwrap_or(0.0),
            ys.get(i).copied().unwrap_or(0.0),
            zs.get(i).copied().unwrap_or(0.0),
        ));
    }

    Ok((positions, pos))
}

/// One auxiliary data table: an XML descriptor paired with a typed payload.
#[derive(Debug, Clone)]
pub struct AuxTable<T> {
    descriptor: String,
    values: T,
}

impl<T> AuxTable<T> {
    #[inline]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
    #[inline]
    pub fn values(&self) -> &T {
        &self.values
    }
}

/// The five homogeneous auxiliary table lists (§3 AuxData).
#[derive(Debug, Clone, Default)]
pub struct AuxData {
    float_tables: Vec<AuxTable<Vec<f32>>>,
    double_tables: Vec<AuxTable<Vec<f64>>>,
    int32_tables: Vec<AuxTable<Vec<i32>>>,
    int64_tables: Vec<AuxTable<Vec<i64>>>,
    xml_tables: Vec<AuxTable<String>>,
}

impl AuxData {
    #[inline]
    pub fn float_tables(&self) -> &[AuxTable<Vec<f32>>] {
        &self.float_tables
    }
    #[inline]
    pub fn double_tables(&self) -> &[AuxTable<Vec<f64>>] {
        &self.double_tables
    }
    #[inline]
    pub fn int32_tables(&self) -> &[AuxTable<Vec<i32>>] {
        &self.int32_tables
    }
    #[inline]
    pub fn int64_tables(&self) -> &[AuxTable<Vec<i64>>] {
        &self.int64_tables
    }
    #[inline]
    pub fn xml_tables(&self) -> &[AuxTable<String>] {
        &self.xml_tables
    }
}

pub fn decode_aux_data(
    entries: &[document::Entry],
    mut pos: usize,
) -> Result<(AuxData, usize), SldyError> {
    let mut aux = AuxData::default();

    loop {
        let class = document::find_next_class(entries, pos);
        let class_name = match class.as_deref() {
            Some((name, _)) => name.to_string(),
            None => break,
        };

        match class_name.as_str() {
            "AuxFloatTable" => {
                let (block, new_pos) = document::expect_block(entries, pos, &class_name)?;
                let descriptor = block
                    .field("Descriptor")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                let values = block
                    .field("Values")
                    .map(|v| {
                        document::sequence_items("Values", v)
                            .iter()
                            .map(|item| document::coerce_f32("Values", item))
                            .collect()
                    })
                    .unwrap_or_default();
                aux.float_tables.push(AuxTable { descriptor, values });
                pos = new_pos;
            }
            "AuxDoubleTable" => {
                let (block, new_pos) = document::expect_block(entries, pos, &class_name)?;
                let descriptor = block
                    .field("Descriptor")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                let values = block
                    .field("Values")
                    .map(|v| document::coerce_f64_vec("Values", v))
                    .unwrap_or_default();
                aux.double_tables.push(AuxTable { descriptor, values });
                pos = new_pos;
            }
            "AuxInt32Table" => {
                let (block, new_pos) = document::expect_block(entries, pos, &class_name)?;
                let descriptor = block
                    .field("Descriptor")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                let values = block
                    .field("Values")
                    .map(|v| document::coerce_i32_vec("Values", v))
                    .unwrap_or_default();
                aux.int32_tables.push(AuxTable { descriptor, values });
                pos = new_pos;
            }
            "AuxInt64Table" => {
                let (block, new_pos) = document::expect_block(entries, pos, &class_name)?;
                let descriptor = block
                    .field("Descriptor")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                let values = block
                    .field("Values")
                    .map(|v| document::coerce_i64_vec("Values", v))
                    .unwrap_or_default();
                aux.int64_tables.push(AuxTable { descriptor, values });
                pos = new_pos;
            }
            "AuxXmlTable" => {
                let (block, new_pos) = document::expect_block(entries, pos, &class_name)?;
                let descriptor = block
                    .field("Descriptor")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                let values = block
                    .field("Payload")
                    .map(|v| document::coerce_string(scalar(v)))
                    .unwrap_or_default();
                aux.xml_tables.push(AuxTable { descriptor, values });
                pos = new_pos;
            }
            _ => break,
        }
    }

    Ok((aux, pos))
}

fn scalar(value: &Value) -> &str {
    match value {
        Value::Scalar(s) => s,
        Value::Sequence(items) => items.last().map(String::as_str).unwrap_or(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tokenize;

    fn build_image_record_doc() -> String {
        "StartClass:\n  ClassName: ImageRecord\n  Width: 512\n  Height: 256\n  NumPlanes: 3\n  NumChannels: 2\n  NumTimepoints: 4\nEndClass:\nStartClass:\n  ClassName: LensDef\n  MicronPerPixel: 0.325\n  Name: 20x\nEndClass:\nStartClass:\n  ClassName: OptovarDef\n  Magnification: 1.5\nEndClass:\nStartClass:\n  ClassName: MainViewRecord\n  ObjectiveName: Plan-Apo\nEndClass:\n".to_string()
    }

    #[test]
    fn decodes_image_record_chain() {
        let text = build_image_record_doc();
        let entries = tokenize(&text);
        let (record, pos) = decode_image_record(&entries, 0).unwrap();
        assert_eq!(record.width(), 512);
        assert_eq!(record.height(), 256);
        assert_eq!(record.num_planes(), 3);
        assert_eq!(record.num_channels(), 2);
        assert_eq!(record.num_timepoints(), 4);
        assert!((record.lens().micron_per_pixel() - 0.325).abs() < 1e-9);
        assert!((record.optovar().magnification() - 1.5).abs() < 1e-9);
        assert_eq!(record.main_view().objective_name(), "Plan-Apo");
        assert_eq!(pos, entries.len());
    }

    #[test]
    fn rejects_invalid_dimensions() {
        let text = "StartClass:\n  ClassName: ImageRecord\n  Width: 0\n  Height: 256\n  NumPlanes: 1\n  NumChannels: 1\n  NumTimepoints: 1\nEndClass:\n";
        let entries = tokenize(text);
        assert!(decode_image_record(&entries, 0).is_err());
    }

    #[test]
    fn decodes_elapsed_times() {
        let text = "StartClass:\n  ClassName: ElapsedTimes\n  Times:\n    - 3\n    - 0\n    - 100\n    - 250\nEndClass:\n";
        let entries = tokenize(text);
        let (times, _) = decode_elapsed_times(&entries, 0).unwrap();
        assert_eq!(times, vec![0, 100, 250]);
    }

    #[test]
    fn decodes_stage_positions() {
        let text = "StartClass:\n  ClassName: StagePositionData\n  X:\n    - 2\n    - 1.0\n    - 2.0\n  Y:\n    - 2\n    - 1.0\n    - 1.0\n  Z:\n    - 2\n    - 0.0\n    - 0.0\nEndClass:\n";
        let entries = tokenize(text);
        let (positions, _) = decode_stage_positions(&entries, 0).unwrap();
        assert_eq!(positions, vec![(1.0, 1.0, 0.0), (2.0, 1.0, 0.0)]);
    }

    #[test]
    fn decodes_cube_annotation_rectangle_vertices() {
        let text = "StartClass:\n  ClassName: AnnotationTimepoint\nEndClass:\nStartClass:\n  ClassName: CubeAnnotation\n  GraphicType70: 2\n  Vertices:\n    - 2\n    - 10,20,0\n    - 110,220,0\nEndClass:\n";
        let entries = tokenize(text);
        let (annotations, _) = decode_annotations(&entries, 0).unwrap();
        let tp = &annotations.timepoints()[0];
        assert_eq!(tp.cube().len(), 1);
        assert_eq!(tp.cube()[0].graphic_type(), 2);
        assert_eq!(tp.cube()[0].vertices(), &[(10.0, 20.0, 0.0), (110.0, 220.0, 0.0)]);
    }
}
