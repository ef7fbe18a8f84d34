//! End-to-end scenarios driving the public reader surface against
//! synthetic `.sldy`/`.dir` fixture trees.

use std::fs;
use std::io::Write;
use std::path::Path;

use sldy::Slide;

fn write_minimal_documents(group_dir: &Path, num_channels: i32, num_timepoints: i32) {
    let image_record = format!(
        "StartClass:\n  ClassName: ImageRecord\n  Width: 2\n  Height: 2\n  NumPlanes: 1\n  NumChannels: {}\n  NumTimepoints: {}\nEndClass:\nStartClass:\n  ClassName: LensDef\n  MicronPerPixel: 0.5\n  Name: 10x\nEndClass:\nStartClass:\n  ClassName: OptovarDef\n  Magnification: 1.0\nEndClass:\nStartClass:\n  ClassName: MainViewRecord\n  ObjectiveName: Test\nEndClass:\n",
        num_channels, num_timepoints
    );
    fs::write(group_dir.join("ImageRecord.yaml"), image_record).unwrap();
    fs::write(group_dir.join("ChannelRecord.yaml"), "").unwrap();
    fs::write(group_dir.join("MaskRecord.yaml"), "").unwrap();
    fs::write(group_dir.join("AnnotationRecord.yaml"), "").unwrap();

    let elapsed = format!(
        "StartClass:\n  ClassName: ElapsedTimes\n  Times:\n    - {0}\n{1}EndClass:\n",
        num_timepoints,
        (0..num_timepoints)
            .map(|t| format!("    - {}\n", t * 100))
            .collect::<String>()
    );
    fs::write(group_dir.join("ElapsedTimes.yaml"), elapsed).unwrap();
    fs::write(group_dir.join("SAPositionData.yaml"), "").unwrap();
    fs::write(
        group_dir.join("StagePositionData.yaml"),
        "StartClass:\n  ClassName: StagePositionData\n  X:\n    - 1\n    - 0.0\n  Y:\n    - 1\n    - 0.0\n  Z:\n    - 1\n    - 0.0\nEndClass:\n",
    )
    .unwrap();
    fs::write(group_dir.join("AuxData.yaml"), "").unwrap();
}

fn build_npy_header(descr: &str, shape: &str, algorithm_tag: u8) -> (Vec<u8>, usize) {
    let header_text = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}), }}\n",
        descr, shape
    );
    let header_bytes = header_text.into_bytes();

    let mut prefix = Vec::new();
    prefix.extend_from_slice(b"\x93NUMPY");
    prefix.push(1);
    prefix.push(algorithm_tag);
    prefix.extend_from_slice(&(header_bytes.len() as u16).to_le_bytes());

    let header_len = prefix.len() + header_bytes.len();
    let mut out = prefix;
    out.extend_from_slice(&header_bytes);
    (out, header_len)
}

/// S2: same layout as S1 but the plane is Zstd-compressed with a single
/// block dictionary entry.
#[test]
fn s2_zstd_compressed_plane_decompresses_to_expected_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("demo.dir");
    let group_dir = root.join("cap.imgdir");
    fs::create_dir_all(&group_dir).unwrap();

    write_minimal_documents(&group_dir, 1, 1);

    let plane: Vec<u8> = (0u8..8).collect();
    let compressed = zstd::stream::encode_all(&plane[..], 0).unwrap();

    let (mut npy_bytes, _header_len) = build_npy_header("<u2", "2, 2", 1);
    // single block dictionary entry: block 0's offset field is unused, length=compressed.len()
    npy_bytes.extend_from_slice(&0u64.to_le_bytes());
    npy_bytes.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
    npy_bytes.extend_from_slice(&compressed);

    let mut file = fs::File::create(group_dir.join("ImageData_Ch0_TP0000000.npy")).unwrap();
    file.write_all(&npy_bytes).unwrap();
    drop(file);

    let slide_path = dir.path().join("demo.sldy");
    fs::write(&slide_path, b"sentinel").unwrap();

    let mut slide = Slide::open(&slide_path).unwrap();
    let mut buf = [0u8; 8];
    slide.read_plane(0, 0, 0, 0, 0, &mut buf).unwrap();
    assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
}

/// S3: two single-plane channel files, each with a leading shape dimension
/// of 5, establishes the SFMT layout with `#timepoints = 5`.
#[test]
fn s3_sfmt_layout_detected_from_leading_shape_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("demo.dir");
    let group_dir = root.join("cap.imgdir");
    fs::create_dir_all(&group_dir).unwrap();

    // ImageRecord declares 1 plane, 2 channels; actual per-channel
    // timepoint count (5) is only discoverable from the NPY shape.
    write_minimal_documents(&group_dir, 2, 1);

    for channel in 0..2 {
        let plane_size = 2 * 2 * 2; // 2x2 u16
        let total = plane_size * 5;
        let (mut npy_bytes, _) = build_npy_header("<u2", "5, 2, 2", 0);
        npy_bytes.extend(std::iter::repeat(0u8).take(total));

        let mut file = fs::File::create(
            group_dir.join(format!("ImageData_Ch{}_TP0000000.npy", channel)),
        )
        .unwrap();
        file.write_all(&npy_bytes).unwrap();
    }

    let slide_path = dir.path().join("demo.sldy");
    fs::write(&slide_path, b"sentinel").unwrap();

    let slide = Slide::open(&slide_path).unwrap();
    let dims = slide.dimensions(0).unwrap();
    assert_eq!(dims.num_timepoints, 5);
}

/// An unreadable/missing group must not prevent the slide from opening
/// when at least one other group is valid.
#[test]
fn invalid_group_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("demo.dir");
    fs::create_dir_all(root.join("broken.imgdir")).unwrap();
    fs::write(root.join("broken.imgdir").join("ImageRecord.yaml"), "garbage").unwrap();
    fs::write(
        root.join("broken.imgdir").join("dummy.npy"),
        b"not a real npy file",
    )
    .unwrap();

    let good_dir = root.join("good.imgdir");
    fs::create_dir_all(&good_dir).unwrap();
    write_minimal_documents(&good_dir, 1, 1);
    let (npy_bytes, _) = build_npy_header("<u2", "2, 2", 0);
    let mut npy_bytes = npy_bytes;
    npy_bytes.extend_from_slice(&[0u8; 8]);
    fs::write(good_dir.join("ImageData_Ch0_TP0000000.npy"), npy_bytes).unwrap();

    let slide_path = dir.path().join("demo.sldy");
    fs::write(&slide_path, b"sentinel").unwrap();

    let slide = Slide::open(&slide_path).unwrap();
    assert_eq!(slide.num_captures(), 1);
}
