//! NumPy array ("NPY") pixel-plane header and block-dictionary parsing
//! (§4.3), in the byteorder seek/read_exact style used elsewhere in this
//! crate for binary chunk formats.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::SldyError;

/// Element type recognised in the `descr` field of an NPY header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    U16,
    I16,
    U32,
    I32,
}

impl DType {
    /// Bytes occupied by one pixel of this type.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 => 4,
        }
    }

    /// Whether the type is signed, needed for the pixel-type fact (§4.7).
    pub fn is_signed(self) -> bool {
        matches!(self, DType::I16 | DType::I32)
    }

    fn parse(descr: &str) -> Result<DType, SldyError> {
        // descr looks like "<u2", ">i4", etc; the endianness character is
        // validated by the caller against the file's own byte order.
        let dtype = descr.trim_start_matches(['<', '>', '=', '|']);
        match dtype {
            "u2" => Ok(DType::U16),
            "i2" => Ok(DType::I16),
            "u4" => Ok(DType::U32),
            "i4" => Ok(DType::I32),
            other => Err(SldyError::format(format!("unsupported NPY dtype: {}", other))),
        }
    }
}

/// One `(offset, length)` entry in the block dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub offset: u64,
    pub length: u64,
}

/// A fully parsed NPY header plus, if the file is compressed, its block
/// dictionary.
#[derive(Debug, Clone)]
pub struct NpyHeader {
    major_version: u8,
    /// Minor version doubles as the compression algorithm tag (§4.4).
    algorithm_tag: u8,
    header_len: u16,
    dtype: DType,
    little_endian: bool,
    fortran_order: bool,
    shape: Vec<u64>,
    blocks: Vec<BlockEntry>,
    /// Byte offset where pixel data (or the block dictionary) begins.
    data_start: u64,
}

impl NpyHeader {
    #[inline]
    pub fn major_version(&self) -> u8 {
        self.major_version
    }
    #[inline]
    pub fn algorithm_tag(&self) -> u8 {
        self.algorithm_tag
    }
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.algorithm_tag != 0
    }
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }
    #[inline]
    pub fn little_endian(&self) -> bool {
        self.little_endian
    }
    #[inline]
    pub fn fortran_order(&self) -> bool {
        self.fortran_order
    }
    #[inline]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }
    #[inline]
    pub fn blocks(&self) -> &[BlockEntry] {
        &self.blocks
    }
    /// Byte offset where pixel data begins for an uncompressed file (or the
    /// implicit position of block 0 for a compressed one).
    #[inline]
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// `width * height * bytes_per_pixel`, the size of exactly one plane.
    pub fn plane_size(&self) -> Result<usize, SldyError> {
        let dims = self.shape.len();
        if dims < 2 {
            return Err(SldyError::format("NPY shape has fewer than 2 dimensions"));
        }
        let height = self.shape[dims - 2] as usize;
        let width = self.shape[dims - 1] as usize;
        Ok(width * height * self.dtype.bytes_per_pixel())
    }

    /// Byte position where the data for block `k` begins (§4.3: "first
    /// block's data position is the end of the dictionary; the k-th block's
    /// data position equals offset[k-1] + length[k-1]").
    fn block_data_position(&self, k: usize) -> Result<u64, SldyError> {
        if k == 0 {
            return Ok(self.data_start);
        }
        let previous = self.blocks.get(k - 1).ok_or_else(|| {
            SldyError::format(format!(
                "block {} out of range: header has {} blocks",
                k,
                self.blocks.len()
            ))
        })?;
        Ok(previous.offset + previous.length)
    }

    /// Length in bytes of block `k`'s compressed payload.
    pub fn block_length(&self, k: usize) -> Result<u64, SldyError> {
        self.blocks.get(k).map(|block| block.length).ok_or_else(|| {
            SldyError::format(format!(
                "block {} out of range: header has {} blocks",
                k,
                self.blocks.len()
            ))
        })
    }
}

/// Parses the 10-byte prefix, textual header body and (if compressed) the
/// following block dictionary from `reader`, which must be positioned at
/// the start of the NPY file.
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<NpyHeader, SldyError> {
    let mut prefix = [0u8; 10];
    reader.read_exact(&mut prefix)?;

    if &prefix[0..6] != b"\x93NUMPY" {
        return Err(SldyError::format("missing NPY magic prefix"));
    }

    let major_version = prefix[6];
    let algorithm_tag = prefix[7];
    let header_len = u16::from_le_bytes([prefix[8], prefix[9]]);

    let mut header_bytes = vec![0u8; header_len as usize];
    reader.read_exact(&mut header_bytes)?;
    let header_text = String::from_utf8_lossy(&header_bytes);

    if !header_text.contains('\n') {
        return Err(SldyError::format("NPY header missing terminating newline"));
    }

    let descr = extract_literal(&header_text, "descr")
        .ok_or_else(|| SldyError::format("NPY header missing descr"))?;
    let little_endian = !descr.contains('>');
    let dtype = DType::parse(&descr)?;

    let fortran_order = extract_literal(&header_text, "fortran_order")
        .map(|v| v.trim() == "True")
        .unwrap_or(false);

    let shape = extract_shape(&header_text)
        .ok_or_else(|| SldyError::format("NPY header missing shape"))?;

    let data_start_of_header = 10 + header_len as u64;

    let (blocks, data_start) = if algorithm_tag == 0 {
        (Vec::new(), data_start_of_header)
    } else {
        let num_blocks = if shape.len() == 3 {
            shape[0] as usize
        } else {
            1
        };

        let mut blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let offset = reader.read_u64::<LittleEndian>()?;
            let length = reader.read_u64::<LittleEndian>()?;
            blocks.push(BlockEntry { offset, length });
        }

        let dict_end = data_start_of_header + (num_blocks as u64) * 16;
        (blocks, dict_end)
    };

    Ok(NpyHeader {
        major_version,
        algorithm_tag,
        header_len,
        dtype,
        little_endian,
        fortran_order,
        shape,
        blocks,
        data_start,
    })
}

/// Seeks to and reads the raw (still compressed, if applicable) bytes of
/// block `k`.
pub fn read_block_bytes<R: Read + Seek>(
    reader: &mut R,
    header: &NpyHeader,
    k: usize,
) -> Result<Vec<u8>, SldyError> {
    let position = header.block_data_position(k)?;
    let length = if header.is_compressed() {
        header.block_length(k)?
    } else {
        header.plane_size()? as u64
    };

    reader.seek(SeekFrom::Start(position))?;
    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Extracts a `'key': value` literal from the textual NPY header dict,
/// stopping at the first top-level comma or closing brace.
fn extract_literal(header_text: &str, key: &str) -> Option<String> {
    let needle = format!("'{}'", key);
    let idx = header_text.find(&needle)?;
    let after_key = &header_text[idx + needle.len()..];
    let colon = after_key.find(':')?;
    let value_start = &after_key[colon + 1..];
    let value_start = value_start.trim_start();

    if let Some(rest) = value_start.strip_prefix('\'') {
        let end = rest.find('\'')?;
        return Some(rest[..end].to_string());
    }

    let end = value_start
        .find(|c| c == ',' || c == '}')
        .unwrap_or(value_start.len());
    Some(value_start[..end].trim().to_string())
}

fn extract_shape(header_text: &str) -> Option<Vec<u64>> {
    let idx = header_text.find("'shape'")?;
    let after_key = &header_text[idx..];
    let paren_start = after_key.find('(')?;
    let paren_end = after_key.find(')')?;
    let inner = &after_key[paren_start + 1..paren_end];

    let shape: Vec<u64> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .collect();

    if shape.is_empty() {
        None
    } else {
        Some(shape)
    }
}
