//! EXIF handling for the keep-metadata option.
//!
//! The EXIF block is read from the source container and re-attached to the
//! encoded output with `img-parts` (JPEG, PNG and WebP containers). Pixels are
//! auto-oriented before encoding, so the Orientation tag of the re-attached
//! block is rewritten to 1 (top-left).

use crate::error::OptimizeError;
use img_parts::{Bytes, DynImage, ImageEXIF};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const TAG_ORIENTATION: u16 = 0x0112;
const ORIENTATION_TOP_LEFT: u16 = 1;

/// Raw EXIF block of an encoded image, if the container carries one
pub fn read_exif(encoded: &[u8]) -> Option<Bytes> {
    let image = DynImage::from_bytes(Bytes::copy_from_slice(encoded)).ok()??;
    image.exif().filter(|exif| !exif.is_empty())
}

/// Attach `exif` to an encoded image, replacing any block it already has
pub fn embed_exif(encoded: &[u8], exif: Bytes) -> Result<Vec<u8>, OptimizeError> {
    let mut image = DynImage::from_bytes(Bytes::copy_from_slice(encoded))
        .map_err(|e| OptimizeError::Metadata(format!("cannot parse encoded image: {}", e)))?
        .ok_or_else(|| OptimizeError::Metadata("container does not support EXIF".to_string()))?;

    image.set_exif(Some(exif));

    let mut output = Vec::new();
    image
        .encoder()
        .write_to(&mut output)
        .map_err(|e| OptimizeError::Metadata(format!("cannot write EXIF: {}", e)))?;
    Ok(output)
}

/// Copy of `exif` with the IFD0 Orientation tag set to top-left.
///
/// Blocks that cannot be parsed, or carry no Orientation tag, are returned unchanged.
pub fn reset_orientation(exif: &[u8]) -> Bytes {
    let mut data = exif.to_vec();
    let offset = if data.starts_with(EXIF_PREFIX) { EXIF_PREFIX.len() } else { 0 };
    if let Some(tiff) = data.get_mut(offset..) {
        let _ = set_orientation(tiff, ORIENTATION_TOP_LEFT);
    }
    Bytes::from(data)
}

/// Rewrite the Orientation entry of IFD0 in a TIFF structure
fn set_orientation(tiff: &mut [u8], value: u16) -> Option<()> {
    let little_endian = match tiff.get(0..2)? {
        b"II" => true,
        b"MM" => false,
        _ => return None,
    };

    let read_u16 = |data: &[u8], at: usize| -> Option<u16> {
        let bytes: [u8; 2] = data.get(at..at + 2)?.try_into().ok()?;
        Some(if little_endian {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    };
    let read_u32 = |data: &[u8], at: usize| -> Option<u32> {
        let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
        Some(if little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    };

    let ifd = read_u32(tiff, 4)? as usize;
    let entries = read_u16(tiff, ifd)? as usize;

    for index in 0..entries {
        let entry = ifd + 2 + index * 12;
        if read_u16(tiff, entry)? == TAG_ORIENTATION {
            // SHORT value, stored left-aligned in the 4-byte value field
            let encoded = if little_endian {
                value.to_le_bytes()
            } else {
                value.to_be_bytes()
            };
            tiff.get_mut(entry + 8..entry + 10)?.copy_from_slice(&encoded);
            return Some(());
        }
    }
    None
}
