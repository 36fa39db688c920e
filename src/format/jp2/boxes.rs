//! JP2 box walking.
//!
//! A JP2-family file is a sequence of boxes:
//!
//! ```text
//! Bytes 0-3: LBox (u32 BE) - total box length, 0 = to end of file, 1 = XLBox follows
//! Bytes 4-7: TBox - four-character box type
//! Bytes 8-15: XLBox (u64 BE) - only when LBox == 1
//! ```
//!
//! Only the top level is walked here. Superboxes such as `jp2h` are exposed
//! as opaque payloads and can be walked again with [`BoxIter::new`].

use bytes::Bytes;

use crate::error::Jp2Error;

// =============================================================================
// Box Types
// =============================================================================

/// Four-character box type.
pub type BoxType = [u8; 4];

/// Signature box
pub const BOX_SIGNATURE: BoxType = *b"jP  ";

/// File type box
pub const BOX_FILE_TYPE: BoxType = *b"ftyp";

/// JP2 header superbox
pub const BOX_JP2_HEADER: BoxType = *b"jp2h";

/// Contiguous codestream box
pub const BOX_CODESTREAM: BoxType = *b"jp2c";

/// XML box
pub const BOX_XML: BoxType = *b"xml ";

/// JPX compositing layer header superbox
pub const BOX_COMPOSITING_LAYER: BoxType = *b"jplh";

const BOX_HEADER_SIZE: usize = 8;
const BOX_EXTENDED_HEADER_SIZE: usize = 16;

// =============================================================================
// Box Iterator
// =============================================================================

/// A box found in a JP2 byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jp2Box<'a> {
    /// Four-character type
    pub box_type: BoxType,

    /// Offset of the box header within the walked buffer
    pub offset: usize,

    /// Box contents, excluding the header
    pub payload: &'a [u8],
}

/// Iterator over consecutive boxes in a buffer.
///
/// Yields an error once and then stops if a box header is malformed.
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<Jp2Box<'a>, Jp2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        match parse_box(self.data, self.pos) {
            Ok((jp2_box, next)) => {
                self.pos = next;
                Some(Ok(jp2_box))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Parse the box starting at `offset`, returning it and the offset of the next box.
fn parse_box(data: &[u8], offset: usize) -> Result<(Jp2Box<'_>, usize), Jp2Error> {
    let remaining = data.len() - offset;
    if remaining < BOX_HEADER_SIZE {
        return Err(Jp2Error::Truncated {
            offset,
            needed: BOX_HEADER_SIZE,
            available: remaining,
        });
    }

    let lbox = u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]);
    let mut box_type = [0u8; 4];
    box_type.copy_from_slice(&data[offset + 4..offset + 8]);

    let (header_len, total_len) = match lbox {
        0 => (BOX_HEADER_SIZE, remaining as u64),
        1 => {
            if remaining < BOX_EXTENDED_HEADER_SIZE {
                return Err(Jp2Error::Truncated {
                    offset,
                    needed: BOX_EXTENDED_HEADER_SIZE,
                    available: remaining,
                });
            }
            let mut xl = [0u8; 8];
            xl.copy_from_slice(&data[offset + 8..offset + 16]);
            (BOX_EXTENDED_HEADER_SIZE, u64::from_be_bytes(xl))
        }
        n => (BOX_HEADER_SIZE, n as u64),
    };

    if total_len < header_len as u64 {
        return Err(Jp2Error::InvalidBoxLength {
            offset,
            length: total_len,
        });
    }
    if total_len > remaining as u64 {
        return Err(Jp2Error::Truncated {
            offset,
            needed: total_len.min(usize::MAX as u64) as usize,
            available: remaining,
        });
    }

    let end = offset + total_len as usize;
    Ok((
        Jp2Box {
            box_type,
            offset,
            payload: &data[offset + header_len..end],
        },
        end,
    ))
}

// =============================================================================
// Queries
// =============================================================================

/// Collect the payloads of all top-level XML boxes, in file order.
pub fn xml_boxes(data: &Bytes) -> Result<Vec<Bytes>, Jp2Error> {
    let mut found = Vec::new();
    for jp2_box in BoxIter::new(data) {
        let jp2_box = jp2_box?;
        if jp2_box.box_type == BOX_XML {
            found.push(data.slice_ref(jp2_box.payload));
        }
    }
    Ok(found)
}

/// Locate the first contiguous codestream box.
pub fn find_codestream(data: &[u8]) -> Result<&[u8], Jp2Error> {
    for jp2_box in BoxIter::new(data) {
        let jp2_box = jp2_box?;
        if jp2_box.box_type == BOX_CODESTREAM {
            return Ok(jp2_box.payload);
        }
    }
    Err(Jp2Error::MissingCodestream)
}

/// Count top-level compositing layer header boxes.
///
/// Plain JP2 files have none and still render one layer, so the result is at least 1.
pub fn count_compositing_layers(data: &[u8]) -> Result<u32, Jp2Error> {
    let mut count = 0u32;
    for jp2_box in BoxIter::new(data) {
        if jp2_box?.box_type == BOX_COMPOSITING_LAYER {
            count += 1;
        }
    }
    Ok(count.max(1))
}
