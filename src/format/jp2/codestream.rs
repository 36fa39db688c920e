//! Codestream main-header parsing.
//!
//! Only the two marker segments needed for region planning are read:
//!
//! ```text
//! SIZ (0xFF51): Lsiz Rsiz Xsiz Ysiz XOsiz YOsiz XTsiz YTsiz XTOsiz YTOsiz Csiz {Ssiz XRsiz YRsiz}*
//! COD (0xFF52): Lcod Scod [progression layers(u16) mct] [levels ...]
//! ```
//!
//! Parsing stops at the first tile-part (SOT) marker.

use crate::error::Jp2Error;

// =============================================================================
// Markers
// =============================================================================

const MARKER_SOC: u16 = 0xFF4F;
const MARKER_SIZ: u16 = 0xFF51;
const MARKER_COD: u16 = 0xFF52;
const MARKER_SOT: u16 = 0xFF90;
const MARKER_SOD: u16 = 0xFF93;
const MARKER_EOC: u16 = 0xFFD9;

/// Smallest SIZ segment carrying one component (from Lsiz through YRsiz).
const MIN_SIZ_LEN: usize = 41;

/// Smallest COD segment (from Lcod through the decomposition level count).
const MIN_COD_LEN: usize = 8;

// =============================================================================
// CodestreamHeader
// =============================================================================

/// Image properties read from the codestream main header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodestreamHeader {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub bit_depth: u32,
    pub quality_layers: u32,
    pub levels: u32,
}

#[inline]
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse the main header of a raw codestream.
///
/// # Errors
/// - `MissingSoc` if the stream does not begin with SOC
/// - `Truncated` if a marker segment runs past the end of the data
/// - `MissingMarker` if SIZ or COD is absent
pub fn parse_main_header(codestream: &[u8]) -> Result<CodestreamHeader, Jp2Error> {
    if codestream.len() < 2 {
        return Err(Jp2Error::Truncated {
            offset: 0,
            needed: 2,
            available: codestream.len(),
        });
    }
    let soc = read_u16(codestream, 0);
    if soc != MARKER_SOC {
        return Err(Jp2Error::MissingSoc(soc));
    }

    let mut siz: Option<&[u8]> = None;
    let mut cod: Option<&[u8]> = None;
    let mut pos = 2;

    while pos + 2 <= codestream.len() {
        let marker = read_u16(codestream, pos);
        if matches!(marker, MARKER_SOT | MARKER_SOD | MARKER_EOC) {
            break;
        }
        // Delimiting markers without a length field
        if (0xFF30..=0xFF3F).contains(&marker) {
            pos += 2;
            continue;
        }
        if pos + 4 > codestream.len() {
            return Err(Jp2Error::Truncated {
                offset: pos,
                needed: 4,
                available: codestream.len() - pos,
            });
        }

        let len = read_u16(codestream, pos + 2) as usize;
        let start = pos + 2;
        let end = start + len;
        if len < 2 || end > codestream.len() {
            return Err(Jp2Error::Truncated {
                offset: start,
                needed: len.max(2),
                available: codestream.len() - start,
            });
        }

        let segment = &codestream[start..end];
        match marker {
            MARKER_SIZ => siz = Some(segment),
            MARKER_COD => cod = Some(segment),
            _ => {}
        }
        if siz.is_some() && cod.is_some() {
            break;
        }
        pos = end;
    }

    let siz = siz.ok_or(Jp2Error::MissingMarker("SIZ"))?;
    let cod = cod.ok_or(Jp2Error::MissingMarker("COD"))?;

    if siz.len() < MIN_SIZ_LEN {
        return Err(Jp2Error::Truncated {
            offset: 0,
            needed: MIN_SIZ_LEN,
            available: siz.len(),
        });
    }
    if cod.len() < MIN_COD_LEN {
        return Err(Jp2Error::Truncated {
            offset: 0,
            needed: MIN_COD_LEN,
            available: cod.len(),
        });
    }

    let xsiz = read_u32(siz, 4);
    let ysiz = read_u32(siz, 8);
    let xosiz = read_u32(siz, 12);
    let yosiz = read_u32(siz, 16);
    let components = read_u16(siz, 36) as u32;
    let bit_depth = (siz[38] & 0x7F) as u32 + 1;

    Ok(CodestreamHeader {
        width: xsiz.saturating_sub(xosiz),
        height: ysiz.saturating_sub(yosiz),
        components,
        bit_depth,
        quality_layers: read_u16(cod, 4) as u32,
        levels: cod[7] as u32,
    })
}
