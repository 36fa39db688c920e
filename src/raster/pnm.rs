//! Portable anymap (PGM/PPM) parsing.
//!
//! Engines in out-of-process mode emit binary PNM:
//!
//! ```text
//! P5|P6 <ws> width <ws> height <ws> maxval <single ws> samples...
//! ```
//!
//! `#` starts a comment running to the end of the line. Samples are one byte
//! when maxval < 256 and two big-endian bytes otherwise.

use bytes::Bytes;

use crate::error::ExtractError;

use super::Raster;

struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.data.len() {
            match self.data[self.pos] {
                b'#' => {
                    while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
    }

    fn token(&mut self) -> Result<&'a str, ExtractError> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(ExtractError::InvalidRaster(
                "PNM header ended early".to_string(),
            ));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| ExtractError::InvalidRaster("PNM header is not ASCII".to_string()))
    }

    fn number(&mut self, what: &str) -> Result<u32, ExtractError> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| ExtractError::InvalidRaster(format!("bad PNM {}: '{}'", what, token)))
    }
}

/// Parse a binary PGM (P5) or PPM (P6) image into an 8-bit raster.
pub fn parse_pnm(data: &[u8]) -> Result<Raster, ExtractError> {
    let mut reader = HeaderReader { data, pos: 0 };

    let channels = match reader.token()? {
        "P5" => 1u8,
        "P6" => 3u8,
        other => {
            return Err(ExtractError::InvalidRaster(format!(
                "unsupported PNM magic '{}'",
                other
            )))
        }
    };
    let width = reader.number("width")?;
    let height = reader.number("height")?;
    let maxval = reader.number("maxval")?;
    if maxval == 0 || maxval > 65535 {
        return Err(ExtractError::InvalidRaster(format!(
            "PNM maxval {} out of range",
            maxval
        )));
    }

    // Exactly one whitespace byte separates the header from the samples
    if reader.pos >= data.len() {
        return Err(ExtractError::InvalidRaster(
            "PNM header not terminated".to_string(),
        ));
    }
    let data_start = reader.pos + 1;
    let bytes_per_sample = if maxval < 256 { 1 } else { 2 };
    let needed = super::sample_count(width, height, channels)
        .and_then(|samples| samples.checked_mul(bytes_per_sample))
        .ok_or_else(|| {
            ExtractError::InvalidRaster(format!("PNM dimensions {}x{} too large", width, height))
        })?;
    let available = data.len().saturating_sub(data_start);
    if available < needed {
        return Err(ExtractError::InvalidRaster(format!(
            "PNM pixel data truncated: need {} bytes, have {}",
            needed, available
        )));
    }
    let body = &data[data_start..data_start + needed];

    let pixels: Vec<u8> = if bytes_per_sample == 1 {
        if maxval == 255 {
            body.to_vec()
        } else {
            body.iter().map(|&v| scale_sample(v as u32, maxval)).collect()
        }
    } else {
        body.chunks_exact(2)
            .map(|pair| scale_sample(u16::from_be_bytes([pair[0], pair[1]]) as u32, maxval))
            .collect()
    };

    Raster::new(width, height, channels, Bytes::from(pixels))
}

fn scale_sample(value: u32, maxval: u32) -> u8 {
    ((value.min(maxval) * 255 + maxval / 2) / maxval) as u8
}
