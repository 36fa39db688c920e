//! Header-dump parsing.
//!
//! The expand engine's `-record` output is one `key=value` line per
//! codestream parameter. Main-header keys are bare (`Clevels=5`); tile and
//! component overrides carry a `:T0C1` style suffix and are ignored.
//!
//! | key           | value             | field          |
//! |---------------|-------------------|----------------|
//! | `Ssize`       | `{height,width}`  | width, height  |
//! | `Clevels`     | integer           | levels         |
//! | `Sprecision`  | comma list        | bit depth (first component) |
//! | `Scomponents` | integer           | channels       |
//! | `Clayers`     | integer           | quality layers |

use crate::error::ExtractError;
use crate::format::ImageMetadata;

/// Parse a header dump into [`ImageMetadata`].
///
/// `Ssize` is required; other keys default to a single 8-bit component
/// with one quality layer and no decomposition levels.
pub fn parse_record(record: &str) -> Result<ImageMetadata, ExtractError> {
    let mut size: Option<(u32, u32)> = None;
    let mut metadata = ImageMetadata {
        width: 0,
        height: 0,
        levels: 0,
        bit_depth: 8,
        channels: 1,
        quality_layers: 1,
        compositing_layers: 1,
    };

    for line in record.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Ssize" => size = Some(parse_size(value)?),
            "Clevels" => metadata.levels = parse_number(key, value)?,
            "Sprecision" => {
                let first = value.split(',').next().unwrap_or(value);
                metadata.bit_depth = parse_number(key, first)?;
            }
            "Scomponents" => metadata.channels = parse_number(key, value)?,
            "Clayers" => metadata.quality_layers = parse_number(key, value)?,
            _ => {}
        }
    }

    let (height, width) =
        size.ok_or_else(|| ExtractError::invalid_format("engine record has no Ssize entry"))?;
    metadata.width = width;
    metadata.height = height;
    Ok(metadata)
}

/// `{height,width}`
fn parse_size(value: &str) -> Result<(u32, u32), ExtractError> {
    let inner = value.trim_start_matches('{').trim_end_matches('}');
    let (h, w) = inner
        .split_once(',')
        .ok_or_else(|| ExtractError::invalid_format(format!("bad Ssize value '{}'", value)))?;
    Ok((parse_number("Ssize", h)?, parse_number("Ssize", w)?))
}

fn parse_number(key: &str, value: &str) -> Result<u32, ExtractError> {
    value.trim().parse().map_err(|_| {
        ExtractError::invalid_format(format!("bad {} value '{}' in engine record", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = "\
Sprofile=PROFILE2
Ssize={1000,2000}
Sorigin={0,0}
Scomponents=3
Ssigned=no,no,no
Sprecision=8,8,8
Clayers=4
Clevels=5
Clevels:T0C1=3
";

    #[test]
    fn test_parse_record() {
        let meta = parse_record(RECORD).unwrap();
        assert_eq!(meta.width, 2000);
        assert_eq!(meta.height, 1000);
        assert_eq!(meta.levels, 5);
        assert_eq!(meta.bit_depth, 8);
        assert_eq!(meta.channels, 3);
        assert_eq!(meta.quality_layers, 4);
        assert_eq!(meta.compositing_layers, 1);
    }

    #[test]
    fn test_first_precision_wins() {
        let meta = parse_record("Ssize={10,10}\nSprecision=12,8").unwrap();
        assert_eq!(meta.bit_depth, 12);
    }

    #[test]
    fn test_missing_size() {
        assert!(matches!(
            parse_record("Clevels=5\n"),
            Err(ExtractError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_bad_number() {
        assert!(matches!(
            parse_record("Ssize={10,10}\nClevels=many\n"),
            Err(ExtractError::InvalidFormat { reason }) if reason.contains("Clevels")
        ));
    }
}
