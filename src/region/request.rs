//! Region request parsing and validation.
//!
//! A region is written as four comma-separated coordinates, optionally
//! grouped in braces: `top,left,height,width` or `{top,left},{height,width}`.
//! A coordinate containing a decimal point is a fraction of the image; any
//! other coordinate is an absolute pixel value.

use std::fmt;
use std::str::FromStr;

use crate::error::RegionError;

// =============================================================================
// Coordinate
// =============================================================================

/// One region coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    /// Fraction of the image dimension, in 0..=1
    Fraction(f64),

    /// Absolute pixel value
    Pixels(u64),
}

impl Coordinate {
    fn parse(token: &str, region: &str) -> Result<Self, RegionError> {
        let malformed = || RegionError::MalformedToken {
            region: region.to_string(),
            token: token.to_string(),
        };

        if token.contains('.') {
            let value: f64 = token.parse().map_err(|_| malformed())?;
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RegionError::FractionOutOfRange {
                    region: region.to_string(),
                    value,
                });
            }
            Ok(Coordinate::Fraction(value))
        } else {
            token
                .parse::<u64>()
                .map(Coordinate::Pixels)
                .map_err(|_| malformed())
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Keep the decimal point so the value re-parses as a fraction
            Coordinate::Fraction(v) => write!(f, "{:?}", v),
            Coordinate::Pixels(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Region
// =============================================================================

/// A rectangular crop request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub top: Coordinate,
    pub left: Coordinate,
    pub height: Coordinate,
    pub width: Coordinate,
}

impl FromStr for Region {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s
            .split(|c| c == '{' || c == '}' || c == ',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() != 4 {
            return Err(RegionError::WrongTokenCount {
                region: s.to_string(),
                count: tokens.len(),
            });
        }

        Ok(Region {
            top: Coordinate::parse(tokens[0], s)?,
            left: Coordinate::parse(tokens[1], s)?,
            height: Coordinate::parse(tokens[2], s)?,
            width: Coordinate::parse(tokens[3], s)?,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{},{}}},{{{},{}}}",
            self.top, self.left, self.height, self.width
        )
    }
}

// =============================================================================
// Rotation
// =============================================================================

/// Quarter-turn rotation applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = RegionError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(RegionError::UnsupportedRotation(other)),
        }
    }
}

// =============================================================================
// DecodeRequest
// =============================================================================

/// Everything a caller can ask of a single decode.
///
/// Resolution is chosen by, in order of precedence: `level`, `fit`, `reduce`.
/// With none of them set the image is decoded at full resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeRequest {
    /// Crop rectangle; `None` decodes the whole image
    pub region: Option<Region>,

    /// Target resolution level (0 = smallest)
    pub level: Option<u32>,

    /// Explicit number of decomposition levels to discard
    pub reduce: Option<u32>,

    /// Output bounding box used to pick a level when `level` is unset
    pub fit: Option<(u32, u32)>,

    pub rotation: Rotation,

    /// Compositing layer index (0 = default layer)
    pub layer: u32,
}

impl DecodeRequest {
    /// Full image, full resolution, no rotation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse request parameters as they arrive from a query string or CLI.
    ///
    /// All validation happens here so malformed input never reaches an engine.
    pub fn parse(
        region: Option<&str>,
        level: Option<&str>,
        reduce: Option<&str>,
        rotate: Option<&str>,
        layer: Option<&str>,
    ) -> Result<Self, RegionError> {
        let region = region
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Region::from_str)
            .transpose()?;
        let level = parse_param("level", level)?;
        let reduce = parse_param("reduce", reduce)?;
        let rotation = match parse_param("rotate", rotate)? {
            Some(degrees) => Rotation::try_from(degrees)?,
            None => Rotation::None,
        };
        let layer = parse_param("layer", layer)?.unwrap_or(0);

        Ok(Self {
            region,
            level,
            reduce,
            fit: None,
            rotation,
            layer,
        })
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_reduce(mut self, reduce: u32) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn with_fit(mut self, width: u32, height: u32) -> Self {
        self.fit = Some((width, height));
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    /// Whether geometry resolution needs probed image metadata.
    pub fn needs_metadata(&self) -> bool {
        self.region.is_some() || self.level.is_some() || self.fit.is_some()
    }
}

fn parse_param(name: &'static str, value: Option<&str>) -> Result<Option<u32>, RegionError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| RegionError::InvalidParameter {
                name,
                value: v.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pixel_region() {
        let region: Region = "100,50,200,300".parse().unwrap();
        assert_eq!(region.top, Coordinate::Pixels(100));
        assert_eq!(region.left, Coordinate::Pixels(50));
        assert_eq!(region.height, Coordinate::Pixels(200));
        assert_eq!(region.width, Coordinate::Pixels(300));
    }

    #[test]
    fn test_parse_braced_mixed_region() {
        let region: Region = "{0.25,10},{0.5,300}".parse().unwrap();
        assert_eq!(region.top, Coordinate::Fraction(0.25));
        assert_eq!(region.left, Coordinate::Pixels(10));
        assert_eq!(region.height, Coordinate::Fraction(0.5));
        assert_eq!(region.width, Coordinate::Pixels(300));
    }

    #[test]
    fn test_display_round_trips() {
        let region: Region = "{0.5,10},{1.0,300}".parse().unwrap();
        assert_eq!(region.to_string(), "{0.5,10},{1.0,300}");
        assert_eq!(region.to_string().parse::<Region>().unwrap(), region);
    }

    #[test]
    fn test_malformed_token() {
        let err = "10,abc,20,30".parse::<Region>().unwrap_err();
        assert_eq!(
            err,
            RegionError::MalformedToken {
                region: "10,abc,20,30".to_string(),
                token: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_negative_pixel_is_malformed() {
        assert!(matches!(
            "-10,0,20,30".parse::<Region>(),
            Err(RegionError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_wrong_token_count() {
        assert!(matches!(
            "10,20,30".parse::<Region>(),
            Err(RegionError::WrongTokenCount { count: 3, .. })
        ));
        assert!(matches!(
            "1,2,3,4,5".parse::<Region>(),
            Err(RegionError::WrongTokenCount { count: 5, .. })
        ));
    }

    #[test]
    fn test_fraction_out_of_range() {
        assert!(matches!(
            "0.1,0.1,1.5,0.2".parse::<Region>(),
            Err(RegionError::FractionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rotation() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::try_from(270).unwrap().degrees(), 270);
        assert_eq!(
            Rotation::try_from(45),
            Err(RegionError::UnsupportedRotation(45))
        );
    }

    #[test]
    fn test_request_parse() {
        let req =
            DecodeRequest::parse(Some("0,0,256,256"), Some("3"), None, Some("180"), Some("2"))
                .unwrap();
        assert!(req.region.is_some());
        assert_eq!(req.level, Some(3));
        assert_eq!(req.reduce, None);
        assert_eq!(req.rotation, Rotation::Deg180);
        assert_eq!(req.layer, 2);
        assert!(req.needs_metadata());
    }

    #[test]
    fn test_request_parse_rejects_bad_values() {
        assert!(matches!(
            DecodeRequest::parse(None, Some("-1"), None, None, None),
            Err(RegionError::InvalidParameter { name: "level", .. })
        ));
        assert!(matches!(
            DecodeRequest::parse(None, None, None, Some("33"), None),
            Err(RegionError::UnsupportedRotation(33))
        ));
        assert!(matches!(
            DecodeRequest::parse(None, None, None, None, Some("x")),
            Err(RegionError::InvalidParameter { name: "layer", .. })
        ));
    }

    #[test]
    fn test_plain_reduce_needs_no_metadata() {
        let req = DecodeRequest::new().with_reduce(2);
        assert!(!req.needs_metadata());
        let req = DecodeRequest::parse(Some("  "), None, Some("1"), None, None).unwrap();
        assert!(req.region.is_none());
        assert!(!req.needs_metadata());
    }
}
