//! Tile formats and per-family format support.

use std::fmt;
use std::str::FromStr;

use crate::error::MapError;
use crate::mapconfig::LayerType;

/// Output format of a tile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Png,
    Png32,
    /// UTFGrid interactivity grid.
    GridJson,
    /// Mapbox vector tile.
    Mvt,
    /// Time-series cube.
    TorqueJson,
}

impl TileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Png32 => "png32",
            Self::GridJson => "grid.json",
            Self::Mvt => "mvt",
            Self::TorqueJson => "json.torque",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png | Self::Png32 => "image/png",
            Self::GridJson | Self::TorqueJson => "application/json; charset=utf-8",
            Self::Mvt => "application/x-protobuf",
        }
    }

    /// Only raster image formats can be alpha-composited.
    pub fn is_blendable(&self) -> bool {
        matches!(self, Self::Png | Self::Png32)
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileFormat {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "png" => Ok(Self::Png),
            "png32" => Ok(Self::Png32),
            "grid.json" => Ok(Self::GridJson),
            "mvt" => Ok(Self::Mvt),
            "json.torque" | "torque.json" => Ok(Self::TorqueJson),
            other => Err(MapError::Config(format!("Unsupported format '{}'", other))),
        }
    }
}

/// Formats each renderer family can produce.
pub fn supported_formats(family: LayerType) -> &'static [TileFormat] {
    use TileFormat::*;
    match family {
        LayerType::RasterStyle => &[Png, Png32, GridJson, Mvt],
        LayerType::HttpBasemap => &[Png, Png32],
        LayerType::TimeSeries => &[Png, Png32, TorqueJson],
        LayerType::Plain => &[Png, Png32],
        LayerType::Vector => &[Mvt],
    }
}

pub fn supports(family: LayerType, format: TileFormat) -> bool {
    supported_formats(family).contains(&format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!("png".parse::<TileFormat>().unwrap(), TileFormat::Png);
        assert_eq!("grid.json".parse::<TileFormat>().unwrap(), TileFormat::GridJson);
        assert_eq!("torque.json".parse::<TileFormat>().unwrap(), TileFormat::TorqueJson);
        assert!(matches!("svg".parse::<TileFormat>(), Err(MapError::Config(_))));
    }

    #[test]
    fn test_family_support_matrix() {
        assert!(supports(LayerType::RasterStyle, TileFormat::GridJson));
        assert!(!supports(LayerType::HttpBasemap, TileFormat::GridJson));
        assert!(!supports(LayerType::Plain, TileFormat::Mvt));
        assert!(supports(LayerType::TimeSeries, TileFormat::TorqueJson));
        assert!(supports(LayerType::Vector, TileFormat::Mvt));
        assert!(!supports(LayerType::Vector, TileFormat::Png));
    }

    #[test]
    fn test_only_images_blend() {
        assert!(TileFormat::Png32.is_blendable());
        assert!(!TileFormat::GridJson.is_blendable());
        assert!(!TileFormat::Mvt.is_blendable());
    }
}
