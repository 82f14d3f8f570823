//! Renderer options parsed from request parameters.

use std::fmt;
use std::str::FromStr;

use super::format::TileFormat;
use crate::error::MapError;
use crate::mapconfig::RequestParams;

/// Which layers of a configuration a tile request renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayerSelection {
    /// Every layer able to produce the requested format.
    #[default]
    All,
    /// Explicit layer indices, in request order. Each must support the format.
    Indices(Vec<usize>),
}

impl FromStr for LayerSelection {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "all" {
            return Ok(Self::All);
        }
        s.split(',')
            .map(|part| {
                part.trim().parse::<usize>().map_err(|_| {
                    MapError::Validation(format!("Invalid layer index '{}'", part.trim()))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Indices)
    }
}

impl fmt::Display for LayerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Indices(indices) => {
                let parts: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// Format and layer selection of a tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererOptions {
    pub format: TileFormat,
    pub layers: LayerSelection,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            format: TileFormat::Png,
            layers: LayerSelection::All,
        }
    }
}

impl RendererOptions {
    pub fn new(format: TileFormat, layers: LayerSelection) -> Self {
        Self { format, layers }
    }

    /// Reads `format` (default `png`) and `layer` (default `all`).
    pub fn from_params(params: &RequestParams) -> Result<Self, MapError> {
        let format = match params.get("format") {
            Some(f) => f.parse()?,
            None => TileFormat::Png,
        };
        let layers = match params.get("layer") {
            Some(l) => l.parse()?,
            None => LayerSelection::All,
        };
        Ok(Self { format, layers })
    }

    /// Writes the options back into request parameters, so they take part
    /// in pool keys.
    pub fn apply_to(&self, params: &mut RequestParams) {
        params.insert("format".to_string(), self.format.to_string());
        params.insert("layer".to_string(), self.layers.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_selection_parsing() {
        assert_eq!("all".parse::<LayerSelection>().unwrap(), LayerSelection::All);
        assert_eq!(
            "0, 2".parse::<LayerSelection>().unwrap(),
            LayerSelection::Indices(vec![0, 2])
        );
        assert!(matches!(
            "0,a".parse::<LayerSelection>(),
            Err(MapError::Validation(_))
        ));
    }

    #[test]
    fn test_options_from_params() {
        let mut params = RequestParams::new();
        params.insert("format".into(), "grid.json".into());
        params.insert("layer".into(), "1".into());

        let options = RendererOptions::from_params(&params).unwrap();
        assert_eq!(options.format, TileFormat::GridJson);
        assert_eq!(options.layers, LayerSelection::Indices(vec![1]));

        let defaults = RendererOptions::from_params(&RequestParams::new()).unwrap();
        assert_eq!(defaults, RendererOptions::default());
    }

    #[test]
    fn test_apply_to_round_trips_selection() {
        let options = RendererOptions::new(TileFormat::Png32, LayerSelection::Indices(vec![0, 3]));
        let mut params = RequestParams::new();
        options.apply_to(&mut params);
        assert_eq!(params.get("layer").map(String::as_str), Some("0,3"));
        assert_eq!(RendererOptions::from_params(&params).unwrap(), options);
    }
}
