//! Image and tile rendering requests.

use serde::{Serialize, Serializer};

/// Tile coordinate in a map-style pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column (0-indexed from left)
    pub x: u32,

    /// Row (0-indexed from top)
    pub y: u32,

    /// Zoom level
    pub z: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Build a tile coordinate from optional parts.
    ///
    /// Returns `None` (a whole-array request) unless all three parts are
    /// present and non-zero. A zero coordinate counts as absent, so
    /// `/tiles/{resource}/0/0/0` renders the whole array.
    pub fn from_parts(x: Option<u32>, y: Option<u32>, z: Option<u32>) -> Option<Self> {
        match (x, y, z) {
            (Some(x), Some(y), Some(z)) if x != 0 && y != 0 && z != 0 => Some(Self { x, y, z }),
            _ => None,
        }
    }
}

// The engine expects the tile as an `[x, y, z]` triple.
impl Serialize for TileCoord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y, self.z).serialize(serializer)
    }
}

/// Parameters for rendering an array (or one tile of its pyramid) to PNG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    /// Array resource path in the engine's catalog
    pub resource: String,

    /// Tile to render; `None` renders the whole array
    pub tile: Option<TileCoord>,

    /// Color map name
    pub colormap: Option<String>,

    /// Scenario identifier (e.g. "ssp585")
    pub scenario_id: Option<String>,

    /// Year of the scenario
    pub year: i32,

    /// Access groups; always the single resolved access tier
    pub group_ids: Vec<String>,

    /// Upper bound of the color scale (unbounded if absent)
    pub max_value: Option<f64>,

    /// Lower bound of the color scale (unbounded if absent)
    pub min_value: Option<f64>,
}

impl ImageRequest {
    /// Create a whole-array request with no optional parameters.
    pub fn new(resource: impl Into<String>, year: i32, access: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            tile: None,
            colormap: None,
            scenario_id: None,
            year,
            group_ids: vec![access.into()],
            max_value: None,
            min_value: None,
        }
    }

    pub fn with_tile(mut self, tile: Option<TileCoord>) -> Self {
        self.tile = tile;
        self
    }

    pub fn with_colormap(mut self, colormap: Option<String>) -> Self {
        self.colormap = colormap;
        self
    }

    pub fn with_scenario(mut self, scenario_id: Option<String>) -> Self {
        self.scenario_id = scenario_id;
        self
    }

    pub fn with_value_range(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    pub fn is_tiled(&self) -> bool {
        self.tile.is_some()
    }
}
