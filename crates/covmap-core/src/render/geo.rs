use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson, Value};
use tracing::{debug, warn};

use crate::error::Result;

pub type Ring = Vec<(f64, f64)>;

/// FIPS-keyed boundary polygons. County features carry a 5-digit id, state
/// features a 2-digit id (or a `STATE`/`STATEFP` property).
#[derive(Debug, Default)]
pub struct ShapeTable {
    shapes: HashMap<String, Vec<Ring>>,
}

impl ShapeTable {
    pub fn from_geojson_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_geojson(&content)
    }

    pub fn from_geojson(content: &str) -> Result<Self> {
        let geojson: GeoJson = content.parse()?;
        let collection = FeatureCollection::try_from(geojson)?;

        let mut shapes: HashMap<String, Vec<Ring>> = HashMap::new();
        let mut skipped = 0usize;

        for feature in collection.features {
            let Some(key) = feature_key(&feature) else {
                skipped += 1;
                continue;
            };
            let Some(geometry) = feature.geometry.as_ref() else {
                skipped += 1;
                continue;
            };
            let rings = outer_rings(&geometry.value);
            if rings.is_empty() {
                skipped += 1;
                continue;
            }
            shapes.entry(key).or_default().extend(rings);
        }

        if skipped > 0 {
            warn!(skipped, "geojson features without id or geometry skipped");
        }
        debug!(shapes = shapes.len(), "shape table loaded");
        Ok(Self { shapes })
    }

    pub fn get(&self, fips: &str) -> Option<&Vec<Ring>> {
        self.shapes.get(fips)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

fn feature_key(feature: &geojson::Feature) -> Option<String> {
    if let Some(id) = feature.id.as_ref() {
        let raw = match id {
            geojson::feature::Id::String(value) => value.clone(),
            geojson::feature::Id::Number(value) => value.to_string(),
        };
        return Some(normalize_fips(raw));
    }

    for property in ["STATE", "STATEFP", "GEOID", "FIPS"] {
        if let Some(value) = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(property))
        {
            let raw = match value {
                serde_json::Value::String(text) => text.clone(),
                serde_json::Value::Number(number) => number.to_string(),
                _ => continue,
            };
            return Some(normalize_fips(raw));
        }
    }

    None
}

/// Numeric ids lose leading zeros; restore the 2- or 5-digit convention.
fn normalize_fips(raw: String) -> String {
    let trimmed = raw.trim();
    if !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return trimmed.to_string();
    }
    match trimmed.len() {
        1 => format!("0{trimmed}"),
        3 | 4 => format!("{:0>5}", trimmed),
        _ => trimmed.to_string(),
    }
}

fn outer_rings(value: &Value) -> Vec<Ring> {
    match value {
        Value::Polygon(rings) => rings
            .first()
            .map(|ring| vec![positions_to_ring(ring)])
            .unwrap_or_default(),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .filter_map(|rings| rings.first().map(|ring| positions_to_ring(ring)))
            .collect(),
        _ => Vec::new(),
    }
}

fn positions_to_ring(positions: &[Vec<f64>]) -> Ring {
    positions
        .iter()
        .filter_map(|position| match position.as_slice() {
            [lon, lat, ..] => Some((*lon, *lat)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod unit {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "25007",
                "properties": {"NAME": "Dukes"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-70.8, 41.3], [-70.5, 41.3], [-70.5, 41.5], [-70.8, 41.3]]]
                }
            },
            {
                "type": "Feature",
                "id": 1001,
                "properties": {},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[-86.9, 32.6], [-86.4, 32.6], [-86.4, 32.8], [-86.9, 32.6]]],
                        [[[-86.7, 32.3], [-86.6, 32.3], [-86.6, 32.4], [-86.7, 32.3]]]
                    ]
                }
            }
        ]
    }"#;

    #[test]
    fn loads_polygons_and_multipolygons() {
        let shapes = ShapeTable::from_geojson(SAMPLE).expect("sample parses");
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes.get("25007").map(Vec::len), Some(1));
        assert_eq!(shapes.get("01001").map(Vec::len), Some(2));
    }

    #[test]
    fn numeric_ids_are_zero_padded() {
        assert_eq!(normalize_fips("1001".to_string()), "01001");
        assert_eq!(normalize_fips("9".to_string()), "09");
        assert_eq!(normalize_fips("25007".to_string()), "25007");
    }
}
