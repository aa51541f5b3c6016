pub mod colors;
pub mod geo;

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
pub use colors::ColorRamp;
pub use geo::{Ring, ShapeTable};

// continental-US frame; geometries wholly outside (AK, HI, territories)
// are not drawn
const LON_MIN: f64 = -125.0;
const LON_MAX: f64 = -66.0;
const LAT_MIN: f64 = 24.0;
const LAT_MAX: f64 = 50.0;

const MAP_SIZE: (u32, u32) = (1400, 900);
const LEGEND_WIDTH: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapFormat {
    Svg,
    Png,
}

impl MapFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MapFormat::Svg => "svg",
            MapFormat::Png => "png",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("svg") => Ok(MapFormat::Svg),
            Some("png") => Ok(MapFormat::Png),
            other => Err(PipelineError::Processing(format!(
                "unsupported map output extension {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct PlotSpec {
    pub title: String,
    pub legend_label: String,
    pub zmin: f64,
    pub zmax: f64,
    pub ramp: &'static ColorRamp,
}

/// County case-spread map: cases per 100 people on a viridis ramp scaled to
/// the data.
pub fn county_cases_map(
    df: &DataFrame,
    shapes: &ShapeTable,
    as_of: NaiveDate,
    out: &Path,
) -> Result<()> {
    let values = value_map(df, "fips", "cases_to_pop")?;
    let (zmin, zmax) = data_domain(&values);
    let spec = PlotSpec {
        title: format!("Covid-19 case spread as of {}", as_of.format("%m-%d-%Y")),
        legend_label: "Cases per 100 people".to_string(),
        zmin,
        zmax,
        ramp: ColorRamp::viridis(),
    };
    render_map(&values, shapes, &spec, out)
}

/// County mortality map: deaths per 100 people on the hand-tuned ramp with
/// a fixed 0.0..0.75 domain.
pub fn county_mortality_map(
    df: &DataFrame,
    shapes: &ShapeTable,
    as_of: NaiveDate,
    out: &Path,
) -> Result<()> {
    let values = value_map(df, "fips", "deaths_to_pop")?;
    let spec = PlotSpec {
        title: format!(
            "Covid-19 local mortality (data from JHU) as of {}",
            as_of.format("%m-%d-%Y")
        ),
        legend_label: "Fatalities per 100 people".to_string(),
        zmin: 0.0,
        zmax: 0.75,
        ramp: ColorRamp::mortality(),
    };
    render_map(&values, shapes, &spec, out)
}

/// Trailing-stats case-rate map over the NYT snapshot.
pub fn nyt_case_rate_map(
    df: &DataFrame,
    shapes: &ShapeTable,
    as_of: NaiveDate,
    out: &Path,
) -> Result<()> {
    let values = value_map(df, "fips", "case_rate")?;
    let (zmin, zmax) = data_domain(&values);
    let spec = PlotSpec {
        title: format!("covid impact as of {}", as_of.format("%m-%d-%Y")),
        legend_label: "Case rate".to_string(),
        zmin,
        zmax,
        ramp: ColorRamp::viridis(),
    };
    render_map(&values, shapes, &spec, out)
}

/// State-level deaths map with the fixed 54..15000 domain.
pub fn state_deaths_map(
    df: &DataFrame,
    shapes: &ShapeTable,
    as_of: NaiveDate,
    out: &Path,
) -> Result<()> {
    let values = value_map(df, "fips", "deaths")?;
    let spec = PlotSpec {
        title: format!("covid impact by State thru {}", as_of.format("%m-%d-%Y")),
        legend_label: "Deaths".to_string(),
        zmin: 54.0,
        zmax: 15000.0,
        ramp: ColorRamp::viridis(),
    };
    render_map(&values, shapes, &spec, out)
}

/// Render one choropleth; the backend is chosen from the output extension.
pub fn render_map(
    values: &HashMap<String, Option<f64>>,
    shapes: &ShapeTable,
    spec: &PlotSpec,
    out: &Path,
) -> Result<()> {
    match MapFormat::from_path(out)? {
        MapFormat::Svg => {
            let root = SVGBackend::new(out, MAP_SIZE).into_drawing_area();
            draw_map(&root, values, shapes, spec)?;
            root.present().map_err(draw_err)?;
        }
        MapFormat::Png => {
            let root = BitMapBackend::new(out, MAP_SIZE).into_drawing_area();
            draw_map(&root, values, shapes, spec)?;
            root.present().map_err(draw_err)?;
        }
    }
    info!(out = %out.display(), title = spec.title.as_str(), "map rendered");
    Ok(())
}

fn draw_map<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    values: &HashMap<String, Option<f64>>,
    shapes: &ShapeTable,
    spec: &PlotSpec,
) -> Result<()> {
    root.fill(&WHITE).map_err(draw_err)?;
    let titled = root
        .titled(&spec.title, ("sans-serif", 26))
        .map_err(draw_err)?;
    let (width, _) = titled.dim_in_pixel();
    let (map_area, legend_area) = titled.split_horizontally(width - LEGEND_WIDTH);

    let (map_w, map_h) = map_area.dim_in_pixel();
    let project = |lon: f64, lat: f64| -> (i32, i32) {
        let x = (lon - LON_MIN) / (LON_MAX - LON_MIN) * map_w as f64;
        let y = (LAT_MAX - lat) / (LAT_MAX - LAT_MIN) * map_h as f64;
        (x.round() as i32, y.round() as i32)
    };

    let span = spec.zmax - spec.zmin;
    let mut missing_shapes = 0usize;
    let mut outside_frame = 0usize;

    for (fips, value) in values {
        let Some(rings) = shapes.get(fips) else {
            missing_shapes += 1;
            continue;
        };

        let color = match value {
            Some(value) if span > 0.0 => {
                let t = ((value - spec.zmin) / span).clamp(0.0, 1.0);
                let (r, g, b) = spec.ramp.sample(t);
                RGBColor(r, g, b)
            }
            Some(_) => {
                let (r, g, b) = spec.ramp.sample(0.0);
                RGBColor(r, g, b)
            }
            None => RGBColor(224, 224, 224),
        };

        for ring in rings {
            if ring.iter().all(|(lon, lat)| {
                *lon < LON_MIN || *lon > LON_MAX || *lat < LAT_MIN || *lat > LAT_MAX
            }) {
                outside_frame += 1;
                continue;
            }
            let points: Vec<(i32, i32)> =
                ring.iter().map(|(lon, lat)| project(*lon, *lat)).collect();
            map_area
                .draw(&Polygon::new(points.clone(), color.filled()))
                .map_err(draw_err)?;
            map_area
                .draw(&PathElement::new(points, RGBColor(140, 140, 140)))
                .map_err(draw_err)?;
        }
    }

    if missing_shapes > 0 {
        warn!(missing_shapes, "data rows without a boundary shape");
    }
    if outside_frame > 0 {
        info!(outside_frame, "rings outside the map frame skipped");
    }

    map_area
        .draw(&Text::new(
            spec.legend_label.clone(),
            (10, map_h as i32 - 24),
            ("sans-serif", 18),
        ))
        .map_err(draw_err)?;

    draw_legend(&legend_area, spec)?;
    Ok(())
}

fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    spec: &PlotSpec,
) -> Result<()> {
    let (_, height) = area.dim_in_pixel();
    let bar_top = 40i32;
    let bar_bottom = height as i32 - 40;
    let bar_height = (bar_bottom - bar_top).max(1);
    let steps = 64;

    for step in 0..steps {
        let t_high = 1.0 - step as f64 / steps as f64;
        let y0 = bar_top + (step * bar_height) / steps;
        let y1 = bar_top + ((step + 1) * bar_height) / steps;
        let (r, g, b) = spec.ramp.sample(t_high);
        area.draw(&Rectangle::new(
            [(16, y0), (44, y1)],
            RGBColor(r, g, b).filled(),
        ))
        .map_err(draw_err)?;
    }

    area.draw(&Text::new(
        format!("{:.2}", spec.zmax),
        (8, bar_top - 20),
        ("sans-serif", 14),
    ))
    .map_err(draw_err)?;
    area.draw(&Text::new(
        format!("{:.2}", spec.zmin),
        (8, bar_bottom + 6),
        ("sans-serif", 14),
    ))
    .map_err(draw_err)?;

    Ok(())
}

fn value_map(df: &DataFrame, key: &str, value: &str) -> Result<HashMap<String, Option<f64>>> {
    let keys = df.column(key)?.str()?;
    let cast = df.column(value)?.cast(&DataType::Float64)?;
    let values = cast.f64()?;

    let mut map = HashMap::with_capacity(df.height());
    for idx in 0..df.height() {
        if let Some(code) = keys.get(idx) {
            map.insert(code.to_string(), values.get(idx));
        }
    }
    Ok(map)
}

fn data_domain(values: &HashMap<String, Option<f64>>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values.values().flatten() {
        min = min.min(*value);
        max = max.max(*value);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min, min + 1.0);
    }
    (min, max)
}

fn draw_err<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Processing(format!("map rendering failed: {err}"))
}
