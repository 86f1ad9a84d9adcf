//! Placing difference fields on a regular latitude/longitude raster.
//!
//! Map variables of unstructured (reduced Gaussian) grids come out of the
//! target dataset as a single cell axis with `lat`/`lon` coordinates per cell.
//! For display they are put onto a raster whose rows are the distinct cell
//! latitudes and whose columns are `2 × rows` evenly spaced longitudes over
//! `[0, 360]`, taking the nearest cell of the same latitude ring.

use crate::data::TargetDataset;
use crate::error::{CrosscheckError, Result};
use serde::{Deserialize, Serialize};

/// Dense difference grid handed to map renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceField {
    /// Number of rows (latitudes).
    pub rows: usize,
    /// Number of columns (longitudes).
    pub cols: usize,
    /// Latitude of each row.
    pub row_coords: Vec<f64>,
    /// Longitude of each column.
    pub col_coords: Vec<f64>,
    /// Row-major values, `rows × cols` long.
    pub values: Vec<f64>,
    /// Step token the difference was taken at.
    pub step: Option<i64>,
}

impl DifferenceField {
    /// Value at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }

    /// Largest finite magnitude in the field.
    pub fn max_abs(&self) -> f64 {
        self.values
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0, |acc, v| acc.max(v.abs()))
    }
}

/// Grid geometry of the target dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Regular grid: values are already `lat × lon`.
    Regular {
        /// Row latitudes.
        lats: Vec<f64>,
        /// Column longitudes.
        lons: Vec<f64>,
    },
    /// One latitude/longitude per cell.
    Unstructured {
        /// Cell latitudes.
        lats: Vec<f64>,
        /// Cell longitudes.
        lons: Vec<f64>,
    },
}

impl Geometry {
    /// Read the geometry from the dataset's `lat`/`lon` (or
    /// `latitude`/`longitude`) coordinates. `points` is the length of one
    /// horizontal field and decides between the two layouts.
    pub fn from_dataset(dataset: &dyn TargetDataset, points: usize) -> Result<Self> {
        let lats = first_coordinate(dataset, &["lat", "latitude"])?;
        let lons = first_coordinate(dataset, &["lon", "longitude"])?;
        match (lats, lons) {
            (Some(lats), Some(lons)) if lats.len() == points && lons.len() == points => {
                Ok(Self::Unstructured { lats, lons })
            }
            (Some(lats), Some(lons)) if lats.len() * lons.len() == points => {
                Ok(Self::Regular { lats, lons })
            }
            (Some(lats), Some(lons)) => Err(CrosscheckError::GridMismatch {
                variable: "lat/lon".to_string(),
                target: vec![lats.len(), lons.len()],
                check: vec![points],
            }),
            _ => Err(CrosscheckError::variable_missing("lat/lon", dataset.describe())),
        }
    }

    /// Put a flat difference field onto the display raster.
    pub fn rasterize(&self, values: &[f64], step: Option<i64>) -> DifferenceField {
        match self {
            Self::Regular { lats, lons } => DifferenceField {
                rows: lats.len(),
                cols: lons.len(),
                row_coords: lats.clone(),
                col_coords: lons.clone(),
                values: values.to_vec(),
                step,
            },
            Self::Unstructured { lats, lons } => nearest_on_rings(lats, lons, values, step),
        }
    }
}

fn first_coordinate(dataset: &dyn TargetDataset, names: &[&str]) -> Result<Option<Vec<f64>>> {
    for name in names {
        if let Some(values) = dataset.coordinate(name)? {
            return Ok(Some(values));
        }
    }
    Ok(None)
}

/// Cells of one latitude, sorted by longitude.
struct Ring {
    lat: f64,
    cells: Vec<(f64, usize)>,
}

fn nearest_on_rings(lats: &[f64], lons: &[f64], values: &[f64], step: Option<i64>) -> DifferenceField {
    let mut order: Vec<usize> = (0..lats.len()).collect();
    order.sort_by(|&a, &b| lats[a].total_cmp(&lats[b]));

    let mut rings: Vec<Ring> = Vec::new();
    for i in order {
        match rings.last_mut() {
            Some(ring) if ring.lat == lats[i] => ring.cells.push((lons[i].rem_euclid(360.0), i)),
            _ => rings.push(Ring {
                lat: lats[i],
                cells: vec![(lons[i].rem_euclid(360.0), i)],
            }),
        }
    }
    for ring in &mut rings {
        ring.cells.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    let rows = rings.len();
    let cols = 2 * rows;
    let col_coords = linspace(0.0, 360.0, cols);
    let mut out = Vec::with_capacity(rows * cols);
    for ring in &rings {
        for &lon in &col_coords {
            let cell = nearest_cell(&ring.cells, lon.rem_euclid(360.0));
            out.push(values.get(cell).copied().unwrap_or(f64::NAN));
        }
    }

    DifferenceField {
        rows,
        cols,
        row_coords: rings.iter().map(|r| r.lat).collect(),
        col_coords,
        values: out,
        step,
    }
}

/// Index of the cell closest to `lon`, wrapping around the date line.
fn nearest_cell(cells: &[(f64, usize)], lon: f64) -> usize {
    let upper = cells.partition_point(|c| c.0 < lon);
    let before = if upper == 0 { cells.len() - 1 } else { upper - 1 };
    let after = if upper == cells.len() { 0 } else { upper };
    if circular_distance(cells[after].0, lon) < circular_distance(cells[before].0, lon) {
        cells[after].1
    } else {
        cells[before].1
    }
}

fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
