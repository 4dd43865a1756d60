//! Coordinate reconciliation between caller (WGS84 lat/lon) and grid-native
//! coordinates.
//!
//! Geographic sources are a pass-through (native x = lon, y = lat). Projected
//! sources need a [`Reprojection`]; the reconciler refuses to exist without
//! one, so every later conversion is infallible.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coords::{degree_offsets, LatLon};
use crate::error::{Result, SummitError};
use crate::window::ElevationWindow;

/// Coordinate reference system identity of an elevation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Crs {
    /// Degrees of longitude / latitude.
    Geographic,
    /// Linear units (metres) in the given EPSG projection.
    Projected { epsg: u32 },
}

impl Crs {
    pub fn is_geographic(self) -> bool {
        matches!(self, Crs::Geographic)
    }
}

/// Opaque bidirectional transform between WGS84 and a projected CRS.
pub trait Reprojection: fmt::Debug + Send + Sync {
    /// WGS84 → native `(x, y)`.
    fn to_native(&self, ll: LatLon) -> (f64, f64);
    /// Native `(x, y)` → WGS84.
    fn to_geographic(&self, x: f64, y: f64) -> LatLon;
}

/// Spherical Web Mercator (EPSG:3857).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

impl Reprojection for WebMercator {
    fn to_native(&self, ll: LatLon) -> (f64, f64) {
        let x = WEB_MERCATOR_RADIUS * ll.lon.to_radians();
        let lat_rad = ll.lat.to_radians();
        let y = WEB_MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat_rad / 2.0).tan().ln();
        (x, y)
    }

    fn to_geographic(&self, x: f64, y: f64) -> LatLon {
        let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
        LatLon::new(lat, lon)
    }
}

/// Built-in reprojection for an EPSG code, if one exists.
pub fn reprojection_for(epsg: u32) -> Option<Arc<dyn Reprojection>> {
    match epsg {
        3857 | 900913 => Some(Arc::new(WebMercator)),
        _ => None,
    }
}

/// Axis-aligned box in native units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone)]
pub struct CoordinateReconciler {
    crs: Crs,
    reprojection: Option<Arc<dyn Reprojection>>,
}

impl CoordinateReconciler {
    /// Reconciler for a geographic source.
    pub fn geographic() -> Self {
        Self { crs: Crs::Geographic, reprojection: None }
    }

    /// Fails with `MissingCoordinateReferenceSystem` when `crs` is absent and
    /// with `MissingTransform` for a projected CRS without `reprojection`.
    pub fn new(crs: Option<Crs>, reprojection: Option<Arc<dyn Reprojection>>) -> Result<Self> {
        match crs {
            None => Err(SummitError::MissingCoordinateReferenceSystem),
            Some(Crs::Geographic) => Ok(Self::geographic()),
            Some(Crs::Projected { epsg }) => match reprojection {
                Some(reprojection) => Ok(Self { crs: Crs::Projected { epsg }, reprojection: Some(reprojection) }),
                None => Err(SummitError::MissingTransform { epsg }),
            },
        }
    }

    /// Like [`CoordinateReconciler::new`], using the built-in reprojection table.
    pub fn for_crs(crs: Option<Crs>) -> Result<Self> {
        let reprojection = match crs {
            Some(Crs::Projected { epsg }) => reprojection_for(epsg),
            _ => None,
        };
        Self::new(crs, reprojection)
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn to_native(&self, ll: LatLon) -> (f64, f64) {
        match &self.reprojection {
            Some(p) => p.to_native(ll),
            None => (ll.lon, ll.lat),
        }
    }

    pub fn to_geographic(&self, x: f64, y: f64) -> LatLon {
        match &self.reprojection {
            Some(p) => p.to_geographic(x, y),
            None => LatLon::new(y, x),
        }
    }

    /// Native bounding box covering `radius_m` around `center`.
    pub fn search_bounds(&self, center: LatLon, radius_m: f64) -> NativeBounds {
        let (x, y) = self.to_native(center);
        let (dx, dy) = if self.crs.is_geographic() {
            let (dlat, dlon) = degree_offsets(center.lat, radius_m);
            (dlon, dlat)
        } else {
            (radius_m, radius_m)
        };
        NativeBounds { min_x: x - dx, min_y: y - dy, max_x: x + dx, max_y: y + dy }
    }

    /// WGS84 position of the centre of a window cell.
    pub fn cell_to_latlon(&self, window: &ElevationWindow, row: usize, col: usize) -> LatLon {
        let (x, y) = window.transform().cell_center(row, col);
        self.to_geographic(x, y)
    }

    /// Window cell containing `ll`, `None` when it falls outside the window.
    pub fn latlon_to_cell(&self, window: &ElevationWindow, ll: LatLon) -> Option<(usize, usize)> {
        let (x, y) = self.to_native(ll);
        let (row_f, col_f) = window.transform().invert(x, y)?;
        let (row, col) = (row_f.floor(), col_f.floor());
        if !row.is_finite() || !col.is_finite() || row < 0.0 || col < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row >= window.height() || col >= window.width() {
            return None;
        }
        Some((row, col))
    }
}
