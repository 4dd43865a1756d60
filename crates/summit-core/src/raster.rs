//! Raster window provider: the only place elevation I/O happens per request.
//!
//! [`DemRaster`] is a whole elevation raster held in memory, serialised as
//! JSON with `null` for no-data cells. [`DemSource`] pairs it with a
//! [`CoordinateReconciler`] and implements [`WindowProvider`].
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::{LatLon, METRES_PER_DEGREE, MIN_COS_LAT};
use crate::error::{Result, SummitError};
use crate::geotransform::GeoTransform;
use crate::reconcile::{CoordinateReconciler, Crs, NativeBounds, Reprojection};
use crate::window::{ElevationWindow, MIN_WINDOW_CELLS};

/// Source of request-scoped elevation windows.
pub trait WindowProvider: Sync {
    /// Reconciler for this source's native coordinates.
    fn reconciler(&self) -> &CoordinateReconciler;

    /// Read the window covering `radius_m` around `center`, clipped to the
    /// source extent. `NoData` when the clipped window is narrower than 3
    /// cells on either axis or holds no valid cell.
    fn read_window(&self, center: LatLon, radius_m: f64) -> Result<ElevationWindow>;
}

fn null_as_nan_vec<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Vec<f32>, D::Error> {
    let v: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
}

/// Whole elevation raster in memory, row-major, row 0 = north edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemRaster {
    pub width: usize,
    pub height: usize,
    /// Elevations in metres; NaN (`null` in JSON) marks no-data.
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub data: Vec<f32>,
    /// Additional no-data sentinel, compared exactly.
    #[serde(default)]
    pub nodata: Option<f32>,
    pub transform: GeoTransform,
    #[serde(default)]
    pub crs: Option<Crs>,
}

impl DemRaster {
    pub fn new(width: usize, height: usize, data: Vec<f32>, transform: GeoTransform, crs: Option<Crs>) -> Self {
        Self { width, height, data, nodata: None, transform, crs }
    }

    /// Load a raster from its JSON form.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let raster: DemRaster = serde_json::from_str(&text)?;
        if raster.data.len() != raster.width * raster.height {
            return Err(SummitError::InvalidInput(format!(
                "raster has {} values, expected {}x{}",
                raster.data.len(),
                raster.width,
                raster.height
            )));
        }
        Ok(raster)
    }

    #[inline]
    fn is_valid_value(&self, v: f32) -> bool {
        v.is_finite() && self.nodata.map_or(true, |nd| v != nd)
    }

    /// Read the cells covering `bounds`, clipped to the raster extent.
    ///
    /// `center_lat` sets the metric cell size of geographic rasters.
    pub fn read_bounds(&self, bounds: &NativeBounds, crs: Crs, center_lat: f64) -> Result<ElevationWindow> {
        // Top-left and bottom-right corners → fractional grid positions.
        let (ra, ca) = self.transform.invert(bounds.min_x, bounds.max_y).ok_or(SummitError::NoData)?;
        let (rb, cb) = self.transform.invert(bounds.max_x, bounds.min_y).ok_or(SummitError::NoData)?;
        let (ra, ca, rb, cb) = (ra.floor(), ca.floor(), rb.floor(), cb.floor());
        if ![ra, ca, rb, cb].iter().all(|v| v.is_finite()) {
            return Err(SummitError::NoData);
        }

        let row0 = ra.min(rb).max(0.0);
        let row1 = ra.max(rb).min(self.height as f64 - 1.0);
        let col0 = ca.min(cb).max(0.0);
        let col1 = ca.max(cb).min(self.width as f64 - 1.0);
        if row1 < row0 || col1 < col0 {
            debug!("window lies outside raster extent");
            return Err(SummitError::NoData);
        }
        let (row0, row1, col0, col1) = (row0 as usize, row1 as usize, col0 as usize, col1 as usize);
        let width = col1 - col0 + 1;
        let height = row1 - row0 + 1;
        if width < MIN_WINDOW_CELLS || height < MIN_WINDOW_CELLS {
            debug!(width, height, "clipped window is degenerate");
            return Err(SummitError::NoData);
        }

        let mut data = Vec::with_capacity(width * height);
        let mut valid = Vec::with_capacity(width * height);
        for r in row0..=row1 {
            let start = r * self.width + col0;
            for &v in &self.data[start..start + width] {
                valid.push(self.is_valid_value(v));
                data.push(v);
            }
        }
        if !valid.iter().any(|&v| v) {
            return Err(SummitError::NoData);
        }

        let cell_size_m = if crs.is_geographic() {
            self.transform.cell_size() * METRES_PER_DEGREE * center_lat.to_radians().cos().max(MIN_COS_LAT)
        } else {
            self.transform.cell_size()
        };

        ElevationWindow::new(data, valid, width, height, self.transform.window(row0, col0), crs, cell_size_m)
    }
}

/// In-memory raster plus its coordinate reconciler.
#[derive(Debug, Clone)]
pub struct DemSource {
    raster: DemRaster,
    reconciler: CoordinateReconciler,
}

impl DemSource {
    /// Uses the built-in reprojection table for projected rasters.
    pub fn new(raster: DemRaster) -> Result<Self> {
        let reconciler = CoordinateReconciler::for_crs(raster.crs)?;
        Ok(Self { raster, reconciler })
    }

    /// Projected raster whose EPSG code has no built-in reprojection.
    pub fn with_reprojection(raster: DemRaster, reprojection: Arc<dyn Reprojection>) -> Result<Self> {
        let reconciler = CoordinateReconciler::new(raster.crs, Some(reprojection))?;
        Ok(Self { raster, reconciler })
    }
}

impl WindowProvider for DemSource {
    fn reconciler(&self) -> &CoordinateReconciler {
        &self.reconciler
    }

    fn read_window(&self, center: LatLon, radius_m: f64) -> Result<ElevationWindow> {
        let bounds = self.reconciler.search_bounds(center, radius_m);
        self.raster.read_bounds(&bounds, self.reconciler.crs(), center.lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 100×100 geographic raster at 1 arc-second, NW corner at (40°N, 105°W).
    fn raster() -> DemRaster {
        let px = 1.0 / 3600.0;
        let data = (0..100 * 100).map(|i| (i % 100) as f32).collect();
        DemRaster::new(100, 100, data, GeoTransform::new(-105.0, 40.0, px, -px), Some(Crs::Geographic))
    }

    #[test]
    fn reads_window_around_center() {
        let src = DemSource::new(raster()).unwrap();
        let center = LatLon::new(40.0 - 50.5 / 3600.0, -105.0 + 50.5 / 3600.0);
        let w = src.read_window(center, 300.0).unwrap();
        // ±300 m ≈ ±9.7 arc-seconds of latitude.
        assert!(w.height() >= 19 && w.height() <= 21, "height {}", w.height());
        assert!(w.width() > w.height(), "longitude span widens with latitude");
        assert_relative_eq!(w.cell_size_m(), 111_320.0 / 3600.0 * center.lat.to_radians().cos(), epsilon = 1e-6);
    }

    #[test]
    fn window_is_clipped_at_edge() {
        let src = DemSource::new(raster()).unwrap();
        let corner = LatLon::new(40.0 - 0.5 / 3600.0, -105.0 + 0.5 / 3600.0);
        let w = src.read_window(corner, 300.0).unwrap();
        let (x, y) = w.transform().cell_center(0, 0);
        assert_relative_eq!(x, -105.0 + 0.5 / 3600.0, epsilon = 1e-12);
        assert_relative_eq!(y, 40.0 - 0.5 / 3600.0, epsilon = 1e-12);
    }

    #[test]
    fn outside_extent_is_no_data() {
        let src = DemSource::new(raster()).unwrap();
        let err = src.read_window(LatLon::new(10.0, 10.0), 200.0).unwrap_err();
        assert!(matches!(err, SummitError::NoData));
    }

    #[test]
    fn all_masked_is_no_data() {
        let mut r = raster();
        r.nodata = Some(-9999.0);
        r.data.iter_mut().for_each(|v| *v = -9999.0);
        let src = DemSource::new(r).unwrap();
        let center = LatLon::new(40.0 - 50.0 / 3600.0, -105.0 + 50.0 / 3600.0);
        assert!(matches!(src.read_window(center, 200.0), Err(SummitError::NoData)));
    }

    #[test]
    fn json_nulls_become_masked_cells() {
        let json = r#"{
            "width": 3, "height": 3,
            "data": [1, 2, 3, 4, null, 6, 7, 8, 9],
            "transform": {"origin_x": 0.0, "origin_y": 3.0, "pixel_width": 1.0, "pixel_height": -1.0},
            "crs": {"kind": "projected", "epsg": 3857}
        }"#;
        let r: DemRaster = serde_json::from_str(json).unwrap();
        assert!(r.data[4].is_nan());
        assert_eq!(r.crs, Some(Crs::Projected { epsg: 3857 }));
        let bounds = NativeBounds { min_x: 0.0, min_y: 0.0, max_x: 2.9, max_y: 2.9 };
        let w = r.read_bounds(&bounds, Crs::Projected { epsg: 3857 }, 0.0).unwrap();
        assert!(!w.is_valid(1, 1));
        assert_eq!(w.mask().iter().filter(|&&v| v).count(), 8);
        assert_eq!(w.cell_size_m(), 1.0);
    }

    #[test]
    fn missing_crs_fails_source_construction() {
        let mut r = raster();
        r.crs = None;
        assert!(matches!(DemSource::new(r), Err(SummitError::MissingCoordinateReferenceSystem)));
    }

    #[test]
    fn polar_cell_size_is_floored() {
        let px = 1.0 / 3600.0;
        let data = vec![1.0; 100 * 100];
        let r = DemRaster::new(100, 100, data, GeoTransform::new(0.0, 89.95, px, -px), Some(Crs::Geographic));
        let src = DemSource::new(r).unwrap();
        let w = src.read_window(LatLon::new(89.95 - 50.5 / 3600.0, 50.5 / 3600.0), 300.0).unwrap();
        assert_relative_eq!(w.cell_size_m(), 111_320.0 / 3600.0 * MIN_COS_LAT, epsilon = 1e-9);
        assert_relative_eq!(w.cell_height_m(), 111_320.0 / 3600.0, epsilon = 1e-9);
    }

    /// Equirectangular metres around a fixed origin.
    #[derive(Debug)]
    struct LocalMetres {
        origin: LatLon,
    }

    impl Reprojection for LocalMetres {
        fn to_native(&self, ll: LatLon) -> (f64, f64) {
            let k = METRES_PER_DEGREE * self.origin.lat.to_radians().cos();
            ((ll.lon - self.origin.lon) * k, (ll.lat - self.origin.lat) * METRES_PER_DEGREE)
        }

        fn to_geographic(&self, x: f64, y: f64) -> LatLon {
            let k = METRES_PER_DEGREE * self.origin.lat.to_radians().cos();
            LatLon::new(self.origin.lat + y / METRES_PER_DEGREE, self.origin.lon + x / k)
        }
    }

    #[test]
    fn custom_reprojection_reads_projected_window() {
        // 50×50 grid of 10 m cells centred on the projection origin, under a
        // code with no built-in transform.
        let data = (0..50 * 50).map(|i| (i / 50) as f32).collect();
        let crs = Some(Crs::Projected { epsg: 32632 });
        let r = DemRaster::new(50, 50, data, GeoTransform::new(-250.0, 250.0, 10.0, -10.0), crs);
        assert!(matches!(DemSource::new(r.clone()), Err(SummitError::MissingTransform { epsg: 32632 })));

        let origin = LatLon::new(45.0, 7.0);
        let src = DemSource::with_reprojection(r, Arc::new(LocalMetres { origin })).unwrap();
        let w = src.read_window(origin, 100.0).unwrap();
        assert_eq!((w.width(), w.height()), (21, 21));
        assert_eq!(w.cell_size_m(), 10.0);
        // Window row 0 is raster row 15.
        assert_eq!(w.value(0, 0), Some(15.0));

        let (row, col) = src.reconciler().latlon_to_cell(&w, origin).unwrap();
        assert_eq!((row, col), (10, 10));
        let back = src.reconciler().cell_to_latlon(&w, row, col);
        assert!(crate::coords::haversine_m(back, origin) < 10.0);
    }
}
