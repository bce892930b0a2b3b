use serde::{Deserialize, Serialize};

use crate::coords::{BoundingBox, LatLon};

/// (row, column) of a climate grid cell; row 0 is the southernmost row.
pub type GridIndex = (usize, usize);

/// A regular lat/lon climate grid anchored at its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateGrid {
    pub lon_min: f64,
    pub lat_min: f64,
    /// Cell size in degrees.
    pub resol_deg: f64,
    pub nlons: usize,
    pub nlats: usize,
}

/// Inclusive index extents of the grid cells touching a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClimateIndices {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl ClimateIndices {
    pub fn contains(&self, (row, col): GridIndex) -> bool {
        (self.row_min..=self.row_max).contains(&row) && (self.col_min..=self.col_max).contains(&col)
    }

    pub fn len(&self) -> usize {
        (self.row_max - self.row_min + 1) * (self.col_max - self.col_min + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClimateGrid {
    pub fn lon_max(&self) -> f64 {
        self.lon_min + self.nlons as f64 * self.resol_deg
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_min + self.nlats as f64 * self.resol_deg
    }

    /// Coverage limits of the dataset.
    pub fn extent(&self) -> BoundingBox {
        BoundingBox {
            lon_ll: self.lon_min,
            lat_ll: self.lat_min,
            lon_ur: self.lon_max(),
            lat_ur: self.lat_max(),
        }
    }

    /// Grid cell containing `ll`, or `None` off the grid.
    /// The northern and eastern grid edges belong to the last row/column.
    pub fn cell_index(&self, ll: LatLon) -> Option<GridIndex> {
        if !self.extent().contains(ll) {
            return None;
        }
        let row = ((ll.lat - self.lat_min) / self.resol_deg).floor() as usize;
        let col = ((ll.lon - self.lon_min) / self.resol_deg).floor() as usize;
        Some((row.min(self.nlats - 1), col.min(self.nlons - 1)))
    }

    /// Index extents enclosing `bbox`, or `None` if any corner is off the grid.
    pub fn indices_for_bbox(&self, bbox: &BoundingBox) -> Option<ClimateIndices> {
        let (row_min, col_min) = self.cell_index(LatLon::new(bbox.lat_ll, bbox.lon_ll))?;
        let (row_max, col_max) = self.cell_index(LatLon::new(bbox.lat_ur, bbox.lon_ur))?;
        Some(ClimateIndices { row_min, row_max, col_min, col_max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ClimateGrid {
        ClimateGrid { lon_min: -10.0, lat_min: 40.0, resol_deg: 0.5, nlons: 60, nlats: 40 }
    }

    #[test]
    fn cell_index_edges() {
        let g = grid();
        assert_eq!(g.cell_index(LatLon::new(40.0, -10.0)), Some((0, 0)));
        assert_eq!(g.cell_index(LatLon::new(40.49, -9.51)), Some((0, 0)));
        assert_eq!(g.cell_index(LatLon::new(40.5, -9.5)), Some((1, 1)));
        assert_eq!(g.cell_index(LatLon::new(60.0, 20.0)), Some((39, 59)));
        assert_eq!(g.cell_index(LatLon::new(39.99, 0.0)), None);
    }

    #[test]
    fn bbox_indices_enclose_box() {
        let g = grid();
        let bbox = BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap();
        let idx = g.indices_for_bbox(&bbox).unwrap();
        assert_eq!((idx.row_min, idx.row_max), (20, 20));
        assert_eq!((idx.col_min, idx.col_max), (40, 41));
        assert_eq!(idx.len(), 2);
        assert!(idx.contains(g.cell_index(LatLon::new(50.1, 10.1)).unwrap()));
    }
}
