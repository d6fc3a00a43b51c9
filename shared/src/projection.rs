use geo::{Coord, MapCoords, MultiPolygon};

/// Logical drawing area the map is laid out in, before it is fitted to the
/// actual canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

pub const MAP_WIDTH: f64 = 960.0;
pub const MAP_HEIGHT: f64 = 500.0;
/// The world's top edge sits under an empty band; the view box starts below it.
pub const MAP_TOP_INSET: f64 = 40.0;
const NATURAL_EARTH_SCALE: f64 = 150.0;

impl Default for MapViewBox {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: MAP_TOP_INSET,
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
        }
    }
}

/// Natural Earth I pseudo-cylindrical projection with a fixed scale and a
/// translate centred on the map area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    scale: f64,
    translate_x: f64,
    translate_y: f64,
}

impl Default for Projection {
    fn default() -> Self {
        Self::natural_earth(MAP_WIDTH, MAP_HEIGHT)
    }
}

impl Projection {
    pub fn natural_earth(width: f64, height: f64) -> Self {
        Self {
            scale: NATURAL_EARTH_SCALE,
            translate_x: width / 2.0,
            translate_y: height / 2.0,
        }
    }

    /// Map `(longitude, latitude)` in degrees to map-space `(x, y)`.
    ///
    /// Pure: identical input always yields identical output. Coordinates
    /// outside the valid range give an arbitrary position.
    pub fn project(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        let (x, y) = natural_earth_raw(longitude.to_radians(), latitude.to_radians());
        (
            self.translate_x + x * self.scale,
            self.translate_y - y * self.scale,
        )
    }

    /// Project a `(longitude, latitude)` outline into map space.
    pub fn project_shape(&self, shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        shape.map_coords(|Coord { x, y }| {
            let (x, y) = self.project(x, y);
            Coord { x, y }
        })
    }
}

/// Polynomial approximation by Šavrič, Jenny, Patterson et al.
fn natural_earth_raw(lambda: f64, phi: f64) -> (f64, f64) {
    let phi2 = phi * phi;
    let phi4 = phi2 * phi2;
    let x = lambda
        * (0.8707 - 0.131979 * phi2
            + phi4 * (-0.013791 + phi4 * (0.003971 * phi2 - 0.001529 * phi4)));
    let y = phi
        * (1.007226
            + phi2 * (0.015085 + phi4 * (-0.044475 + 0.028874 * phi2 - 0.005916 * phi4)));
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-6,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn origin_projects_to_map_centre() {
        let projection = Projection::default();
        let (x, y) = projection.project(0.0, 0.0);
        assert_close(x, 480.0);
        assert_close(y, 250.0);
    }

    #[test]
    fn projection_is_deterministic() {
        let projection = Projection::default();
        let first = projection.project(20.0, 10.0);
        for _ in 0..10 {
            assert_eq!(projection.project(20.0, 10.0), first);
        }
        assert_eq!(Projection::default().project(20.0, 10.0), first);
    }

    #[test]
    fn east_and_north_move_right_and_up() {
        let projection = Projection::default();
        let (x_east, _) = projection.project(90.0, 0.0);
        let (_, y_north) = projection.project(0.0, 45.0);
        assert!(x_east > 480.0);
        assert!(y_north < 250.0);
    }

    #[test]
    fn equator_is_linear_in_longitude() {
        let projection = Projection::default();
        let (x, _) = projection.project(180.0, 0.0);
        assert_close(x, 480.0 + std::f64::consts::PI * 0.8707 * 150.0);
    }

    #[test]
    fn symmetric_about_both_axes() {
        let projection = Projection::default();
        let (x1, y1) = projection.project(45.0, 30.0);
        let (x2, y2) = projection.project(-45.0, -30.0);
        assert_close(x1 - 480.0, 480.0 - x2);
        assert_close(y1 - 250.0, 250.0 - y2);
    }

    #[test]
    fn out_of_range_input_does_not_panic() {
        let projection = Projection::default();
        let (x, y) = projection.project(1_000.0, -400.0);
        assert!(x.is_finite());
        assert!(y.is_finite());
        let (nx, _) = projection.project(f64::NAN, 0.0);
        assert!(nx.is_nan());
    }

    #[test]
    fn shapes_project_every_vertex() {
        let projection = Projection::default();
        let shape: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let projected = projection.project_shape(&shape);
        let exterior = projected.0[0].exterior();
        assert_eq!(exterior.0.len(), 4);
        assert_eq!((exterior.0[0].x, exterior.0[0].y), projection.project(0.0, 0.0));
        assert_eq!((exterior.0[2].x, exterior.0[2].y), projection.project(10.0, 10.0));
    }

    #[test]
    fn whole_world_fits_the_default_view_box() {
        let projection = Projection::default();
        let view = MapViewBox::default();
        for &(lon, lat) in &[(-180.0, 0.0), (180.0, 0.0), (0.0, 90.0), (0.0, -90.0)] {
            let (x, y) = projection.project(lon, lat);
            assert!(x >= view.min_x && x <= view.min_x + view.width, "x={x}");
            assert!(y >= view.min_y - MAP_TOP_INSET && y <= view.min_y + view.height, "y={y}");
        }
    }
}
