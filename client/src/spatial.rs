use geo::{BoundingRect, Contains, Intersects, MultiPolygon, Point, Rect};

const GRID_COLS: usize = 48;
const GRID_ROWS: usize = 24;

/// Projected country outline, in map-space coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryShape {
    pub name: String,
    pub shape: MultiPolygon<f64>,
    pub bounds: Option<Rect<f64>>,
}

impl CountryShape {
    pub fn new(name: String, shape: MultiPolygon<f64>) -> Self {
        let bounds = shape.bounding_rect();
        Self { name, shape, bounds }
    }

    /// Interior rings are holes, so points inside them are outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        self.bounds.is_some_and(|rect| rect.intersects(&point)) && self.shape.contains(&point)
    }
}

/// Bounding-box bucket grid over the projected countries for hover hit-testing.
/// Rebuilt only when the base map loads.
pub struct CountryGrid {
    cells: Vec<Vec<usize>>,
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
}

impl CountryGrid {
    pub fn build(shapes: &[CountryShape]) -> Self {
        let usable: Vec<(usize, Rect<f64>)> = shapes
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.bounds.map(|rect| (idx, rect)))
            .collect();
        if usable.is_empty() {
            return Self {
                cells: Vec::new(),
                min_x: 0.0,
                min_y: 0.0,
                cell_w: 1.0,
                cell_h: 1.0,
            };
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (_, rect) in &usable {
            min_x = min_x.min(rect.min().x);
            min_y = min_y.min(rect.min().y);
            max_x = max_x.max(rect.max().x);
            max_y = max_y.max(rect.max().y);
        }
        min_x -= 1.0;
        min_y -= 1.0;
        max_x += 1.0;
        max_y += 1.0;

        let cell_w = (max_x - min_x) / GRID_COLS as f64;
        let cell_h = (max_y - min_y) / GRID_ROWS as f64;
        let mut cells = vec![Vec::new(); GRID_COLS * GRID_ROWS];

        for (idx, rect) in usable {
            let (l, t, r, b) = (rect.min().x, rect.min().y, rect.max().x, rect.max().y);
            let col_start = ((l - min_x) / cell_w).floor().max(0.0) as usize;
            let col_end = ((r - min_x) / cell_w).ceil().min(GRID_COLS as f64) as usize;
            let row_start = ((t - min_y) / cell_h).floor().max(0.0) as usize;
            let row_end = ((b - min_y) / cell_h).ceil().min(GRID_ROWS as f64) as usize;
            for row in row_start..row_end.max(row_start + 1).min(GRID_ROWS) {
                for col in col_start..col_end.max(col_start + 1).min(GRID_COLS) {
                    cells[row * GRID_COLS + col].push(idx);
                }
            }
        }

        Self {
            cells,
            min_x,
            min_y,
            cell_w,
            cell_h,
        }
    }

    /// Index into the shapes the grid was built from of the country under
    /// the map-space point.
    pub fn find_at(&self, shapes: &[CountryShape], x: f64, y: f64) -> Option<usize> {
        if self.cells.is_empty() {
            return None;
        }
        let col = ((x - self.min_x) / self.cell_w).floor() as isize;
        let row = ((y - self.min_y) / self.cell_h).floor() as isize;
        if col < 0 || row < 0 || col >= GRID_COLS as isize || row >= GRID_ROWS as isize {
            return None;
        }
        self.cells[row as usize * GRID_COLS + col as usize]
            .iter()
            .copied()
            .find(|&idx| shapes.get(idx).is_some_and(|s| s.contains(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    fn ring(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(points.to_vec())
    }

    fn square_ring(x: f64, y: f64, size: f64) -> LineString<f64> {
        ring(&[(x, y), (x + size, y), (x + size, y + size), (x, y + size), (x, y)])
    }

    fn square(name: &str, x: f64, y: f64, size: f64) -> CountryShape {
        CountryShape::new(
            name.to_string(),
            Polygon::new(square_ring(x, y, size), vec![]).into(),
        )
    }

    #[test]
    fn finds_country_under_point() {
        let shapes = vec![square("A", 0.0, 0.0, 10.0), square("B", 20.0, 0.0, 10.0)];
        let grid = CountryGrid::build(&shapes);
        assert_eq!(grid.find_at(&shapes, 5.0, 5.0), Some(0));
        assert_eq!(grid.find_at(&shapes, 25.0, 5.0), Some(1));
        assert_eq!(grid.find_at(&shapes, 15.0, 5.0), None);
        assert_eq!(grid.find_at(&shapes, -50.0, 5.0), None);
    }

    #[test]
    fn holes_are_outside() {
        let donut = CountryShape::new(
            "D".to_string(),
            Polygon::new(square_ring(0.0, 0.0, 30.0), vec![square_ring(10.0, 10.0, 10.0)]).into(),
        );
        assert!(donut.contains(5.0, 5.0));
        assert!(!donut.contains(15.0, 15.0));
    }

    #[test]
    fn every_part_of_a_multipolygon_is_a_hit() {
        let islands = CountryShape::new(
            "I".to_string(),
            MultiPolygon::new(vec![
                Polygon::new(square_ring(0.0, 0.0, 5.0), vec![]),
                Polygon::new(square_ring(40.0, 40.0, 5.0), vec![]),
            ]),
        );
        let shapes = vec![islands];
        let grid = CountryGrid::build(&shapes);
        assert_eq!(grid.find_at(&shapes, 2.0, 2.0), Some(0));
        assert_eq!(grid.find_at(&shapes, 42.0, 42.0), Some(0));
        assert_eq!(grid.find_at(&shapes, 20.0, 20.0), None);
    }

    #[test]
    fn bounding_box_alone_is_not_a_hit() {
        let triangle = CountryShape::new(
            "T".to_string(),
            Polygon::new(ring(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]), vec![]).into(),
        );
        assert!(triangle.contains(2.0, 2.0));
        assert!(!triangle.contains(9.0, 9.0));
    }

    #[test]
    fn empty_shapes_never_hit() {
        let grid = CountryGrid::build(&[]);
        assert_eq!(grid.find_at(&[], 0.0, 0.0), None);

        let empty = vec![CountryShape::new("E".to_string(), MultiPolygon::new(vec![]))];
        assert!(empty[0].bounds.is_none());
        let grid = CountryGrid::build(&empty);
        assert_eq!(grid.find_at(&empty, 0.0, 0.0), None);
    }
}
