use attack_map_shared::MapViewBox;

/// Uniform fit of the map view box into the canvas, centred on both axes
/// with letterboxing on the slack side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Viewport {
    /// Scale `view` to fit a `canvas_w` x `canvas_h` CSS-pixel canvas.
    pub fn fit(view: MapViewBox, canvas_w: f64, canvas_h: f64) -> Self {
        if view.width <= 0.0 || view.height <= 0.0 || canvas_w <= 0.0 || canvas_h <= 0.0 {
            return Self::default();
        }
        let scale = (canvas_w / view.width).min(canvas_h / view.height);
        Self {
            offset_x: (canvas_w - view.width * scale) / 2.0 - view.min_x * scale,
            offset_y: (canvas_h - view.height * scale) / 2.0 - view.min_y * scale,
            scale,
        }
    }

    pub fn map_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }

    pub fn screen_to_map(&self, sx: f64, sy: f64) -> (f64, f64) {
        (
            (sx - self.offset_x) / self.scale,
            (sy - self.offset_y) / self.scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn exact_fit_maps_view_box_corners_to_canvas_corners() {
        let vp = Viewport::fit(MapViewBox::default(), 960.0, 500.0);
        assert_close(vp.scale, 1.0);
        let (x, y) = vp.map_to_screen(0.0, 40.0);
        assert_close(x, 0.0);
        assert_close(y, 0.0);
        let (x, y) = vp.map_to_screen(960.0, 540.0);
        assert_close(x, 960.0);
        assert_close(y, 500.0);
    }

    #[test]
    fn wide_canvas_letterboxes_horizontally() {
        let vp = Viewport::fit(MapViewBox::default(), 2000.0, 500.0);
        assert_close(vp.scale, 1.0);
        let (x, _) = vp.map_to_screen(0.0, 40.0);
        assert_close(x, 520.0);
    }

    #[test]
    fn screen_to_map_inverts_map_to_screen() {
        let vp = Viewport::fit(MapViewBox::default(), 1280.0, 720.0);
        let (sx, sy) = vp.map_to_screen(123.0, 321.0);
        let (x, y) = vp.screen_to_map(sx, sy);
        assert_close(x, 123.0);
        assert_close(y, 321.0);
    }

    #[test]
    fn degenerate_canvas_keeps_identity() {
        assert_eq!(Viewport::fit(MapViewBox::default(), 0.0, 400.0), Viewport::default());
    }
}
