pub const LAND_FILL: &str = "#d3d3d3";
pub const LAND_HOVER_FILL: &str = "rgb(12, 50, 68)";
pub const BORDER_STROKE: &str = "#333";
pub const BORDER_WIDTH: f64 = 0.5;
pub const MARKER_STROKE: (u8, u8, u8) = (255, 255, 255);

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{})", a.clamp(0.0, 1.0))
}
