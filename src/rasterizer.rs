//! Grayscale image → block-glyph grid.
//!
//! One resampling strategy is picked per frame: nearest-neighbour whenever the
//! grid is smaller than the source on either axis, bilinear otherwise.

use image::GrayImage;

use crate::ascii_frame::AsciiFrame;

pub const GLYPH_FULL: char = '█';
pub const GLYPH_DARK: char = '▓';
pub const GLYPH_MEDIUM: char = '▒';
pub const GLYPH_LIGHT: char = '░';
pub const GLYPH_BLANK: char = ' ';

/// Target glyph grid, in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub columns: usize,
    pub rows: usize,
}

impl GridSize {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self { columns, rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    NearestNeighbor,
    Bilinear,
}

impl Resampling {
    pub fn select(source_width: u32, source_height: u32, grid: GridSize) -> Self {
        let scale_down =
            grid.columns < source_width as usize || grid.rows < source_height as usize;
        if scale_down {
            Self::NearestNeighbor
        } else {
            Self::Bilinear
        }
    }
}

/// Map an 8-bit luminance to its glyph. Darker is denser.
///
/// 128..=191 and 192..=255 both render blank; the upper band is kept as its
/// own arm so the table matches the documented six bands.
pub fn glyph_for_luma(luma: u8) -> char {
    match luma {
        0..=31 => GLYPH_FULL,
        32..=63 => GLYPH_DARK,
        64..=95 => GLYPH_MEDIUM,
        96..=127 => GLYPH_LIGHT,
        128..=191 => GLYPH_BLANK,
        _ => GLYPH_BLANK,
    }
}

/// Rasterize `image` into a frame of exactly `grid` cells.
pub fn rasterize(number: usize, image: &GrayImage, grid: GridSize) -> AsciiFrame {
    let (source_width, source_height) = image.dimensions();
    if source_width == 0 || source_height == 0 {
        return AsciiFrame::blank(number, grid.columns, grid.rows);
    }

    let lines = match Resampling::select(source_width, source_height, grid) {
        Resampling::NearestNeighbor => render_nearest(image, grid),
        Resampling::Bilinear => render_bilinear(image, grid),
    };
    AsciiFrame::from_lines(number, lines, grid.columns, grid.rows)
}

fn render_nearest(image: &GrayImage, grid: GridSize) -> Vec<String> {
    let (source_width, source_height) = image.dimensions();
    let (source_width, source_height) = (source_width as usize, source_height as usize);
    let mut lines = Vec::with_capacity(grid.rows);

    for y in 0..grid.rows {
        let mut line = String::with_capacity(grid.columns * 3);
        let source_y = ((y * source_height) / grid.rows).min(source_height - 1);
        for x in 0..grid.columns {
            let source_x = ((x * source_width) / grid.columns).min(source_width - 1);
            let luma = image.get_pixel(source_x as u32, source_y as u32).0[0];
            line.push(glyph_for_luma(luma));
        }
        lines.push(line);
    }

    lines
}

fn render_bilinear(image: &GrayImage, grid: GridSize) -> Vec<String> {
    let (source_width, source_height) = image.dimensions();
    let mut lines = Vec::with_capacity(grid.rows);

    for y in 0..grid.rows {
        let mut line = String::with_capacity(grid.columns * 3);
        let source_y = y as f64 * source_height as f64 / grid.rows as f64;
        for x in 0..grid.columns {
            let source_x = x as f64 * source_width as f64 / grid.columns as f64;
            let luma = bilinear_sample(image, source_x, source_y);
            line.push(glyph_for_luma(luma));
        }
        lines.push(line);
    }

    lines
}

/// Sample at a real-valued source coordinate. The `+1` neighbour is clamped to
/// the last row/column, so border cells blend with a copy of themselves.
pub fn bilinear_sample(image: &GrayImage, x: f64, y: f64) -> u8 {
    let (width, height) = image.dimensions();
    let x0 = (x.max(0.0) as u32).min(width - 1);
    let y0 = (y.max(0.0) as u32).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let p00 = f64::from(image.get_pixel(x0, y0).0[0]);
    let p10 = f64::from(image.get_pixel(x1, y0).0[0]);
    let p01 = f64::from(image.get_pixel(x0, y1).0[0]);
    let p11 = f64::from(image.get_pixel(x1, y1).0[0]);

    let fx = x - f64::from(x0);
    let fy = y - f64::from(y0);

    let value = p00 * (1.0 - fx) * (1.0 - fy)
        + p10 * fx * (1.0 - fy)
        + p01 * (1.0 - fx) * fy
        + p11 * fx * fy;

    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn density(glyph: char) -> u8 {
        match glyph {
            GLYPH_FULL => 4,
            GLYPH_DARK => 3,
            GLYPH_MEDIUM => 2,
            GLYPH_LIGHT => 1,
            _ => 0,
        }
    }

    #[test]
    fn band_boundaries_fall_on_documented_side() {
        assert_eq!(glyph_for_luma(0), GLYPH_FULL);
        assert_eq!(glyph_for_luma(31), GLYPH_FULL);
        assert_eq!(glyph_for_luma(32), GLYPH_DARK);
        assert_eq!(glyph_for_luma(63), GLYPH_DARK);
        assert_eq!(glyph_for_luma(64), GLYPH_MEDIUM);
        assert_eq!(glyph_for_luma(95), GLYPH_MEDIUM);
        assert_eq!(glyph_for_luma(96), GLYPH_LIGHT);
        assert_eq!(glyph_for_luma(127), GLYPH_LIGHT);
        assert_eq!(glyph_for_luma(128), GLYPH_BLANK);
        assert_eq!(glyph_for_luma(191), GLYPH_BLANK);
        assert_eq!(glyph_for_luma(192), GLYPH_BLANK);
        assert_eq!(glyph_for_luma(255), GLYPH_BLANK);
    }

    #[test]
    fn glyph_density_never_increases_with_luma() {
        let mut previous = density(glyph_for_luma(0));
        for luma in 1..=255_u8 {
            let current = density(glyph_for_luma(luma));
            assert!(current <= previous, "density rose at luma {luma}");
            previous = current;
        }
    }

    #[test]
    fn selection_uses_nearest_when_either_axis_shrinks() {
        assert_eq!(
            Resampling::select(100, 50, GridSize::new(80, 60)),
            Resampling::NearestNeighbor
        );
        assert_eq!(
            Resampling::select(100, 50, GridSize::new(120, 40)),
            Resampling::NearestNeighbor
        );
        assert_eq!(
            Resampling::select(100, 50, GridSize::new(100, 50)),
            Resampling::Bilinear
        );
        assert_eq!(
            Resampling::select(10, 10, GridSize::new(40, 20)),
            Resampling::Bilinear
        );
    }

    #[test]
    fn nearest_picks_floor_of_scaled_coordinate() {
        // 4x1 source, each column a distinct band; 2 columns sample x=0 and x=2.
        let image = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 40, 70, 200][x as usize]]));
        let frame = rasterize(1, &image, GridSize::new(2, 1));
        assert_eq!(frame.to_text(), format!("{GLYPH_FULL}{GLYPH_MEDIUM}"));
    }

    #[test]
    fn bilinear_blends_between_neighbours() {
        let image = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        assert_eq!(bilinear_sample(&image, 0.5, 0.0), 100);
        assert_eq!(bilinear_sample(&image, 0.25, 0.0), 50);
    }

    #[test]
    fn bilinear_duplicates_last_column_at_border() {
        let image = GrayImage::from_fn(2, 2, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        // x=1.5 lies past the last column; the +1 neighbour clamps back to it.
        assert_eq!(bilinear_sample(&image, 1.5, 0.5), 200);
    }

    #[test]
    fn upscale_output_changes_gradually() {
        // 3x1 black→grey→white source upscaled to 12 columns: every glyph step
        // is a single band, no jump from full block straight to blank.
        let image = GrayImage::from_fn(3, 1, |x, _| Luma([[0, 128, 255][x as usize]]));
        let frame = rasterize(1, &image, GridSize::new(12, 1));
        let densities = frame.lines()[0].chars().map(density).collect::<Vec<_>>();
        assert_eq!(densities[0], 4);
        for pair in densities.windows(2) {
            assert!(pair[0] >= pair[1]);
            assert!(pair[0] - pair[1] <= 1, "blocky jump in {densities:?}");
        }
    }

    #[test]
    fn output_matches_grid_dimensions() {
        let image = GrayImage::from_pixel(64, 48, Luma([10]));
        let frame = rasterize(5, &image, GridSize::new(20, 6));
        assert_eq!(frame.lines().len(), 6);
        assert!(frame.lines().iter().all(|line| line.chars().count() == 20));
        assert!(frame.to_text().chars().all(|c| c == GLYPH_FULL || c == '\n'));
    }

    #[test]
    fn empty_source_yields_blank_frame() {
        let image = GrayImage::new(0, 0);
        let frame = rasterize(1, &image, GridSize::new(3, 2));
        assert_eq!(frame.to_text(), "   \n   ");
    }
}
