//! PNG heatmaps of aggregated rasters.

use std::path::Path;

use clap::ValueEnum;
use color_eyre::eyre;
use graphet_core::common::Range;
use graphet_lazy_data::Raster;
use plotters::{
    prelude::{BitMapBackend, IntoDrawingArea, Rectangle},
    style::{Color, HSLColor, RGBAColor, RGBColor, WHITE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Colormap {
    Viridis,
    Gray,
    /// Blue to red through the hue circle.
    Hue,
}

const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

const NAN_COLOR: RGBColor = RGBColor(200, 200, 200);

impl Colormap {
    /// Colour of `t` in `0..=1`.
    pub fn color(self, t: f64) -> RGBAColor {
        let t = t.clamp(0.0, 1.0);
        match self {
            Colormap::Viridis => {
                let pos = t * (VIRIDIS.len() - 1) as f64;
                let i = (pos.floor() as usize).min(VIRIDIS.len() - 2);
                let frac = pos - i as f64;
                let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * frac).round() as u8;
                let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
                RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2)).to_rgba()
            }
            Colormap::Gray => {
                let v = (t * 255.0).round() as u8;
                RGBColor(v, v, v).to_rgba()
            }
            Colormap::Hue => HSLColor(240.0 / 360.0 * (1.0 - t), 0.7, 0.5).to_rgba(),
        }
    }
}

/// Draws one `scale x scale` cell per value, lowest `y` at the bottom.
#[cfg_attr(not(feature = "hdf5"), allow(dead_code))]
pub fn render_png(raster: &Raster, colormap: Colormap, scale: u32, out: &Path) -> eyre::Result<()> {
    let (width, height) = (raster.width() as u32, raster.height() as u32);
    if width == 0 || height == 0 {
        eyre::bail!("Nothing to render, the raster is empty");
    }
    let scale = scale.max(1);

    let root = BitMapBackend::new(out, (width * scale, height * scale)).into_drawing_area();
    root.fill(&WHITE)?;

    let range = raster.value_range().unwrap_or(Range::new(0.0, 1.0));
    let s = scale as i32;
    for ((row, col), &v) in raster.values.indexed_iter() {
        let color = if v.is_finite() {
            let t = range.map(v);
            colormap.color(if t.is_finite() { t } else { 0.5 })
        } else {
            NAN_COLOR.to_rgba()
        };
        let x0 = col as i32 * s;
        let y0 = (height as i32 - 1 - row as i32) * s;
        root.draw(&Rectangle::new([(x0, y0), (x0 + s, y0 + s)], color.filled()))?;
    }

    root.present()?;
    Ok(())
}
