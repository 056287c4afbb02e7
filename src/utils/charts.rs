//! Prediction chart rendering
//!
//! Renders the two-panel prediction figure (input image on the left,
//! confidence bar chart on the right) as a PNG raster, plus an SVG twin that
//! carries the titles and percentage labels.

use std::fs;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};

use crate::utils::error::Result;

/// Chart styling constants (a 10x5 figure at 100 dpi)
const FIGURE_WIDTH: u32 = 1000;
const FIGURE_HEIGHT: u32 = 500;
const PANEL_WIDTH: u32 = FIGURE_WIDTH / 2;
const MARGIN_TOP: u32 = 60;
const MARGIN_RIGHT: u32 = 40;
const MARGIN_BOTTOM: u32 = 80;
const MARGIN_LEFT: u32 = 80;

const COLOR_PREDICTED: Rgb<u8> = Rgb([46, 160, 67]);
const COLOR_OTHER: Rgb<u8> = Rgb([214, 39, 40]);
const COLOR_GRID: Rgb<u8> = Rgb([236, 240, 241]);
const COLOR_AXIS: Rgb<u8> = Rgb([44, 62, 80]);
const COLOR_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

const SVG_PREDICTED: &str = "green";
const SVG_OTHER: &str = "red";
const SVG_TEXT: &str = "#2c3e50";
const SVG_GRID: &str = "#ecf0f1";

/// One bar of the confidence chart
#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    /// Percentage in [0, 100]
    pub value: f64,
    /// The predicted class is drawn green, the others red
    pub highlighted: bool,
}

/// Geometry of the bar chart plot area inside the right panel
struct PlotArea {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl PlotArea {
    fn right_panel() -> Self {
        Self {
            left: PANEL_WIDTH + MARGIN_LEFT,
            top: MARGIN_TOP,
            width: PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: FIGURE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// Pixel row of a percentage value, y axis fixed to 0..100
    fn y_for(&self, value: f64) -> u32 {
        let clamped = value.clamp(0.0, 100.0);
        self.bottom() - ((clamped / 100.0) * self.height as f64).round() as u32
    }

    /// Horizontal extent of bar `index` out of `count`
    fn bar_span(&self, index: usize, count: usize) -> (u32, u32) {
        let slot = self.width as f64 / count.max(1) as f64;
        let bar_width = slot * 0.7;
        let x0 = self.left as f64 + index as f64 * slot + (slot - bar_width) / 2.0;
        (x0.round() as u32, (x0 + bar_width).round() as u32)
    }
}

fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for y in y0.min(h)..y1.min(h) {
        for x in x0.min(w)..x1.min(w) {
            img.put_pixel(x, y, color);
        }
    }
}

/// Render the prediction figure as a raster image
pub fn render_prediction_figure(input: &DynamicImage, bars: &[BarData]) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(FIGURE_WIDTH, FIGURE_HEIGHT, COLOR_BACKGROUND);

    // Left panel: the input image, aspect preserved
    let max_w = PANEL_WIDTH - 2 * MARGIN_RIGHT;
    let max_h = FIGURE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let thumb = input.resize(max_w, max_h, FilterType::Triangle).to_rgb8();
    let offset_x = (PANEL_WIDTH - thumb.width()) / 2;
    let offset_y = MARGIN_TOP + (max_h - thumb.height()) / 2;
    image::imageops::overlay(&mut canvas, &thumb, offset_x as i64, offset_y as i64);

    // Right panel: gridlines every 20%
    let area = PlotArea::right_panel();
    for step in 0..=5 {
        let y = area.y_for(step as f64 * 20.0);
        fill_rect(&mut canvas, area.left, y, area.left + area.width, y + 1, COLOR_GRID);
    }

    for (i, bar) in bars.iter().enumerate() {
        let (x0, x1) = area.bar_span(i, bars.len());
        let color = if bar.highlighted {
            COLOR_PREDICTED
        } else {
            COLOR_OTHER
        };
        fill_rect(&mut canvas, x0, area.y_for(bar.value), x1, area.bottom(), color);
    }

    // Axes
    fill_rect(
        &mut canvas,
        area.left,
        area.bottom(),
        area.left + area.width,
        area.bottom() + 2,
        COLOR_AXIS,
    );
    fill_rect(
        &mut canvas,
        area.left - 2,
        area.top,
        area.left,
        area.bottom() + 2,
        COLOR_AXIS,
    );

    canvas
}

/// Render and save the PNG prediction figure
pub fn save_prediction_png(input: &DynamicImage, bars: &[BarData], output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    render_prediction_figure(input, bars).save(output_path)?;
    Ok(())
}

/// Build the SVG twin of the prediction figure
pub fn prediction_svg(image_href: &str, bars: &[BarData]) -> String {
    let area = PlotArea::right_panel();
    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
        w = FIGURE_WIDTH,
        h = FIGURE_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        FIGURE_WIDTH, FIGURE_HEIGHT
    ));

    // Left panel
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">Input Image</text>"#,
        PANEL_WIDTH / 2,
        SVG_TEXT
    ));
    svg.push_str(&format!(
        r#"<image href="{}" x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid meet"/>"#,
        escape_xml(image_href),
        MARGIN_RIGHT,
        MARGIN_TOP,
        PANEL_WIDTH - 2 * MARGIN_RIGHT,
        FIGURE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    ));

    // Right panel
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">Prediction Confidence</text>"#,
        PANEL_WIDTH + PANEL_WIDTH / 2,
        SVG_TEXT
    ));

    for step in 0..=5 {
        let value = step as f64 * 20.0;
        let y = area.y_for(value);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            area.left,
            y,
            area.left + area.width,
            y,
            SVG_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.0}</text>"#,
            area.left - 10,
            y + 4,
            SVG_TEXT,
            value
        ));
    }

    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{c}" transform="rotate(-90 {x} {y})">Confidence (%)</text>"#,
        x = PANEL_WIDTH + 25,
        y = FIGURE_HEIGHT / 2,
        c = SVG_TEXT
    ));

    for (i, bar) in bars.iter().enumerate() {
        let (x0, x1) = area.bar_span(i, bars.len());
        let y = area.y_for(bar.value);
        let color = if bar.highlighted { SVG_PREDICTED } else { SVG_OTHER };
        let center = (x0 + x1) / 2;

        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
            x0,
            y,
            x1 - x0,
            area.bottom() - y,
            color
        ));
        // Value label sits 2% above the bar
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" font-weight="bold" fill="{}">{:.1}%</text>"#,
            center,
            area.y_for(bar.value + 2.0).saturating_sub(4),
            SVG_TEXT,
            bar.value
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            center,
            area.bottom() + 25,
            SVG_TEXT,
            escape_xml(&bar.label)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Write the SVG twin next to the PNG
pub fn save_prediction_svg(image_href: &str, bars: &[BarData], output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, prediction_svg(image_href, bars))?;
    Ok(())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bars() -> Vec<BarData> {
        vec![
            BarData {
                label: "fractured".to_string(),
                value: 80.0,
                highlighted: true,
            },
            BarData {
                label: "not fractured".to_string(),
                value: 20.0,
                highlighted: false,
            },
        ]
    }

    #[test]
    fn test_figure_dimensions_and_bar_colors() {
        let input = DynamicImage::new_rgb8(64, 32);
        let figure = render_prediction_figure(&input, &sample_bars());
        assert_eq!(figure.dimensions(), (FIGURE_WIDTH, FIGURE_HEIGHT));

        let area = PlotArea::right_panel();
        let (x0, x1) = area.bar_span(0, 2);
        let mid = (x0 + x1) / 2;
        assert_eq!(*figure.get_pixel(mid, area.bottom() - 5), COLOR_PREDICTED);

        let (x0, x1) = area.bar_span(1, 2);
        let mid = (x0 + x1) / 2;
        assert_eq!(*figure.get_pixel(mid, area.bottom() - 5), COLOR_OTHER);
        // 20% bar does not reach the 50% line
        assert_ne!(*figure.get_pixel(mid, area.y_for(50.0)), COLOR_OTHER);
    }

    #[test]
    fn test_svg_contains_labels() {
        let svg = prediction_svg("xray <1>.png", &sample_bars());
        assert!(svg.contains("Prediction Confidence"));
        assert!(svg.contains("80.0%"));
        assert!(svg.contains("not fractured"));
        assert!(svg.contains("xray &lt;1&gt;.png"));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plot.png");
        save_prediction_png(&DynamicImage::new_rgb8(10, 10), &sample_bars(), &path).unwrap();
        assert!(path.exists());
    }
}
