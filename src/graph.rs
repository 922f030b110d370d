#![cfg(not(tarpaulin_include))]
use crate::report::{Report, parse_hex};
use plotters::prelude::*;
use std::f64::consts::PI;

/// Shape of the report chart
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChartStyle {
    /// Solid pie
    #[default]
    Pie,

    /// Pie with the middle cut out
    Donut,
}

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title drawn above the chart
    pub title: String,

    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,

    pub style: ChartStyle,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Emotion distribution".to_string(),
            width: 720,
            height: 420,
            style: ChartStyle::Pie,
        }
    }
}

// Points used to approximate a full circle
const ARC_STEPS: f64 = 180.0;

const FALLBACK_COLOR: RGBColor = RGBColor(0x88, 0x88, 0x88);

/// Renders the report as an SVG pie chart with a legend.
///
/// Wedges carry no numeric labels; counts and percentages go in the legend.
/// An empty report renders a "No data" placeholder instead of wedges.
///
/// # Arguments
/// * `report` - Aggregated labels to draw, in legend order
/// * `options` - Size, title and style of the chart
///
/// # Returns
/// * The SVG document as a string, or a drawing error
pub fn render_pie_svg(
    report: &Report,
    options: &ChartOptions,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        draw_chart(&root, report, options)?;
        root.present()?;
    }

    Ok(svg)
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    report: &Report,
    options: &ChartOptions,
) -> Result<(), Box<dyn std::error::Error>>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let title_style = ("sans-serif", 22).into_font().color(&BLACK);
    root.draw(&Text::new(options.title.clone(), (16, 12), title_style))?;

    let body = root.margin(48, 16, 16, 16);
    let (chart_area, legend_area) = body.split_horizontally((options.width * 3 / 5) as i32);

    let (cw, ch) = chart_area.dim_in_pixel();
    let center = (cw as f64 / 2.0, ch as f64 / 2.0);
    let radius = cw.min(ch) as f64 / 2.0 * 0.9;
    let inner = match options.style {
        ChartStyle::Pie => 0.0,
        ChartStyle::Donut => radius * 0.55,
    };

    if report.is_empty() {
        let style = ("sans-serif", 18).into_font().color(&BLACK);
        chart_area.draw(&Text::new(
            "No data",
            (center.0 as i32 - 30, center.1 as i32 - 9),
            style,
        ))?;
        return Ok(());
    }

    // Start at twelve o'clock and go clockwise
    let mut start = -PI / 2.0;
    for entry in &report.entries {
        let sweep = 2.0 * PI * entry.count as f64 / report.total as f64;
        let points = wedge_points(center, radius, inner, start, sweep);
        chart_area.draw(&Polygon::new(points, color_of(&entry.color).filled()))?;
        start += sweep;
    }

    let legend_font = ("sans-serif", 14).into_font().color(&BLACK);
    for (i, entry) in report.entries.iter().enumerate() {
        let y = 8 + i as i32 * 22;
        legend_area.draw(&Rectangle::new(
            [(4, y), (18, y + 14)],
            color_of(&entry.color).filled(),
        ))?;
        legend_area.draw(&Text::new(
            format!("{} ({:.1}%)", entry.label, entry.percentage),
            (26, y),
            legend_font.clone(),
        ))?;
    }

    Ok(())
}

fn color_of(hex: &str) -> RGBColor {
    parse_hex(hex)
        .map(|(r, g, b)| RGBColor(r, g, b))
        .unwrap_or(FALLBACK_COLOR)
}

/// Outline of one wedge: the outer arc, then the inner arc backwards.
///
/// With `inner == 0` the inner arc collapses to the center point.
fn wedge_points(
    center: (f64, f64),
    outer: f64,
    inner: f64,
    start: f64,
    sweep: f64,
) -> Vec<(i32, i32)> {
    let steps = ((sweep / (2.0 * PI)) * ARC_STEPS).ceil().max(1.0) as usize;
    let at = |r: f64, angle: f64| {
        (
            (center.0 + r * angle.cos()).round() as i32,
            (center.1 + r * angle.sin()).round() as i32,
        )
    };

    let mut points = Vec::with_capacity(2 * steps + 2);
    for step in 0..=steps {
        points.push(at(outer, start + sweep * step as f64 / steps as f64));
    }
    if inner > 0.0 {
        for step in (0..=steps).rev() {
            points.push(at(inner, start + sweep * step as f64 / steps as f64));
        }
    } else {
        points.push(at(0.0, start));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use crate::report::ColorScheme;

    fn sample() -> Report {
        let labels = vec![
            Label::Emotion("joy".into()),
            Label::NoText,
            Label::NoText,
            Label::NoText,
        ];
        Report::from_labels(&labels, ColorScheme::Palette)
    }

    #[test]
    fn renders_svg_with_legend() {
        let svg = render_pie_svg(&sample(), &ChartOptions::default()).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("NO_TEXT (75.0%)"));
        assert!(svg.contains("joy (25.0%)"));
        assert!(svg.contains("polygon"));
    }

    #[test]
    fn donut_renders_too() {
        let options = ChartOptions {
            style: ChartStyle::Donut,
            ..ChartOptions::default()
        };
        let svg = render_pie_svg(&sample(), &options).unwrap();
        assert!(svg.contains("polygon"));
    }

    #[test]
    fn empty_report_renders_placeholder() {
        let report = Report::from_labels(&[], ColorScheme::Palette);
        let svg = render_pie_svg(&report, &ChartOptions::default()).unwrap();
        assert!(svg.contains("No data"));
        assert!(!svg.contains("polygon"));
    }

    #[test]
    fn pie_wedge_closes_at_center() {
        let points = wedge_points((100.0, 100.0), 50.0, 0.0, 0.0, PI / 2.0);
        assert_eq!(points.first(), Some(&(150, 100)));
        assert_eq!(points.last(), Some(&(100, 100)));
    }

    #[test]
    fn donut_wedge_returns_along_inner_arc() {
        let points = wedge_points((100.0, 100.0), 50.0, 20.0, 0.0, PI / 2.0);
        assert_eq!(points.first(), Some(&(150, 100)));
        assert_eq!(points.last(), Some(&(120, 100)));
    }
}
