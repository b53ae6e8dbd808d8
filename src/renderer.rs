//! # SVG Chart Rendering
//!
//! A small, dependency-free line chart renderer producing the SVG files served
//! as static assets. Each [`Chart`] becomes `<output_dir>/<name>.svg`, replaced
//! atomically (write to a temp file, then rename) so a web server never serves
//! a half-written file.
//!
//! Layout: title block, plot area with min/max y labels
//! and five x ticks, legend on the right. Gaps in a series break the line.

use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{ArtifactRenderer, Chart, RenderError};

const WIDTH: f64 = 1600.0;
const HEIGHT: f64 = 800.0;
const MARGIN_LEFT: f64 = 110.0;
const MARGIN_RIGHT: f64 = 180.0;
const MARGIN_TOP: f64 = 120.0;
const MARGIN_BOTTOM: f64 = 90.0;
const X_TICKS: usize = 5;

/// Line colors, cycled per series
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22",
    "#17becf", "#393b79",
];
const HIGHLIGHT_COLOR: &str = "#d62728";

/// Writes charts as SVG files into one directory.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    output_dir: PathBuf,
}

impl SvgRenderer {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.svg"))
    }
}

impl ArtifactRenderer for SvgRenderer {
    fn render(&self, chart: &Chart) -> Result<PathBuf, RenderError> {
        let svg = render_svg(chart)?;
        fs::create_dir_all(&self.output_dir)?;

        let path = self.path_for(&chart.name);
        let tmp = self.output_dir.join(format!(".{}.svg.tmp", chart.name));
        fs::write(&tmp, svg)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

/// Axis bounds over every defined point of a chart.
struct Bounds {
    x_min: i64,
    x_max: i64,
    y_min: f64,
    y_max: f64,
}

impl Bounds {
    fn of(chart: &Chart) -> Option<Self> {
        let mut points = chart
            .series
            .iter()
            .flat_map(|s| s.points.iter())
            .filter_map(|(t, v)| v.filter(|v| v.is_finite()).map(|v| (seconds(*t), v)));

        let (t0, v0) = points.next()?;
        let mut bounds = Bounds {
            x_min: t0,
            x_max: t0,
            y_min: v0,
            y_max: v0,
        };
        for (t, v) in points {
            bounds.x_min = bounds.x_min.min(t);
            bounds.x_max = bounds.x_max.max(t);
            bounds.y_min = bounds.y_min.min(v);
            bounds.y_max = bounds.y_max.max(v);
        }
        // Pad flat data so it does not sit on the frame
        if bounds.y_max - bounds.y_min < 1.0 {
            bounds.y_min -= 0.5;
            bounds.y_max += 0.5;
        }
        if bounds.x_max == bounds.x_min {
            bounds.x_max += 1;
        }
        Some(bounds)
    }

    fn x(&self, t: NaiveDateTime) -> f64 {
        let span = (self.x_max - self.x_min) as f64;
        MARGIN_LEFT + (seconds(t) - self.x_min) as f64 / span * plot_width()
    }

    fn y(&self, v: f64) -> f64 {
        let span = self.y_max - self.y_min;
        MARGIN_TOP + (self.y_max - v) / span * plot_height()
    }
}

fn seconds(t: NaiveDateTime) -> i64 {
    t.and_utc().timestamp()
}

fn plot_width() -> f64 {
    WIDTH - MARGIN_LEFT - MARGIN_RIGHT
}

fn plot_height() -> f64 {
    HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a chart to an SVG document.
pub fn render_svg(chart: &Chart) -> Result<String, RenderError> {
    let bounds = Bounds::of(chart).ok_or_else(|| RenderError::NothingToPlot(chart.name.clone()))?;
    let mut svg = String::with_capacity(64 * 1024);

    // Writing into a String cannot fail
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="50" font-size="36" text-anchor="middle">{}</text>"#,
        WIDTH / 2.0,
        escape(&chart.title)
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="90" font-size="26" text-anchor="middle">{}</text>"#,
        WIDTH / 2.0,
        escape(&chart.subtitle)
    );

    // Plot frame and axis labels
    let _ = writeln!(
        svg,
        "<rect x=\"{MARGIN_LEFT}\" y=\"{MARGIN_TOP}\" width=\"{}\" height=\"{}\" fill=\"#eaeaf2\"/>",
        plot_width(),
        plot_height()
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="24" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + plot_width() / 2.0,
        HEIGHT - 20.0,
        escape(&chart.x_label)
    );
    let _ = writeln!(
        svg,
        r#"<text x="30" y="{y}" font-size="24" text-anchor="middle" transform="rotate(-90 30 {y})">{}</text>"#,
        escape(&chart.y_label),
        y = MARGIN_TOP + plot_height() / 2.0
    );
    for value in [bounds.y_min, bounds.y_max] {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" font-size="18" text-anchor="end">{value:.1}</text>"#,
            MARGIN_LEFT - 8.0,
            bounds.y(value) + 6.0
        );
    }
    for tick in 0..X_TICKS {
        let secs = bounds.x_min + (bounds.x_max - bounds.x_min) * tick as i64 / (X_TICKS as i64 - 1);
        let Some(t) = chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()) else {
            continue;
        };
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{}" font-size="18" text-anchor="middle">{}</text>"#,
            bounds.x(t),
            MARGIN_TOP + plot_height() + 28.0,
            escape(&t.format(&chart.x_format).to_string())
        );
    }

    // Lines, highlighted series drawn last so it sits on top
    let mut order: Vec<usize> = (0..chart.series.len()).collect();
    order.sort_by_key(|&i| chart.highlight.as_deref() == Some(chart.series[i].label.as_str()));
    for i in order {
        let series = &chart.series[i];
        let highlighted = chart.highlight.as_deref() == Some(series.label.as_str());
        let (color, width) = if highlighted {
            (HIGHLIGHT_COLOR, 3.0)
        } else {
            (PALETTE[i % PALETTE.len()], 1.5)
        };

        for segment in series.points.split(|(_, v)| !v.is_some_and(f64::is_finite)) {
            if segment.is_empty() {
                continue;
            }
            let mut coords = String::new();
            for (t, v) in segment {
                if let Some(v) = v {
                    let _ = write!(coords, "{:.1},{:.1} ", bounds.x(*t), bounds.y(*v));
                }
            }
            let _ = writeln!(
                svg,
                r#"<polyline fill="none" stroke="{color}" stroke-width="{width}" points="{}"/>"#,
                coords.trim_end()
            );
        }

        let legend_y = MARGIN_TOP + 10.0 + 26.0 * i as f64;
        let legend_x = WIDTH - MARGIN_RIGHT + 20.0;
        let _ = writeln!(
            svg,
            r#"<line x1="{legend_x}" y1="{legend_y}" x2="{}" y2="{legend_y}" stroke="{color}" stroke-width="{width}"/>"#,
            legend_x + 30.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" font-size="18">{}</text>"#,
            legend_x + 38.0,
            legend_y + 6.0,
            escape(&series.label)
        );
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}
