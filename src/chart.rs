//! Bar and line charts, drawn as SVG.
//!
//! A [`Chart`] is only a description: a title, axis labels and some [`Series`]. It can be turned
//! into an SVG document, shown in an evcxr notebook, or saved to disk. Nothing downstream reads
//! charts back, they are purely for looking at.
use crate::util::{self, path_exists};
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use qu::ick_use::*;
use std::{
    borrow::Cow,
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

/// Pixels per inch when turning a figure size into an image size.
const DPI: f64 = 96.;
const MARGIN_LEFT: f64 = 80.;
const MARGIN_RIGHT: f64 = 24.;
const MARGIN_TOP: f64 = 44.;
const MARGIN_BOTTOM: f64 = 60.;
const TARGET_TICKS: f64 = 6.;

/// A named stroke/fill colour.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Color(pub &'static str);

impl Color {
    pub const RED: Color = Color("red");
    pub const GREEN: Color = Color("green");
    pub const ORANGE: Color = Color("orange");
    pub const PURPLE: Color = Color("purple");
}

/// How a series is drawn.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Mark {
    /// Bars centred on each x value, `width` in x units.
    Bar { width: f64 },
    /// Points joined in order. A NaN y value breaks the line.
    Line,
}

/// How x values are interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XAxis {
    Number,
    /// x values are days since the common era, see [`date_x`].
    Date,
}

/// The x coordinate for a date.
pub fn date_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

fn x_date(x: f64) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: Cow<'static, str>,
    pub color: Color,
    pub mark: Mark,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn bar(
        label: impl Into<Cow<'static, str>>,
        color: Color,
        width: f64,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Self {
        Series {
            label: label.into(),
            color,
            mark: Mark::Bar { width },
            points: points.into_iter().collect(),
        }
    }

    pub fn line(
        label: impl Into<Cow<'static, str>>,
        color: Color,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Self {
        Series {
            label: label.into(),
            color,
            mark: Mark::Line,
            points: points.into_iter().collect(),
        }
    }

    /// The leftmost and rightmost extent of the series.
    fn x_extent(&self) -> Option<(f64, f64)> {
        let half_width = match self.mark {
            Mark::Bar { width } => width / 2.,
            Mark::Line => 0.,
        };
        self.points
            .iter()
            .map(|(x, _)| *x)
            .filter(|x| x.is_finite())
            .minmax_by(f64::total_cmp)
            .into_option()
            .map(|(min, max)| (min - half_width, max + half_width))
    }

    fn y_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, y)| *y).filter(|y| y.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub title: Cow<'static, str>,
    pub x_label: Cow<'static, str>,
    pub y_label: Cow<'static, str>,
    /// Figure size in inches.
    pub size: (f64, f64),
    pub x_axis: XAxis,
    pub legend: bool,
    pub series: Vec<Series>,
}

impl Chart {
    pub fn new(title: impl Into<Cow<'static, str>>) -> Self {
        Chart {
            title: title.into(),
            x_label: "".into(),
            y_label: "".into(),
            size: (10., 4.),
            x_axis: XAxis::Number,
            legend: false,
            series: vec![],
        }
    }

    pub fn with_labels(
        mut self,
        x_label: impl Into<Cow<'static, str>>,
        y_label: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_dates(mut self) -> Self {
        self.x_axis = XAxis::Date;
        self
    }

    pub fn with_legend(mut self) -> Self {
        self.legend = true;
        self
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    /// A file name derived from the title, e.g. `clinic_1_number_of_deaths_per_year.svg`.
    pub fn file_name(&self) -> String {
        let slug = self
            .title
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| word.to_ascii_lowercase())
            .join("_");
        format!("{}.svg", if slug.is_empty() { "chart" } else { slug.as_str() })
    }

    /// Display the chart in an evcxr notebook.
    pub fn evcxr_display(&self) {
        util::evcxr_display("image/svg+xml", &self.to_svg());
    }

    /// Write the chart as an SVG file in `dir`, returning the path written.
    pub fn save(&self, dir: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("creating chart directory")?;
        let path = dir.join(self.file_name());
        ensure!(
            overwrite || !path_exists(&path)?,
            "chart \"{}\" already exists",
            path.display()
        );
        fs::write(&path, self.to_svg())
            .with_context(|| format!("writing chart \"{}\"", path.display()))?;
        event!(Level::INFO, "wrote chart \"{}\"", path.display());
        Ok(path)
    }

    fn x_bounds(&self) -> (f64, f64) {
        let extent = self
            .series
            .iter()
            .filter_map(Series::x_extent)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)));
        widen(extent.unwrap_or((0., 1.)))
    }

    /// Always includes 0, with a little headroom above the largest value.
    fn y_bounds(&self) -> (f64, f64) {
        let (min, max) = self
            .series
            .iter()
            .flat_map(Series::y_values)
            .fold((0f64, 0f64), |(min, max), y| (min.min(y), max.max(y)));
        let (min, max) = widen((min, max));
        (min, max + (max - min) * 0.05)
    }

    fn x_ticks(&self, (min, max): (f64, f64)) -> Vec<(f64, String)> {
        match self.x_axis {
            XAxis::Number => number_ticks(min, max),
            XAxis::Date => date_ticks(min, max),
        }
    }

    pub fn to_svg(&self) -> String {
        let width = self.size.0 * DPI;
        let height = self.size.1 * DPI;
        let plot = Plot {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (width - MARGIN_LEFT - MARGIN_RIGHT).max(1.),
            height: (height - MARGIN_TOP - MARGIN_BOTTOM).max(1.),
            x: self.x_bounds(),
            y: self.y_bounds(),
        };

        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" font-family="sans-serif">"#,
            w = width,
            h = height
        );
        let _ = write!(
            out,
            r#"<rect width="{:.0}" height="{:.0}" fill="white"/>"#,
            width, height
        );
        text(&mut out, width / 2., 28., 16., "middle", None, &self.title);

        // axes
        let bottom = plot.top + plot.height;
        let right = plot.left + plot.width;
        let _ = write!(
            out,
            r#"<path class="axes" d="M{l:.2} {t:.2} L{l:.2} {b:.2} L{r:.2} {b:.2}" stroke="black" fill="none"/>"#,
            l = plot.left,
            t = plot.top,
            b = bottom,
            r = right
        );
        for (x, label) in self.x_ticks(plot.x) {
            let px = plot.px(x);
            let _ = write!(
                out,
                r#"<line x1="{x:.2}" y1="{b:.2}" x2="{x:.2}" y2="{t:.2}" stroke="black"/>"#,
                x = px,
                b = bottom,
                t = bottom + 5.
            );
            text(&mut out, px, bottom + 18., 11., "middle", None, &label);
        }
        for (y, label) in number_ticks(plot.y.0, plot.y.1) {
            let py = plot.py(y);
            let _ = write!(
                out,
                r#"<line x1="{l:.2}" y1="{y:.2}" x2="{t:.2}" y2="{y:.2}" stroke="black"/>"#,
                l = plot.left,
                t = plot.left - 5.,
                y = py
            );
            text(&mut out, plot.left - 8., py + 4., 11., "end", None, &label);
        }
        text(
            &mut out,
            plot.left + plot.width / 2.,
            height - 16.,
            14.,
            "middle",
            None,
            &self.x_label,
        );
        let y_label_x = 20.;
        let y_label_y = plot.top + plot.height / 2.;
        text(
            &mut out,
            y_label_x,
            y_label_y,
            14.,
            "middle",
            Some(format!(
                "rotate(-90 {:.2} {:.2})",
                y_label_x, y_label_y
            )),
            &self.y_label,
        );

        for series in &self.series {
            match series.mark {
                Mark::Bar { width } => plot.bars(&mut out, series, width),
                Mark::Line => plot.line(&mut out, series),
            }
        }

        if self.legend {
            self.draw_legend(&mut out, right);
        }
        out.push_str("</svg>");
        out
    }

    fn draw_legend(&self, out: &mut String, right: f64) {
        let labelled = self
            .series
            .iter()
            .filter(|series| !series.label.is_empty())
            .collect::<Vec<_>>();
        if labelled.is_empty() {
            return;
        }
        let longest = labelled
            .iter()
            .map(|series| series.label.chars().count())
            .max()
            .unwrap_or(0) as f64;
        let box_width = 40. + longest * 7.;
        let left = right - box_width - 8.;
        let top = MARGIN_TOP + 8.;
        let _ = write!(
            out,
            r#"<rect class="legend" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="white" stroke="lightgray"/>"#,
            left,
            top,
            box_width,
            labelled.len() as f64 * 18. + 8.
        );
        for (idx, series) in labelled.iter().enumerate() {
            let y = top + 14. + idx as f64 * 18.;
            let _ = write!(
                out,
                r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="2"/>"#,
                left + 6.,
                left + 26.,
                series.color.0,
                y = y
            );
            text(out, left + 32., y + 4., 11., "start", None, &series.label);
        }
    }
}

/// Where the data area sits in the image, and the data ranges it shows.
struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    x: (f64, f64),
    y: (f64, f64),
}

impl Plot {
    fn px(&self, x: f64) -> f64 {
        self.left + (x - self.x.0) / (self.x.1 - self.x.0) * self.width
    }

    fn py(&self, y: f64) -> f64 {
        self.top + self.height - (y - self.y.0) / (self.y.1 - self.y.0) * self.height
    }

    fn bars(&self, out: &mut String, series: &Series, width: f64) {
        for (x, y) in series.points.iter().copied() {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            let x0 = self.px(x - width / 2.);
            let x1 = self.px(x + width / 2.);
            let (y0, y1) = (self.py(0.), self.py(y));
            let _ = write!(
                out,
                r#"<rect class="bar" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
                x0,
                y0.min(y1),
                x1 - x0,
                (y0 - y1).abs(),
                series.color.0
            );
        }
    }

    fn line(&self, out: &mut String, series: &Series) {
        let mut path = String::new();
        let mut pen_down = false;
        for (x, y) in series.points.iter().copied() {
            if !x.is_finite() || !y.is_finite() {
                pen_down = false;
                continue;
            }
            let cmd = if pen_down { 'L' } else { 'M' };
            let _ = write!(path, "{}{:.2} {:.2} ", cmd, self.px(x), self.py(y));
            pen_down = true;
        }
        if path.is_empty() {
            return;
        }
        let _ = write!(
            out,
            r#"<path class="line" d="{}" stroke="{}" stroke-width="1.5" fill="none"/>"#,
            path.trim_end(),
            series.color.0
        );
    }
}

fn text(
    out: &mut String,
    x: f64,
    y: f64,
    size: f64,
    anchor: &str,
    transform: Option<String>,
    content: &str,
) {
    let _ = write!(
        out,
        r#"<text x="{:.2}" y="{:.2}" font-size="{}" text-anchor="{}""#,
        x, y, size, anchor
    );
    if let Some(transform) = transform {
        let _ = write!(out, r#" transform="{}""#, transform);
    }
    out.push('>');
    html_escape::encode_text_to_string(content, out);
    out.push_str("</text>");
}

/// Make sure a range has some width.
fn widen((min, max): (f64, f64)) -> (f64, f64) {
    if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    }
}

/// A step of 1, 2 or 5 times a power of ten giving roughly `TARGET_TICKS` ticks over `range`.
fn nice_step(range: f64) -> f64 {
    let rough = range / TARGET_TICKS;
    let magnitude = 10f64.powf(rough.log10().floor());
    let residual = rough / magnitude;
    let nice = if residual < 1.5 {
        1.
    } else if residual < 3.5 {
        2.
    } else if residual < 7.5 {
        5.
    } else {
        10.
    };
    nice * magnitude
}

fn number_ticks(min: f64, max: f64) -> Vec<(f64, String)> {
    let step = nice_step(max - min);
    if !step.is_finite() || step <= 0. {
        return vec![];
    }
    let decimals = if step >= 1. {
        0
    } else {
        (-step.log10()).ceil() as usize
    };
    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last)
        .map(|idx| {
            let value = idx as f64 * step;
            (value, format!("{:.*}", decimals, value))
        })
        .collect()
}

/// Ticks on the first of January, every whole number of years.
fn date_ticks(min: f64, max: f64) -> Vec<(f64, String)> {
    let (Some(start), Some(end)) = (x_date(min), x_date(max)) else {
        return vec![];
    };
    let years = (end.year() - start.year()).max(1) as f64;
    let step = nice_step(years).max(1.) as i32;
    (start.year()..=end.year())
        .filter(|year| year.rem_euclid(step) == 0)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        .map(|date| (date_x(date), date.year().to_string()))
        .filter(|(x, _)| *x >= min && *x <= max)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn bar_chart() -> Chart {
        Chart::new("Clinic 1: Number of Deaths per Year")
            .with_labels("Year", "Number of Deaths")
            .with_series(Series::bar(
                "clinic 1",
                Color::RED,
                0.6,
                [(1841., 237.), (1842., 518.), (1843., 274.)],
            ))
    }

    #[test]
    fn bars() {
        let svg = bar_chart().to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches(r#"class="bar""#).count(), 3);
        assert!(svg.contains("Clinic 1: Number of Deaths per Year"));
        assert!(svg.contains(r#"fill="red""#));
        // 960 x 384 pixels for a 10 x 4 inch figure
        assert!(svg.contains(r#"width="960" height="384""#));
    }

    #[test]
    fn lines_break_at_undefined_values() {
        let chart = Chart::new("Proportion").with_series(Series::line(
            "clinic_1",
            Color::PURPLE,
            [(0., 0.1), (1., 0.2), (2., f64::NAN), (3., 0.1), (4., 0.05)],
        ));
        let svg = chart.to_svg();
        let path = svg
            .split(r#"class="line" d=""#)
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert_eq!(path.matches('M').count(), 2);
        assert_eq!(path.matches('L').count(), 2);
    }

    #[test]
    fn text_is_escaped() {
        let svg = Chart::new("Before < After & more").to_svg();
        assert!(svg.contains("Before &lt; After &amp; more"));
    }

    #[test]
    fn legend_lists_labelled_series() {
        let chart = Chart::new("Both")
            .with_legend()
            .with_series(Series::line("clinic_1", Color::RED, [(0., 1.), (1., 2.)]))
            .with_series(Series::line("clinic_2", Color::GREEN, [(0., 2.), (1., 1.)]));
        let svg = chart.to_svg();
        assert!(svg.contains(r#"class="legend""#));
        assert!(svg.contains(">clinic_1</text>"));
        assert!(svg.contains(">clinic_2</text>"));
        assert!(!bar_chart().to_svg().contains(r#"class="legend""#));
    }

    #[test]
    fn date_axis_ticks_on_years() {
        let start = date_x(NaiveDate::from_ymd_opt(1841, 1, 1).unwrap());
        let end = date_x(NaiveDate::from_ymd_opt(1849, 3, 1).unwrap());
        let ticks = date_ticks(start, end);
        let labels: Vec<_> = ticks.iter().map(|(_, l)| l.as_str()).collect();
        assert!(labels.contains(&"1842"));
        assert!(labels.contains(&"1848"));
        assert!(ticks.iter().all(|(x, _)| *x >= start && *x <= end));
    }

    #[test]
    fn tick_steps_are_round() {
        assert_eq!(nice_step(6.), 1.);
        assert_eq!(nice_step(600.), 100.);
        assert!((nice_step(0.12) - 0.02).abs() < 1e-12);
        let ticks = number_ticks(0., 0.12);
        assert_eq!(ticks.first().map(|(_, l)| l.as_str()), Some("0.00"));
        assert!(ticks.iter().all(|(v, _)| *v >= 0. && *v <= 0.12 + 1e-9));
    }

    #[test]
    fn file_names() {
        assert_eq!(
            bar_chart().file_name(),
            "clinic_1_number_of_deaths_per_year.svg"
        );
        assert_eq!(Chart::new("!!").file_name(), "chart.svg");
    }

    #[test]
    fn saving() {
        let dir = tempfile::tempdir().unwrap();
        let chart = bar_chart();
        let path = chart.save(dir.path(), false).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("</svg>"));
        assert!(chart.save(dir.path(), false).is_err());
        assert!(chart.save(dir.path(), true).is_ok());
    }
}
