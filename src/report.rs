use std::fmt::{self, Display, Write};

use crate::{
    money::format_percent,
    pipeline::MetricReport,
    rank::{Page, Proportion, RankedEntry},
    Metric, Result,
};

const BAR_WIDTH: usize = 40;

/// Draws a [`MetricReport`] as a title followed by one section per page.
///
/// [`render`] drives a renderer. It calls [`Renderer::reclaim`] after the title,
/// after each page, and once more at the end.
pub trait Renderer {
    /// Draws the title page: metric, period and overall total.
    ///
    /// # Errors
    ///
    /// Returns any error from writing the output.
    fn title(&mut self, report: &MetricReport) -> Result<()>;

    /// Draws one page of the ranking.
    ///
    /// # Errors
    ///
    /// Returns any error from writing the output.
    fn page(&mut self, report: &MetricReport, page: &Page) -> Result<()>;

    /// Releases resources held for the section just drawn.
    fn reclaim(&mut self) {}
}

/// Renders `report` with `renderer`, title first and then every page in order.
///
/// # Errors
///
/// Returns the first error from the renderer; nothing more is drawn after it.
pub fn render<R: Renderer + ?Sized>(report: &MetricReport, renderer: &mut R) -> Result<()> {
    renderer.title(report)?;
    renderer.reclaim();
    for page in &report.pages {
        renderer.page(report, page)?;
        renderer.reclaim();
    }
    renderer.reclaim();
    Ok(())
}

/// Renders reports as plain text tables, with text bar charts.
#[derive(Debug, Default)]
pub struct TextRenderer<W> {
    out: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn table(&mut self, metric: Metric, entries: &[RankedEntry]) -> fmt::Result {
        let values: Vec<String> = entries.iter().map(|e| with_unit(metric, e.value)).collect();
        let value_header = format!("{} ({})", metric.name(), metric.unit());
        let kind_w = column_width("Type", entries.iter().map(|e| e.identity.kind()));
        let label_w = column_width("Description", entries.iter().map(|e| e.label.as_str()));
        let value_w = column_width(&value_header, values.iter().map(String::as_str));
        writeln!(
            self.out,
            "{:>4} {:kind_w$} {:label_w$} {:>6} {:>value_w$}",
            "#", "Type", "Description", "Sales", value_header
        )?;
        let length = kind_w + label_w + value_w + 14;
        writeln!(self.out, "{:-<length$}", "")?;
        for (entry, value) in entries.iter().zip(&values) {
            writeln!(
                self.out,
                "{:>4} {:kind_w$} {:label_w$} {:>6} {value:>value_w$}",
                entry.position,
                entry.identity.kind(),
                entry.label,
                entry.count,
            )?;
        }
        writeln!(self.out, "{:-<length$}", "")
    }

    fn shares(&mut self, page: &Page) -> fmt::Result {
        writeln!(self.out, "Share")?;
        if page.proportion != Proportion::Drawable {
            return writeln!(self.out, "  insufficient data for chart");
        }
        let total: f64 = page.entries.iter().map(|e| e.value).sum();
        let label_w = column_width("", page.entries.iter().map(|e| e.label.as_str()));
        for entry in &page.entries {
            let share = format_percent(entry.value / total * 100.0);
            writeln!(self.out, "{:>4} {:label_w$} {share:>8}", entry.position, entry.label)?;
        }
        Ok(())
    }

    fn trends(&mut self, report: &MetricReport, page: &Page) -> fmt::Result {
        writeln!(self.out, "Weekly trend")?;
        for entry in &page.entries {
            let series = report.series(&entry.identity);
            write!(self.out, "{:>4} {}:", entry.position, entry.label)?;
            if series.is_empty() {
                writeln!(self.out, " no weekly data")?;
                continue;
            }
            for (i, (week, value)) in series.iter().enumerate() {
                let sep = if i == 0 { " " } else { " | " };
                write!(
                    self.out,
                    "{sep}{} {}",
                    week.format("%d/%m"),
                    report.metric.format(*value)
                )?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn bars(&mut self, metric: Metric, entries: &[RankedEntry]) -> fmt::Result {
        writeln!(self.out, "Chart")?;
        let largest = entries.iter().map(|e| e.value.abs()).fold(0.0, f64::max);
        let label_w = column_width("", entries.iter().map(|e| e.label.as_str()));
        let width = BAR_WIDTH;
        for entry in entries {
            let drawn = bar(entry.value, largest);
            writeln!(
                self.out,
                "{:>4} {:label_w$} |{drawn:width$} {}",
                entry.position,
                entry.label,
                with_unit(metric, entry.value)
            )?;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn title(&mut self, report: &MetricReport) -> Result<()> {
        let name = report.metric.name().to_uppercase();
        writeln!(self.out, "SALES RANKING - {name}")?;
        if let Some(period) = report.period {
            writeln!(self.out, "{period}")?;
        }
        writeln!(self.out, "{name} (TOTAL): {}", with_unit(report.metric, report.total))?;
        Ok(())
    }

    fn page(&mut self, report: &MetricReport, page: &Page) -> Result<()> {
        let (first, last) = page.span();
        writeln!(self.out)?;
        writeln!(self.out, "Ranking {first}-{last}")?;
        self.table(report.metric, &page.entries)?;
        writeln!(self.out)?;
        self.shares(page)?;
        writeln!(self.out)?;
        self.trends(report, page)?;
        writeln!(self.out)?;
        self.bars(report.metric, &page.entries)?;
        Ok(())
    }
}

impl Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, &mut TextRenderer::new(f)).map_err(|_| fmt::Error)
    }
}

/// Formats `value` with the unit of `metric` when the format itself has none.
fn with_unit(metric: Metric, value: f64) -> String {
    match metric {
        Metric::Tonnage => format!("{} {}", metric.format(value), metric.unit()),
        Metric::Revenue | Metric::Margin => metric.format(value),
    }
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(|c| c.chars().count())
        .chain([header.chars().count()])
        .max()
        .unwrap_or_default()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bar(value: f64, largest: f64) -> String {
    if largest <= 0.0 {
        return String::new();
    }
    let len = (value.abs() / largest * BAR_WIDTH as f64).round() as usize;
    let fill = if value < 0.0 { '-' } else { '#' };
    std::iter::repeat(fill).take(len.min(BAR_WIDTH)).collect()
}
