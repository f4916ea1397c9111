use crate::core::aggregate::AggregationOutcome;
use crate::types::{NdviResult, SensorKind};
use chrono::NaiveDate;
use std::io::Write;

/// Fixed column widths of the summary tables; consumers parse these
/// positionally.
pub const ROI_WIDTH: usize = 10;
pub const CROP_WIDTH: usize = 8;
pub const AREA_WIDTH: usize = 14;
pub const VALUE_WIDTH: usize = 12;
/// A date column spans its mean and standard-deviation fields.
pub const DATE_WIDTH: usize = 2 * VALUE_WIDTH;

/// Verbose execution trace: one block per tile, then per ROI, then per
/// date, then per file.
pub struct TraceLog<W: Write> {
    out: W,
}

impl<W: Write> TraceLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn tile(&mut self, key: &str) -> NdviResult<()> {
        writeln!(self.out, "tile {}", key)?;
        Ok(())
    }

    pub fn roi(&mut self, code: i64, known_tiles: usize) -> NdviResult<()> {
        writeln!(self.out, "  roi {} (tiles: {})", code, known_tiles)?;
        Ok(())
    }

    pub fn date(&mut self, date: NaiveDate) -> NdviResult<()> {
        writeln!(self.out, "    date {}", date.format("%Y-%m-%d"))?;
        Ok(())
    }

    pub fn file(&mut self, filename: &str) -> NdviResult<()> {
        writeln!(self.out, "      file {}", filename)?;
        Ok(())
    }

    pub fn flush(&mut self) -> NdviResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Per-ROI attributes printed in the leading table columns.
#[derive(Debug, Clone, Copy)]
pub struct RoiInfo {
    pub code: i64,
    pub crop_code: i32,
    pub area: f64,
}

/// One fixed-width per-sensor summary table spanning the full requested
/// date range.
pub struct SummaryTable<'a> {
    pub sensor: SensorKind,
    pub sensor_tag: &'a str,
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub roi_code_increment: i64,
}

impl<'a> SummaryTable<'a> {
    fn days(&self) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = self.first;
        while current <= self.last {
            days.push(current);
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        days
    }

    /// Render the table: header line, right-justified header row, then one
    /// row per ROI holding at least one finalized value for this sensor,
    /// ascending by ROI code. Dates without data print literal NaN in both
    /// value columns.
    pub fn render<W: Write>(
        &self,
        out: &mut W,
        rois: &[RoiInfo],
        outcome: &AggregationOutcome,
    ) -> NdviResult<()> {
        let days = self.days();
        writeln!(
            out,
            "# NDVI summary [{}] {}..{} roi-code-increment={}",
            self.sensor_tag,
            self.first.format("%Y-%m-%d"),
            self.last.format("%Y-%m-%d"),
            self.roi_code_increment
        )?;

        write!(
            out,
            "{:>roi$}{:>crop$}{:>area$}",
            "roi",
            "crop",
            "area",
            roi = ROI_WIDTH,
            crop = CROP_WIDTH,
            area = AREA_WIDTH
        )?;
        for day in &days {
            // format before padding; chrono's formatter ignores field width
            let label = day.format("%Y-%m-%d").to_string();
            write!(out, "{:>width$}", label, width = DATE_WIDTH)?;
        }
        writeln!(out)?;

        for code in outcome.sensor_rois(self.sensor) {
            let info = rois.iter().find(|info| info.code == code);
            let (crop_code, area) = match info {
                Some(info) => (info.crop_code, info.area),
                None => continue,
            };
            write!(
                out,
                "{:>roi$}{:>crop$}{:>area$.1}",
                code,
                crop_code,
                area,
                roi = ROI_WIDTH,
                crop = CROP_WIDTH,
                area = AREA_WIDTH
            )?;
            for day in &days {
                match outcome.stats(code, self.sensor, *day) {
                    Some(stats) => write!(
                        out,
                        "{:>w$.3}{:>w$.3}",
                        stats.mean,
                        stats.std_dev,
                        w = VALUE_WIDTH
                    )?,
                    None => write!(out, "{:>w$}{:>w$}", "NaN", "NaN", w = VALUE_WIDTH)?,
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
