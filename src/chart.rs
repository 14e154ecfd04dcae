use std::path::Path;

use anyhow::{Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use plotters::prelude::*;
use tracing::info;

use crate::stats::{HourlyCount, HourlyDifficulty, HourlyVolume};

const SIZE: (u32, u32) = (1500, 1000);
const ORANGE: RGBColor = RGBColor(255, 165, 0);

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%m-%d %H:%M").to_string()
}

/// Value range with some headroom; flat or empty series still get a visible band.
fn value_range(values: impl Iterator<Item = f64>, from_zero: bool) -> std::ops::Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let min = if from_zero { min.min(0.0) } else { min };
    let pad = match max - min {
        span if span > 0.0 => span * 0.05,
        _ => max.abs().max(1.0) * 0.05,
    };
    (if from_zero { min } else { min - pad })..(max + pad)
}

/// Renders three stacked panels (volume and fees, transactions per hour,
/// closing difficulty) sharing a time axis into an SVG file.
pub fn render(
    path: &Path,
    volume: &[HourlyVolume],
    counts: &[HourlyCount],
    difficulty: &[HourlyDifficulty],
) -> Result<()> {
    let hours = volume
        .iter()
        .map(|v| v.hour)
        .chain(counts.iter().map(|c| c.hour))
        .chain(difficulty.iter().map(|d| d.hour));
    let (Some(first), Some(last)) = (hours.clone().min(), hours.max()) else {
        bail!("Nothing to plot");
    };
    let x_range = (first - TimeDelta::minutes(30))..(last + TimeDelta::minutes(30));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 1));

    let mut chart = ChartBuilder::on(&panels[0])
        .caption("Hourly Transaction Volume and Fees", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(80)
        .build_cartesian_2d(
            x_range.clone(),
            value_range(
                volume
                    .iter()
                    .flat_map(|v| [v.hourly_volume, v.hourly_fees]),
                true,
            ),
        )?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Value")
        .x_label_formatter(&format_time)
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            volume.iter().map(|v| (v.hour, v.hourly_volume)),
            &BLUE,
        ))?
        .label("Hourly Volume")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .draw_series(LineSeries::new(
            volume.iter().map(|v| (v.hour, v.hourly_fees)),
            &GREEN,
        ))?
        .label("Hourly Fees")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    let mut chart = ChartBuilder::on(&panels[1])
        .caption("Number of Transactions per Hour", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(80)
        .build_cartesian_2d(
            x_range.clone(),
            value_range(counts.iter().map(|c| c.transactions_per_hour as f64), true),
        )?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Number of Transactions")
        .x_label_formatter(&format_time)
        .draw()?;
    chart
        .draw_series(counts.iter().map(|c| {
            Rectangle::new(
                [
                    (c.hour - TimeDelta::minutes(20), 0.0),
                    (c.hour + TimeDelta::minutes(20), c.transactions_per_hour as f64),
                ],
                ORANGE.filled(),
            )
        }))?
        .label("Transactions per Hour")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], ORANGE.filled()));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    let mut chart = ChartBuilder::on(&panels[2])
        .caption("Hourly Closing Difficulty", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(80)
        .build_cartesian_2d(
            x_range,
            value_range(difficulty.iter().filter_map(|d| d.closing_difficulty), false),
        )?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Difficulty")
        .x_label_formatter(&format_time)
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            difficulty
                .iter()
                .filter_map(|d| d.closing_difficulty.map(|v| (d.hour, v))),
            &RED,
        ))?
        .label("Closing Difficulty")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Chart written to {}", path.display());
    Ok(())
}
