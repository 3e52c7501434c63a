//! Bar and line charts rendered to PNG with `plotters`.
//!
//! Each year owns a unit-wide slot centred on the year itself, labelled
//! only at the years present. The spend line of the correlation chart is
//! plotted at the slot centres on a secondary axis.

use std::path::Path;

use cambs_market_config::ensure_dir;
use cambs_market_models::YearlyAggregate;
use plotters::coord::Shift;
use plotters::coord::combinators::WithKeyPoints;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::VisualizeError;
use crate::spend::CorrelationRow;

const CORNFLOWER_BLUE: RGBColor = RGBColor(100, 149, 237);
const DARK_ORANGE: RGBColor = RGBColor(255, 140, 0);

const FONT: &str = "sans-serif";

const CORRELATION_SIZE: (u32, u32) = (1400, 800);
const GROWTH_SIZE: (u32, u32) = (1200, 700);

/// Half the width of a bar, in years.
const BAR_HALF_WIDTH: f64 = 0.4;

/// Upper bound of a value axis: 10% headroom over the largest value.
#[must_use]
pub fn axis_max(values: impl IntoIterator<Item = f64>) -> f64 {
    let max = values.into_iter().fold(0.0_f64, f64::max);
    if max > 0.0 { max * 1.1 } else { 1.0 }
}

/// `n` colours sampled evenly from viridis, endpoints excluded, darkest
/// first.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn viridis_palette(n: usize) -> Vec<RGBColor> {
    let step = 1.0 / (n as f64 + 1.0);
    (1..=n)
        .map(|i| ViridisRGB::get_color(step * i as f64))
        .collect()
}

fn year_range(years: impl IntoIterator<Item = i32>) -> Option<(i32, i32)> {
    years.into_iter().fold(None, |acc, year| match acc {
        None => Some((year, year)),
        Some((first, last)) => Some((first.min(year), last.max(year))),
    })
}

/// Year axis spanning half a slot either side of `first..=last`, with a
/// tick at each of `years`.
fn year_axis((first, last): (i32, i32), years: &[i32]) -> WithKeyPoints<RangedCoordf64> {
    (f64::from(first) - 0.5..f64::from(last) + 0.5)
        .with_key_points(years.iter().copied().map(f64::from).collect())
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn year_label(value: &f64) -> String {
    format!("{value:.0}")
}

/// Title of the development-versus-spend chart.
#[must_use]
pub fn correlation_title(rows: &[CorrelationRow]) -> String {
    match year_range(rows.iter().map(|r| r.year)) {
        Some((first, last)) => {
            format!("Cambridgeshire Development vs. Cambridge Market Spend ({first}-{last})")
        }
        None => "Cambridgeshire Development vs. Cambridge Market Spend".to_string(),
    }
}

/// Title of the development growth chart.
#[must_use]
pub fn growth_title(growth: &[YearlyAggregate]) -> String {
    match year_range(growth.iter().map(|g| g.year)) {
        Some((first, last)) => {
            format!("Total Dwellings in Approved Plans per Year ({first}-{last})")
        }
        None => "Total Dwellings in Approved Plans per Year".to_string(),
    }
}

fn open_png(
    png: &Path,
    size: (u32, u32),
) -> Result<DrawingArea<BitMapBackend<'_>, Shift>, VisualizeError> {
    if let Some(parent) = png.parent() {
        ensure_dir(parent).map_err(|e| VisualizeError::io(parent, e))?;
    }
    let root = BitMapBackend::new(png, size).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

/// One bar centred in the slot of `year`.
fn year_bar(year: i32, value: f64, color: RGBColor) -> Rectangle<(f64, f64)> {
    let x = f64::from(year);
    Rectangle::new(
        [(x - BAR_HALF_WIDTH, value), (x + BAR_HALF_WIDTH, 0.0)],
        color.filled(),
    )
}

/// Draws dwellings as bars on the left axis and spend as a dashed line
/// with markers on the right axis, one slot per year.
///
/// # Errors
///
/// Returns [`VisualizeError`] if the chart cannot be drawn or written.
pub fn draw_correlation_chart(rows: &[CorrelationRow], png: &Path) -> Result<(), VisualizeError> {
    let title = correlation_title(rows);
    let root = open_png(png, CORRELATION_SIZE)?;

    let Some(span) = year_range(rows.iter().map(|r| r.year)) else {
        root.titled(&title, (FONT, 28).into_font())?;
        root.present()?;
        log::warn!("Correlation chart at {} has no data", png.display());
        return Ok(());
    };
    let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    let dwellings_max = axis_max(rows.iter().map(|r| r.total_dwellings_in_plans));
    let spend_max = axis_max(rows.iter().map(|r| r.total_spend_millions));

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, (FONT, 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .right_y_label_area_size(90)
        .build_cartesian_2d(year_axis(span, &years), 0f64..dwellings_max)?
        .set_secondary_coord(year_axis(span, &years), 0f64..spend_max);

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Year")
        .x_label_formatter(&year_label)
        .y_desc("Total Dwellings in Approved Plans")
        .y_label_formatter(&|v| format!("{v:.0}"))
        .axis_desc_style((FONT, 18, &CORNFLOWER_BLUE))
        .draw()?;

    chart
        .configure_secondary_axes()
        .y_desc("Total Market Spend (£ Millions)")
        .y_label_formatter(&|v| format!("{v:.1}"))
        .axis_desc_style((FONT, 18, &DARK_ORANGE))
        .draw()?;

    chart.draw_series(
        rows.iter()
            .map(|r| year_bar(r.year, r.total_dwellings_in_plans, CORNFLOWER_BLUE)),
    )?;

    let spend: Vec<(f64, f64)> = rows
        .iter()
        .map(|r| (f64::from(r.year), r.total_spend_millions))
        .collect();
    chart.draw_secondary_series(DashedLineSeries::new(
        spend.clone(),
        12,
        8,
        DARK_ORANGE.stroke_width(3),
    ))?;
    chart.draw_secondary_series(
        spend
            .into_iter()
            .map(|point| Circle::new(point, 6, DARK_ORANGE.filled())),
    )?;

    root.present()?;
    log::info!("Correlation chart saved to {}", png.display());
    Ok(())
}

/// Draws total dwellings per permission year as viridis-coloured bars,
/// oldest year first.
///
/// # Errors
///
/// Returns [`VisualizeError`] if the chart cannot be drawn or written.
pub fn draw_growth_chart(growth: &[YearlyAggregate], png: &Path) -> Result<(), VisualizeError> {
    let title = growth_title(growth);
    let root = open_png(png, GROWTH_SIZE)?;

    let Some(span) = year_range(growth.iter().map(|g| g.year)) else {
        root.titled(&title, (FONT, 28).into_font())?;
        root.present()?;
        log::warn!("Growth chart at {} has no data", png.display());
        return Ok(());
    };

    let mut rows: Vec<&YearlyAggregate> = growth.iter().collect();
    rows.sort_by_key(|g| g.year);
    let years: Vec<i32> = rows.iter().map(|g| g.year).collect();
    let palette = viridis_palette(rows.len());
    let max = axis_max(rows.iter().map(|g| g.total_dwellings_in_plans));

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, (FONT, 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(year_axis(span, &years), 0f64..max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Year of Planning Permission")
        .x_label_formatter(&year_label)
        .y_desc("Total Number of Dwellings Approved")
        .y_label_formatter(&|v| format!("{v:.0}"))
        .axis_desc_style((FONT, 18))
        .draw()?;

    chart.draw_series(
        rows.iter()
            .zip(&palette)
            .map(|(g, color)| year_bar(g.year, g.total_dwellings_in_plans, *color)),
    )?;

    root.present()?;
    log::info!("Growth chart saved to {}", png.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn growth() -> Vec<YearlyAggregate> {
        vec![
            YearlyAggregate {
                year: 2021,
                total_permissions_granted: 2,
                total_dwellings_in_plans: 42.0,
            },
            YearlyAggregate {
                year: 2019,
                total_permissions_granted: 2,
                total_dwellings_in_plans: 8.0,
            },
        ]
    }

    fn correlation() -> Vec<CorrelationRow> {
        vec![
            CorrelationRow {
                year: 2019,
                total_dwellings_in_plans: 8.0,
                total_spend_millions: 12.5,
            },
            CorrelationRow {
                year: 2021,
                total_dwellings_in_plans: 42.0,
                total_spend_millions: 20.0,
            },
        ]
    }

    const fn rgb(color: RGBColor) -> Rgb<u8> {
        Rgb([color.0, color.1, color.2])
    }

    fn count_matching(
        img: &RgbImage,
        rows: std::ops::Range<u32>,
        pred: impl Fn(&Rgb<u8>) -> bool,
    ) -> usize {
        rows.flat_map(|y| (0..img.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| pred(img.get_pixel(x, y)))
            .count()
    }

    fn not_white(p: &Rgb<u8>) -> bool {
        *p != Rgb([255, 255, 255])
    }

    #[test]
    fn axis_has_ten_percent_headroom() {
        assert!((axis_max([10.0, 42.0, 7.0]) - 46.2).abs() < 1e-9);
        assert!((axis_max(std::iter::empty()) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn viridis_runs_dark_to_light() {
        let palette = viridis_palette(3);
        assert_eq!(palette.len(), 3);
        let luma = |c: &RGBColor| u32::from(c.0) + u32::from(c.1) + u32::from(c.2);
        assert!(luma(&palette[0]) < luma(&palette[1]));
        assert!(luma(&palette[1]) < luma(&palette[2]));
        assert!(viridis_palette(0).is_empty());
    }

    #[test]
    fn year_axis_ticks_only_present_years() {
        let axis = year_axis((2012, 2021), &[2012, 2015, 2021]);
        assert_eq!(axis.bold_points(), [2012.0, 2015.0, 2021.0]);
        assert_eq!(axis.range(), 2011.5..2021.5);
        assert_eq!(year_label(&2015.0), "2015");
    }

    #[test]
    fn titles_carry_year_range() {
        assert_eq!(
            growth_title(&growth()),
            "Total Dwellings in Approved Plans per Year (2019-2021)"
        );
        assert_eq!(
            correlation_title(&correlation()),
            "Cambridgeshire Development vs. Cambridge Market Spend (2019-2021)"
        );
        assert_eq!(
            growth_title(&[]),
            "Total Dwellings in Approved Plans per Year"
        );
    }

    #[test]
    fn correlation_chart_draws_bars_line_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("charts").join("correlation.png");
        draw_correlation_chart(&correlation(), &png).unwrap();

        let img = image::open(&png).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), CORRELATION_SIZE);

        let all = 0..img.height();
        assert!(count_matching(&img, all.clone(), |p| *p == rgb(CORNFLOWER_BLUE)) > 1_000);
        assert!(count_matching(&img, all, |p| *p == rgb(DARK_ORANGE)) > 50);

        // Caption at the top, axis title and year labels at the bottom.
        assert!(count_matching(&img, 0..60, not_white) > 0);
        let h = img.height();
        assert!(count_matching(&img, h - 60..h, not_white) > 0);
    }

    #[test]
    fn growth_chart_has_title_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("growth.png");
        draw_growth_chart(
            &[
                YearlyAggregate {
                    year: 2012,
                    total_permissions_granted: 1,
                    total_dwellings_in_plans: 10.0,
                },
                YearlyAggregate {
                    year: 2021,
                    total_permissions_granted: 1,
                    total_dwellings_in_plans: 30.0,
                },
            ],
            &png,
        )
        .unwrap();

        let img = image::open(&png).unwrap().to_rgb8();
        let h = img.height();
        assert!(count_matching(&img, 0..60, not_white) > 0);
        assert!(count_matching(&img, h - 60..h, not_white) > 0);
    }

    #[test]
    fn growth_chart_colours_oldest_year_darkest() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("growth.png");
        draw_growth_chart(&growth(), &png).unwrap();

        let img = image::open(&png).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), GROWTH_SIZE);

        // Just above the x axis, the first bar colour met from the left is
        // the oldest year's.
        let palette: Vec<Rgb<u8>> = viridis_palette(2).into_iter().map(rgb).collect();
        let row = img.height() - 90;
        let first = (0..img.width())
            .map(|x| *img.get_pixel(x, row))
            .find(|p| palette.contains(p));
        assert_eq!(first, Some(palette[0]));
    }

    #[test]
    fn empty_chart_still_renders_title() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("empty.png");
        draw_growth_chart(&[], &png).unwrap();

        let img = image::open(&png).unwrap().to_rgb8();
        assert!(count_matching(&img, 0..60, not_white) > 0);
    }
}
