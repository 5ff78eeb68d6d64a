use std::fs;
use std::path::Path;

use plotters::prelude::*;

use crate::audit::applied_modifiers;
use crate::errors::{GeoBidError, Result};

pub const HISTOGRAM_PATH: &str = "charts/modifier_histogram.png";

/// Histogram of every modifier an audit log says was added or updated
pub fn generate_modifier_histogram(audit_path: &Path) -> Result<()> {
    let modifiers = applied_modifiers(audit_path)?;
    fs::create_dir_all("charts").map_err(|e| GeoBidError::io(Path::new("charts"), e))?;
    let title = format!("Applied bid modifiers ({})", audit_path.display());
    create_single_histogram(&modifiers, &title, HISTOGRAM_PATH, "Bid modifier", &BLUE)
        .map_err(|e| GeoBidError::Chart { details: e.to_string() })
}

/// Helper function to create a single histogram
fn create_single_histogram(
    values: &[f64],
    title: &str,
    filename: &str,
    x_label: &str,
    color: &RGBColor,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    if values.is_empty() {
        return Err("Cannot create histogram: no modifiers were applied".into());
    }

    let min_val = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean_val = values.iter().sum::<f64>() / values.len() as f64;

    // every modifier clamped to the same bound still needs a visible bar
    let (low, high) = if max_val > min_val { (min_val, max_val) } else { (min_val - 0.05, max_val + 0.05) };

    let bins = bin_counts(values, low, high);
    let bin_width = (high - low) / NUM_BINS as f64;
    let max_count = *bins.iter().max().unwrap_or(&0);

    let root = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(low..high, 0u32..max_count + max_count / 10 + 1)?;

    chart.configure_mesh()
        .x_desc(x_label)
        .y_desc("Locations")
        .draw()?;

    chart.draw_series(
        bins.iter().enumerate().map(|(i, &count)| {
            let x0 = low + i as f64 * bin_width;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0), (x1, count)], color.filled())
        })
    )?
    .label(format!("Modifiers (n={})", values.len()))
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(mean_val, 0), (mean_val, max_count)],
        &BLACK,
    )))?
    .label(format!("Mean: {:.2}", mean_val))
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;

    println!("Histogram saved to {}", filename);
    println!("Min: {:.2}, Max: {:.2}, Mean: {:.2}", min_val, max_val, mean_val);

    Ok(())
}

const NUM_BINS: usize = 50;

fn bin_counts(values: &[f64], low: f64, high: f64) -> Vec<u32> {
    let bin_width = (high - low) / NUM_BINS as f64;
    let mut bins = vec![0u32; NUM_BINS];
    for &value in values {
        let bin_idx = ((value - low) / bin_width).floor() as usize;
        bins[bin_idx.min(NUM_BINS - 1)] += 1;
    }
    bins
}
