use std::collections::BTreeMap;
use std::fs::File;

use csv::Writer;
use log::info;

use crate::record::{QuakeRecord, Severity};

/// Write `records` to `filename` as CSV, one row per record.
pub fn save_to_csv(
    records: &[QuakeRecord],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;
    info!("Data saved to {}", filename);
    Ok(())
}

/// Aggregate view over a list of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub magnitude_range: (f64, f64),
    /// Oldest and newest event times.
    pub time_range: (String, String),
    pub top_places: Vec<(String, usize)>,
}

pub fn summarize(records: &[QuakeRecord]) -> Option<Summary> {
    let first = records.first()?;

    let mut by_severity = BTreeMap::new();
    let mut place_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut magnitude_range = (first.magnitude, first.magnitude);
    let mut time_range = (first.time.as_str(), first.time.as_str());

    for record in records {
        *by_severity.entry(record.severity).or_insert(0) += 1;
        if !record.place.is_empty() {
            *place_counts.entry(record.place.as_str()).or_insert(0) += 1;
        }
        magnitude_range.0 = magnitude_range.0.min(record.magnitude);
        magnitude_range.1 = magnitude_range.1.max(record.magnitude);
        // ISO-8601 UTC strings order lexically.
        time_range.0 = time_range.0.min(record.time.as_str());
        time_range.1 = time_range.1.max(record.time.as_str());
    }

    let mut top_places: Vec<_> = place_counts
        .into_iter()
        .map(|(place, count)| (place.to_string(), count))
        .collect();
    top_places.sort_by(|a, b| b.1.cmp(&a.1));
    top_places.truncate(3);

    Some(Summary {
        total: records.len(),
        by_severity,
        magnitude_range,
        time_range: (time_range.0.to_string(), time_range.1.to_string()),
        top_places,
    })
}

pub fn print_summary(records: &[QuakeRecord]) {
    let Some(summary) = summarize(records) else {
        println!("No records to summarize");
        return;
    };

    println!("\nSummary:");
    println!("Total events: {}", summary.total);
    for (severity, count) in &summary.by_severity {
        println!("  {}: {}", severity, count);
    }
    println!(
        "Magnitude range: {:.1} to {:.1}",
        summary.magnitude_range.0, summary.magnitude_range.1
    );
    println!("Time range: {} to {}", summary.time_range.0, summary.time_range.1);

    println!("Most active places:");
    for (place, count) in &summary.top_places {
        println!("  {}: {}", place, count);
    }
}
