//! Inspect command implementation.

use std::path::Path;
use strata_core::{AxisType, Config, FileHeader, Reader};

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let header = Reader::new(Config::default())?.file_metadata(path)?;
    let size = std::fs::metadata(path)?.len();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&header)?);
        }
        _ => {
            print!("{}", render_text(path, size, &header)?);
        }
    }

    Ok(())
}

fn render_text(
    path: &Path,
    size: u64,
    header: &FileHeader,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut out = String::new();
    out.push_str(&format!("File: {}\n", path.display()));
    out.push_str(&format!("Size: {}\n", format_bytes(size)));
    out.push_str(&format!("Date: {}\n", header.date));
    out.push_str(&format!("Metric: {}\n", header.metric));
    out.push_str(&format!("Status: {}\n", header.status));
    out.push_str(&format!("Format version: {}\n", header.lib_version));
    if let Some(count) = header.count {
        out.push_str(&format!("Rows: {count}\n"));
    }
    if let (Some(min), Some(max), Some(sum)) = (header.min, header.max, header.sum) {
        out.push_str(&format!(
            "Metric min/max/sum: {}/{}/{}\n",
            serde_json::to_string(&min)?,
            serde_json::to_string(&max)?,
            serde_json::to_string(&sum)?
        ));
    }
    if header.column_meta.is_some() {
        out.push_str("\nColumns:\n");
        for (name, meta) in header.columns()? {
            out.push_str(&format!(
                "  {:>3}  {:<24} {:<9} {:<8} offset {}\n",
                meta.index,
                name,
                axis_name(meta.definition.axis_type()),
                meta.definition.data_type().as_str(),
                meta.offset
            ));
        }
    }
    Ok(out)
}

fn axis_name(axis: AxisType) -> &'static str {
    match axis {
        AxisType::Metric => "metric",
        AxisType::Dimension => "dimension",
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
