//! Combine command implementation.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use strata_core::{
    ColumnDefinition, CombineOptions, CombineRequest, Combiner, Config, PartialSources,
};
use tracing::info;

/// Schema file of the combine command.
#[derive(Debug, Deserialize)]
pub struct SchemaDocument {
    /// Metric definition.
    pub metric: ColumnDefinition,
    /// Dimension definitions.
    #[serde(default)]
    pub dimensions: Vec<ColumnDefinition>,
}

/// Runs the combine command.
pub fn run(
    date: &str,
    schema: &Path,
    output: &Path,
    zip: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema: SchemaDocument = serde_json::from_str(&std::fs::read_to_string(schema)?)?;
    let sources = match zip {
        Some(archive) => {
            info!("Combining partial files from archive {:?}", archive);
            PartialSources::Zip(archive)
        }
        None => {
            info!("Combining {} partial files", files.len());
            PartialSources::Files(files)
        }
    };
    let request = CombineRequest {
        date: date.to_string(),
        metric: schema.metric,
        dimensions: schema.dimensions,
    };

    let summary =
        Combiner::new(Config::default())?.combine(request, &sources, output, CombineOptions::default())?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
