
use anyhow::Context;
use indicatif::ProgressIterator;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::data_types::variant_tensor::{IndividualLayers, VariantTensor};
use crate::parsing::sample_columns::SampleColumns;
use crate::util::progress_bar::get_progress_style;

/// Extension for the per-individual layer dump
pub const LAYER_DUMP_EXTENSION: &str = "txt";

/// One row of the dump, one per site written for the individual
#[derive(Serialize)]
struct LayerRow {
    value: f32,
    depth: u16,
    quality: u8,
    pass_filters: u8
}

/// Writes all four layers for one individual, one row per site written for them
/// # Arguments
/// * `filename` - the output path
/// * `layers` - the individual's view of the tensor
pub fn write_layer_dump(filename: &Path, layers: &IndividualLayers) -> csv::Result<()> {
    let mut csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(filename)?;

    for i in 0..layers.len() {
        let row = LayerRow {
            value: layers.values[i],
            depth: layers.depth[i],
            quality: layers.quality[i],
            pass_filters: u8::from(layers.pass_filter[i])
        };
        csv_writer.serialize(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Path of the layer dump for an individual
pub fn layer_dump_path(output_folder: &Path, individual: &str) -> PathBuf {
    output_folder.join(format!("{individual}.{LAYER_DUMP_EXTENSION}"))
}

/// Writes a layer dump for every individual in the tensor
/// # Arguments
/// * `output_folder` - existing folder to write into
/// * `tensor` - the extracted tensor
/// * `columns` - maps tensor individual indices to identifiers
/// # Errors
/// * if any file fails to write
pub fn write_layer_dumps(output_folder: &Path, tensor: &VariantTensor, columns: &SampleColumns) -> anyhow::Result<()> {
    info!("Writing {} layer dumps to {output_folder:?}...", columns.len());
    let style = get_progress_style();
    for (index, column) in columns.mapped().iter().enumerate().progress_with_style(style) {
        let Some(layers) = tensor.individual(index) else {
            anyhow::bail!("Individual index {index} ({}) is not in the tensor", column.individual());
        };
        let filename = layer_dump_path(output_folder, column.individual());
        write_layer_dump(&filename, &layers)
            .with_context(|| format!("Error while writing {filename:?}:"))?;
    }
    Ok(())
}
