
use anyhow::Context;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::mixed_model::MixedModelFit;
use crate::mixture::selection::PloidyFit;

/// Suffix for the per-individual diagnostics
pub const FIT_REPORT_SUFFIX: &str = "fit.txt";

/// Path of the fit report for an individual
pub fn fit_report_path(output_folder: &Path, individual: &str) -> PathBuf {
    output_folder.join(format!("{individual}.{FIT_REPORT_SUFFIX}"))
}

fn format_values(values: &[f64]) -> String {
    format!("[{}]", values.iter().map(|v| format!("{v:.6}")).join(", "))
}

/// Writes one block per candidate ploidy, then the selected ploidy and the site class test if one was run
/// # Arguments
/// * `writer` - the output handle
/// * `individual` - identifier for the header line
/// * `mixture` - all candidate fits
/// * `mixed_model` - optional site class test
pub fn write_fit_report<W: Write>(mut writer: W, individual: &str, mixture: &PloidyFit, mixed_model: Option<&MixedModelFit>) -> std::io::Result<()> {
    writeln!(writer, "individual: {individual}")?;
    for candidate in mixture.candidates().iter() {
        let model = candidate.model();
        writeln!(writer, "ploidy: {}", candidate.ploidy())?;
        writeln!(writer, "\tmeans: {}", format_values(model.means()))?;
        writeln!(writer, "\tcovariances: {}", format_values(model.variances()))?;
        writeln!(writer, "\tweights: {}", format_values(model.weights()))?;
        writeln!(writer, "\tmean_log_likelihood: {:.6}", model.mean_log_likelihood())?;
        writeln!(writer, "\tbic: {:.6}", candidate.bic())?;
        writeln!(writer, "\titerations: {}", model.n_iterations())?;
        writeln!(writer, "\tconverged: {}", model.converged())?;
    }
    writeln!(writer, "selected_ploidy: {}", mixture.best_ploidy())?;

    if let Some(fit) = mixed_model {
        writeln!(writer, "mixed_model:")?;
        writeln!(writer, "\tintercept: {:.6}", fit.intercept())?;
        writeln!(writer, "\tref_slope: {:.6}", fit.ref_slope())?;
        writeln!(writer, "\tresidual_variance: {:.6}", fit.residual_variance())?;
        writeln!(writer, "\tgroup_variance: {:.6}", fit.group_variance())?;
        for effect in fit.random_effects().iter() {
            writeln!(writer, "\trandom_effect_{}: {:.6} (n={})", effect.site_class(), effect.effect(), effect.n_sites())?;
        }
        writeln!(writer, "\tlog_likelihood: {:.6}", fit.log_likelihood())?;
        writeln!(writer, "\tnull_log_likelihood: {:.6}", fit.null_log_likelihood())?;
        writeln!(writer, "\tlrt_statistic: {:.6}", fit.lrt_statistic())?;
        writeln!(writer, "\tdegrees_of_freedom: {}", fit.degrees_of_freedom())?;
        writeln!(writer, "\tp_value: {:e}", fit.p_value())?;
    }
    Ok(())
}

/// Creates the report file and writes it
/// # Errors
/// * if the file cannot be created or written
pub fn save_fit_report(output_folder: &Path, individual: &str, mixture: &PloidyFit, mixed_model: Option<&MixedModelFit>) -> anyhow::Result<()> {
    let filename = fit_report_path(output_folder, individual);
    let file = File::create(&filename)
        .with_context(|| format!("Error while creating {filename:?}:"))?;
    let mut writer = BufWriter::new(file);
    write_fit_report(&mut writer, individual, mixture, mixed_model)
        .with_context(|| format!("Error while writing {filename:?}:"))?;
    writer.flush()
        .with_context(|| format!("Error while flushing output to {filename:?}:"))?;
    Ok(())
}
