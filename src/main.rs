
use log::{LevelFilter, error, info};
use std::path::Path;
use std::time::Instant;

use abploidy::cli::core::{Commands, get_cli};
use abploidy::cli::extraction::ExtractionArgs;
use abploidy::cli::frequencies::{FrequenciesSettings, check_frequencies_settings};
use abploidy::cli::ploidy::{PloidySettings, check_ploidy_settings};
use abploidy::data_types::variant_tensor::{ExtractionMode, VariantTensor};
use abploidy::mixture::MixtureConfigBuilder;
use abploidy::parsing::population_map::PopulationMap;
use abploidy::parsing::vcf_reader::{VcfDimensions, scan_vcf_file};
use abploidy::ploidy_solver::{PloidyConfigBuilder, build_ploidy_table, estimate_ploidy};
use abploidy::tensor_extractor::{ExtractionConfigBuilder, extract_vcf_file};
use abploidy::util::json_io::save_json;
use abploidy::writers::fit_report::save_fit_report;
use abploidy::writers::layer_dump::write_layer_dumps;
use abploidy::writers::ploidy_table::{PLOIDY_TABLE_FILENAME, write_ploidy_table};

/// Sets up env_logger at the requested verbosity
fn init_logging(verbosity: u8) {
    let filter_level: LevelFilter = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();
}

/// Creates a folder or exits with an IO error
fn create_folder(folder: &Path, label: &str) {
    info!("Creating {label} at {folder:?}...");
    if let Err(e) = std::fs::create_dir_all(folder) {
        error!("Error while creating {label}: {e}");
        std::process::exit(exitcode::IOERR);
    }
}

/// Creates the debug folder and saves the CLI options into it
fn save_debug_settings<T: serde::Serialize>(settings: &T, debug_folder: Option<&Path>) {
    if let Some(debug_folder) = debug_folder {
        create_folder(debug_folder, "debug folder");
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(settings, &cli_json) {
            error!("Error while saving CLI options: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }
}

/// Loads the population map, pre-scans the VCF, and extracts the tensor; exits on any failure
fn load_tensor(args: &ExtractionArgs, mode: ExtractionMode, track_positions: bool) -> (PopulationMap, VcfDimensions, VariantTensor) {
    info!("Loading population map...");
    let population_map = match PopulationMap::from_csv(&args.population_map_fn) {
        Ok(pm) => pm,
        Err(e) => {
            error!("Error while loading population map: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    for (population, individuals) in population_map.populations().iter() {
        info!("\t{population}: {} individuals", individuals.len());
    }

    let filters = match args.filter_config() {
        Ok(f) => f,
        Err(e) => {
            error!("Error while building filter config: {e:#}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let extraction_config = match ExtractionConfigBuilder::default()
        .mode(mode)
        .filters(filters)
        .pass_flag(args.pass_flag.clone())
        .track_positions(track_positions)
        .build() {
        Ok(ec) => ec,
        Err(e) => {
            error!("Error while building extraction config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    info!("Scanning VCF dimensions...");
    let dimensions = match scan_vcf_file(&args.vcf_fn, &population_map, args.id_mode(), &args.pass_flag) {
        Ok(d) => d,
        Err(e) => {
            error!("Error while scanning VCF: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };

    info!("Extracting {} values...", mode);
    let tensor = match extract_vcf_file(&args.vcf_fn, &dimensions, &extraction_config) {
        Ok(t) => t,
        Err(e) => {
            error!("Error while extracting VCF values: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };

    (population_map, dimensions, tensor)
}

fn run_frequencies(settings: FrequenciesSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);

    let settings = match check_frequencies_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    if let Some(output_folder) = settings.output_folder.as_ref() {
        create_folder(output_folder, "output folder");
    }
    save_debug_settings(&settings, settings.extraction.debug_folder.as_deref());

    let (_population_map, dimensions, tensor) = load_tensor(&settings.extraction, settings.extraction_mode, settings.track_positions);

    if let Some(output_folder) = settings.output_folder.as_ref() {
        if let Err(e) = write_layer_dumps(output_folder, &tensor, dimensions.columns()) {
            error!("Error while saving layer dumps: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }

    info!("Frequencies completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_ploidy(settings: PloidySettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);

    let settings = match check_ploidy_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    // build our configuration before touching any data
    let regime = match settings.constraint_regime() {
        Ok(r) => r,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    let mixture_config = match MixtureConfigBuilder::default()
        .evidence_margin(settings.evidence_margin)
        .build() {
        Ok(mc) => mc,
        Err(e) => {
            error!("Error while building mixture config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let ploidy_config = match PloidyConfigBuilder::default()
        .ploidy_levels(settings.ploidy_levels.clone())
        .model_constraints(regime)
        .min_sites(settings.min_sites)
        .mixture_config(mixture_config)
        .build() {
        Ok(pc) => pc,
        Err(e) => {
            error!("Error while building ploidy config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    if let Err(e) = ploidy_config.validate() {
        error!("Error while verifying settings: {e:#}");
        std::process::exit(exitcode::CONFIG);
    }

    create_folder(&settings.output_folder, "output folder");
    save_debug_settings(&settings, settings.extraction.debug_folder.as_deref());

    let (population_map, dimensions, tensor) = load_tensor(&settings.extraction, ExtractionMode::AlleleBalance, false);
    if let Err(e) = write_layer_dumps(&settings.output_folder, &tensor, dimensions.columns()) {
        error!("Error while saving layer dumps: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    info!("Estimating ploidy for {} individuals...", dimensions.n_individuals());
    let estimates = match estimate_ploidy(&tensor, dimensions.columns(), &population_map, &ploidy_config) {
        Ok(e) => e,
        Err(e) => {
            error!("Error while estimating ploidy: {e:#}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    info!("Saving fit reports...");
    for estimate in estimates.iter() {
        if let Some(mixture) = estimate.mixture() {
            if let Err(e) = save_fit_report(&settings.output_folder, estimate.call().individual(), mixture, estimate.mixed_model()) {
                error!("Error while saving fit report: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    }

    let table = build_ploidy_table(&estimates);
    let table_fn = settings.output_folder.join(PLOIDY_TABLE_FILENAME);
    info!("Saving ploidy table to {table_fn:?}...");
    if let Err(e) = write_ploidy_table(&table_fn, &table) {
        error!("Error while saving ploidy table: {e:#}");
        std::process::exit(exitcode::IOERR);
    }
    info!("Individuals with a ploidy estimate: {} / {}", table.num_called(), table.len());

    info!("Ploidy completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Frequencies(settings) => {
            run_frequencies(*settings);
        },
        Commands::Ploidy(settings) => {
            run_ploidy(*settings);
        }
    }

    info!("Process finished successfully.");
}
