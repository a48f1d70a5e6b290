use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;

use psm_rescore::config::{load_config, NormalizationKind, RescoreConfig};
use psm_rescore::enzyme::Enzyme;
use psm_rescore::io::output::write_results;
use psm_rescore::io::{
    read_pin_with_config, read_weights_file, write_results_file, write_weights_file, write_xml_file,
    PinReaderConfig, ResultKind,
};
use psm_rescore::psm_scorer::PsmScorer;

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let verbosity = matches.get_one::<u8>("verbose").copied().unwrap_or(1);
    env_logger::Builder::default()
        .filter_level(level_for(verbosity))
        .parse_env(env_logger::Env::default().filter_or("PSM_RESCORE_LOG", level_for(verbosity).as_str()))
        .init();

    let config = build_config(&matches)?;
    if let Err(e) = config.validate() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    match run(&matches, config) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("Rescoring failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn cli() -> Command {
    Command::new("psm-rescore")
        .version(clap::crate_version!())
        .about("Semi-supervised rescoring of peptide-spectrum matches with target/decoy FDR control")
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version")
                .action(ArgAction::Version),
        )
        .arg(
            Arg::new("pin")
                .help("Tab-delimited PSM input (.pin)")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file; command-line options override its values")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("cpos")
                .short('p')
                .long("Cpos")
                .help("Cost for positive examples. Default: chosen by cross-validation")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("cneg")
                .short('n')
                .long("Cneg")
                .help("Cost for negative examples. Only valid together with --Cpos; pinning both skips cross-validation")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("train_fdr")
                .short('F')
                .long("trainFDR")
                .help("FDR threshold for selecting positive training examples. Default: 0.01")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("test_fdr")
                .short('t')
                .long("testFDR")
                .help("FDR threshold for evaluating and reporting. Default: 0.01")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("max_iterations")
                .short('i')
                .long("maxiter")
                .help("Maximum number of training iterations. Default: 10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .short('S')
                .long("seed")
                .help("Seed of the cross-validation fold assignment. Default: 1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("unitnorm")
                .short('u')
                .long("unitnorm")
                .help("Normalize features to [0, 1] instead of to zero mean and unit variance")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("unique_peptides")
                .short('U')
                .long("unique-peptides")
                .help("Keep only the best scoring PSM of every peptide in the output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("enzyme")
                .short('e')
                .long("enzyme")
                .help("Enzyme used for the enzymatic features: no_enzyme, trypsin, chymotrypsin, thermolysin, proteinasek, pepsin, elastase, lys-n, lys-c, arg-c, asp-n or glu-c")
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new("enzyme_features")
                .long("enzyme-features")
                .help("Append enzymatic features (enzN, enzC, enzInt) to every PSM")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("weights")
                .short('w')
                .long("weights")
                .help("Write the learned weights to this file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("init_weights")
                .short('W')
                .long("init-weights")
                .help("Read initial weights from this file (the format written by --weights)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("default_direction")
                .short('V')
                .long("default-direction")
                .help("Signed 1-based feature number used as initial direction, e.g. -3 for low values of feature 3")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("override")
                .short('O')
                .long("override")
                .help("Keep the learned direction even when it finds fewer targets than the initial one")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("results")
                .short('r')
                .long("results")
                .help("Write target results to this file. Default: stdout")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decoy_results")
                .short('B')
                .long("decoy-results")
                .help("Write decoy results to this file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("xml_output")
                .short('X')
                .long("xml-output")
                .help("Write an XML report to this file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decoy_xml_output")
                .short('Z')
                .long("decoy-xml-output")
                .help("Include decoys in the XML report. Requires --xml-output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test_each_iteration")
                .short('R')
                .long("test-each-iteration")
                .help("Report the test-set performance after every iteration")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbosity: 0 errors only, 1 progress, 2 per-iteration details, 3 everything. Default: 1")
                .value_parser(clap::value_parser!(u8)),
        )
}

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Configuration file (or defaults) overridden by command-line options.
fn build_config(matches: &ArgMatches) -> Result<RescoreConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            log::info!("Using config: {:?}", path);
            load_config(path)?
        }
        None => RescoreConfig::default(),
    };

    if let Some(&cpos) = matches.get_one::<f64>("cpos") {
        config.cpos = Some(cpos);
    }
    if let Some(&cneg) = matches.get_one::<f64>("cneg") {
        config.cneg = Some(cneg);
    }
    if let Some(&fdr) = matches.get_one::<f64>("train_fdr") {
        config.selection_fdr = fdr;
    }
    if let Some(&fdr) = matches.get_one::<f64>("test_fdr") {
        config.test_fdr = fdr;
    }
    if let Some(&iterations) = matches.get_one::<usize>("max_iterations") {
        config.max_iterations = iterations;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = seed;
    }
    if let Some(&direction) = matches.get_one::<i32>("default_direction") {
        config.default_direction = Some(direction);
    }
    if let Some(name) = matches.get_one::<String>("enzyme") {
        config.enzyme = Enzyme::from_str(name).map_err(anyhow::Error::msg)?;
    }
    if matches.get_flag("unitnorm") {
        config.normalization = NormalizationKind::Unit;
    }
    if matches.get_flag("unique_peptides") {
        config.unique_peptides = true;
    }
    if matches.get_flag("enzyme_features") {
        config.enzyme_features = true;
    }
    if matches.get_flag("override") {
        config.override_direction = true;
    }
    if matches.get_flag("test_each_iteration") {
        config.report_each_iteration = true;
    }

    if matches.get_flag("decoy_xml_output") && matches.get_one::<PathBuf>("xml_output").is_none() {
        bail!("--decoy-xml-output requires --xml-output");
    }
    Ok(config)
}

fn run(matches: &ArgMatches, config: RescoreConfig) -> Result<()> {
    let pin_path: &PathBuf = matches
        .get_one("pin")
        .ok_or_else(|| anyhow::anyhow!("Missing input file"))?;
    log::info!("Reading PSMs from {:?}", pin_path);

    let reader_config = PinReaderConfig {
        enzyme: config.enzyme_features.then_some(config.enzyme),
        ..Default::default()
    };
    let pin = read_pin_with_config(pin_path, &reader_config)?;

    let init_weights = match matches.get_one::<PathBuf>("init_weights") {
        Some(path) => Some(read_weights_file(path)?),
        None => pin.default_direction.clone(),
    };

    let feature_names = pin.feature_names;
    let result = PsmScorer::new(config).run(pin.targets, pin.decoys, init_weights)?;

    if let Some(path) = matches.get_one::<PathBuf>("weights") {
        write_weights_file(path, &feature_names, &result.fold_weights, &result.raw_weights())?;
    }
    match matches.get_one::<PathBuf>("results") {
        Some(path) => write_results_file(path, &result.scores, ResultKind::Targets)?,
        None => write_results(BufWriter::new(io::stdout().lock()), &result.scores, ResultKind::Targets)?,
    }
    if let Some(path) = matches.get_one::<PathBuf>("decoy_results") {
        write_results_file(path, &result.scores, ResultKind::Decoys)?;
    }
    if let Some(path) = matches.get_one::<PathBuf>("xml_output") {
        let command_line = std::env::args().collect::<Vec<_>>().join(" ");
        write_xml_file(path, &result.scores, &command_line, matches.get_flag("decoy_xml_output"))?;
    }
    Ok(())
}
