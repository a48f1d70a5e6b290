//! End-to-end runs through the library: read a .pin, rescore, write every
//! output format and read the weights back in.

use std::fmt::Write as _;
use std::fs;

use psm_rescore::config::RescoreConfig;
use psm_rescore::io::{
    read_pin, read_weights_file, write_results_file, write_weights_file, write_xml_file, ResultKind,
};
use psm_rescore::psm_scorer::PsmScorer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

/// Half of the targets score high on `score`, the rest look like decoys.
/// `deltCn` overlaps between the classes, so `score` alone is the best
/// single-feature direction.
fn synthetic_pin(n: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pin = String::from("SpecId\tLabel\tScanNr\tscore\tdeltCn\tnoise\tPeptide\tProteins\n");
    for i in 0..n {
        let shift = if i % 2 == 0 { 2.5 } else { 0.0 };
        writeln!(
            pin,
            "target_{i}\t1\t{i}\t{:.4}\t{:.4}\t{:.4}\tK.TARGET{i}PEPK.A\tPROT_{}",
            shift + rng.gen::<f64>(),
            0.02 * shift + rng.gen::<f64>() * 0.2,
            rng.gen::<f64>(),
            i % 7
        )
        .unwrap();
        writeln!(
            pin,
            "decoy_{i}\t-1\t{i}\t{:.4}\t{:.4}\t{:.4}\tR.DECOY{i}PEPR.G\tDECOY_PROT_{}",
            rng.gen::<f64>(),
            rng.gen::<f64>() * 0.2,
            rng.gen::<f64>(),
            i % 7
        )
        .unwrap();
    }
    pin
}

fn quick_config() -> RescoreConfig {
    RescoreConfig {
        max_iterations: 3,
        ..Default::default()
    }
}

#[test]
fn rescore_pin_and_write_outputs() {
    let dir = tempdir().unwrap();
    let pin_path = dir.path().join("input.pin");
    fs::write(&pin_path, synthetic_pin(120, 11)).unwrap();

    let pin = read_pin(&pin_path).unwrap();
    assert_eq!(pin.feature_names.len(), 3);
    let feature_names = pin.feature_names.clone();

    let result = PsmScorer::new(quick_config())
        .run(pin.targets, pin.decoys, None)
        .unwrap();
    assert!(result.found >= 40, "found {}", result.found);
    assert_eq!(result.scores.len(), 240);

    let results_path = dir.path().join("targets.tsv");
    let decoys_path = dir.path().join("decoys.tsv");
    let weights_path = dir.path().join("weights.tsv");
    let xml_path = dir.path().join("report.xml");
    write_results_file(&results_path, &result.scores, ResultKind::Targets).unwrap();
    write_results_file(&decoys_path, &result.scores, ResultKind::Decoys).unwrap();
    write_weights_file(&weights_path, &feature_names, &result.fold_weights, &result.raw_weights()).unwrap();
    write_xml_file(&xml_path, &result.scores, "psm-rescore input.pin", false).unwrap();

    let targets = fs::read_to_string(&results_path).unwrap();
    assert_eq!(targets.lines().count(), 121);
    assert!(targets.lines().skip(1).all(|l| l.starts_with("target_")));

    // q-values in the written file never decrease
    let q_values: Vec<f64> = targets
        .lines()
        .skip(1)
        .map(|l| l.split('\t').nth(2).unwrap().parse().unwrap())
        .collect();
    assert!(q_values.windows(2).all(|w| w[0] <= w[1]));

    let decoys = fs::read_to_string(&decoys_path).unwrap();
    assert_eq!(decoys.lines().count(), 121);

    let xml = fs::read_to_string(&xml_path).unwrap();
    assert!(xml.contains("<percolator_output majorVersion=\"1\" minorVersion=\"1\""));
    assert!(!xml.contains("decoy=\"true\""));

    // kept or reset to the initial direction, `score` dominates either way
    let raw = read_weights_file(&weights_path).unwrap();
    assert_eq!(raw.len(), 4);
    assert!(raw[0] > 0.0, "raw weights {:?} (direction valid: {})", raw, result.direction_valid);
}

#[test]
fn rerun_from_written_weights() {
    let dir = tempdir().unwrap();
    let pin_path = dir.path().join("input.pin");
    fs::write(&pin_path, synthetic_pin(90, 12)).unwrap();

    let pin = read_pin(&pin_path).unwrap();
    let names = pin.feature_names.clone();
    let first = PsmScorer::new(quick_config())
        .run(pin.targets, pin.decoys, None)
        .unwrap();
    let weights_path = dir.path().join("weights.tsv");
    write_weights_file(&weights_path, &names, &first.fold_weights, &first.raw_weights()).unwrap();

    let pin = read_pin(&pin_path).unwrap();
    let init = read_weights_file(&weights_path).unwrap();
    let second = PsmScorer::new(quick_config())
        .run(pin.targets, pin.decoys, Some(init))
        .unwrap();
    assert!(second.initial_positives > 0);
    assert!(second.found >= 30, "found {}", second.found);
}

#[test]
fn fixed_costs_skip_cross_validation() {
    let dir = tempdir().unwrap();
    let pin_path = dir.path().join("input.pin");
    fs::write(&pin_path, synthetic_pin(80, 13)).unwrap();
    let pin = read_pin(&pin_path).unwrap();

    let config = RescoreConfig {
        cpos: Some(1.0),
        cneg: Some(3.0),
        ..quick_config()
    };
    let result = PsmScorer::new(config).run(pin.targets, pin.decoys, None).unwrap();
    assert_eq!(result.fold_weights.len(), 1);
    assert_eq!(result.hyperparameters, vec![Some((1.0, 3.0))]);
}

#[test]
fn config_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"test_fdr": 0.05, "xval_folds": 5, "normalization": "unit"}"#).unwrap();
    let config = psm_rescore::config::load_config(&path).unwrap();
    assert_eq!(config.test_fdr, 0.05);
    assert_eq!(config.xval_folds, 5);
    assert_eq!(config.max_iterations, 10);
    assert!(config.validate().is_ok());
}
