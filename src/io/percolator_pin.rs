//! Percolator .pin TSV reader.
//!
//! Layout: `SpecId Label [ScanNr] feature... Peptide Proteins...`, where the
//! protein ids take up every column after the peptide. A row whose id is
//! `DefaultDirection` carries initial weights instead of a PSM.
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::StringRecord;

use crate::data_handling::{DataSet, SetHandler};
use crate::enzyme::{Enzyme, ENZYME_FEATURE_NAMES};
use crate::psm::{FeatureNames, Label, Psm};

const DEFAULT_DIRECTION_ID: &str = "DefaultDirection";

/// PSMs read from a .pin file, split by class.
#[derive(Debug)]
pub struct PinData {
    pub targets: SetHandler,
    /// Decoys and test-only decoys.
    pub decoys: SetHandler,
    pub feature_names: FeatureNames,
    /// Raw weights from a `DefaultDirection` row, bias last.
    pub default_direction: Option<Vec<f64>>,
}

/// Configuration for reading .pin files.
#[derive(Debug, Clone)]
pub struct PinReaderConfig {
    pub spec_id_column: String,
    pub label_column: String,
    pub peptide_column: String,
    /// Observed retention time; stored on the PSM, not used as a feature.
    pub retention_time_column: String,
    pub predicted_time_column: String,
    /// Metadata columns never treated as features.
    pub ignore_columns: Vec<String>,
    /// Append enzymatic features computed with this enzyme.
    pub enzyme: Option<Enzyme>,
}

impl Default for PinReaderConfig {
    fn default() -> Self {
        Self {
            spec_id_column: "SpecId".to_string(),
            label_column: "Label".to_string(),
            peptide_column: "Peptide".to_string(),
            retention_time_column: "RetentionTime".to_string(),
            predicted_time_column: "PredictedRetentionTime".to_string(),
            ignore_columns: vec!["ScanNr".to_string(), "ScanNum".to_string()],
            enzyme: None,
        }
    }
}

/// Read a .pin file with the default column names.
pub fn read_pin<P: AsRef<Path>>(path: P) -> Result<PinData> {
    read_pin_with_config(path, &PinReaderConfig::default())
}

pub fn read_pin_with_config<P: AsRef<Path>>(path: P, config: &PinReaderConfig) -> Result<PinData> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open PIN file: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read PIN header row")?
        .clone();

    let spec_id_idx = find_column(&headers, &config.spec_id_column)
        .ok_or_else(|| anyhow!("Missing id column '{}'", config.spec_id_column))?;
    let label_idx = find_column(&headers, &config.label_column)
        .ok_or_else(|| anyhow!("Missing label column '{}'", config.label_column))?;
    let peptide_idx = find_column(&headers, &config.peptide_column)
        .ok_or_else(|| anyhow!("Missing peptide column '{}'", config.peptide_column))?;
    let rt_idx = find_column(&headers, &config.retention_time_column);
    let predicted_idx = find_column(&headers, &config.predicted_time_column);

    let feature_indices: Vec<usize> = (0..peptide_idx)
        .filter(|&idx| idx != spec_id_idx && idx != label_idx)
        .filter(|&idx| Some(idx) != rt_idx && Some(idx) != predicted_idx)
        .filter(|&idx| {
            let name = headers.get(idx).unwrap_or("");
            !config.ignore_columns.iter().any(|c| c.eq_ignore_ascii_case(name))
        })
        .collect();
    if feature_indices.is_empty() {
        bail!("No feature columns detected in PIN header");
    }

    let mut feature_names = FeatureNames::default();
    for &idx in &feature_indices {
        feature_names.push(headers.get(idx).unwrap_or(""));
    }
    if config.enzyme.is_some() {
        for name in ENZYME_FEATURE_NAMES {
            feature_names.push(name);
        }
    }

    let source = path.display().to_string();
    let mut targets = DataSet::new(source.clone(), Label::Target);
    let mut decoys = DataSet::new(source.clone(), Label::Decoy);
    let mut test_decoys = DataSet::new(source, Label::TestOnlyDecoy);
    let mut default_direction = None;

    for (row_idx, result) in reader.records().enumerate() {
        let line = row_idx + 2;
        let record = result.with_context(|| format!("Failed to read line {}", line))?;
        let id = field(&record, spec_id_idx, "id", line)?;
        let mut features = parse_features(&record, &headers, &feature_indices, line)?;

        if id.eq_ignore_ascii_case(DEFAULT_DIRECTION_ID) {
            features.resize(feature_names.len() + 1, 0.0);
            default_direction = Some(features);
            continue;
        }

        let label_value = field(&record, label_idx, "label", line)?;
        let label = label_value
            .parse::<i32>()
            .ok()
            .and_then(Label::from_i32)
            .ok_or_else(|| anyhow!("Invalid label '{}' at line {}", label_value, line))?;

        let peptide = field(&record, peptide_idx, "peptide", line)?;
        if let Some(enzyme) = config.enzyme {
            features.extend(enzyme.features(peptide));
        }
        let proteins = record
            .iter()
            .skip(peptide_idx + 1)
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let mut psm = Psm::new(id, peptide, proteins, features);
        psm.retention_time = optional_value(&record, rt_idx, line)?;
        psm.predicted_time = optional_value(&record, predicted_idx, line)?;

        match label {
            Label::Target => targets.push(psm),
            Label::Decoy => decoys.push(psm),
            Label::TestOnlyDecoy => test_decoys.push(psm),
        }
    }

    log::info!(
        "Read {} target, {} decoy and {} test-only decoy PSMs with {} features from {}",
        targets.len(),
        decoys.len(),
        test_decoys.len(),
        feature_names.len(),
        path.display()
    );

    let num_features = feature_names.len();
    let mut target_handler = SetHandler::new(Label::Target, num_features);
    let mut decoy_handler = SetHandler::new(Label::Decoy, num_features);
    target_handler.add_subset(targets)?;
    for subset in [decoys, test_decoys] {
        if !subset.is_empty() {
            decoy_handler.add_subset(subset)?;
        }
    }

    Ok(PinData {
        targets: target_handler,
        decoys: decoy_handler,
        feature_names,
        default_direction,
    })
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case(name))
}

fn field<'r>(record: &'r StringRecord, idx: usize, what: &str, line: usize) -> Result<&'r str> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| anyhow!("Missing {} value at line {}", what, line))
}

fn parse_features(
    record: &StringRecord,
    headers: &StringRecord,
    indices: &[usize],
    line: usize,
) -> Result<Vec<f64>> {
    indices
        .iter()
        .map(|&idx| {
            let value = field(record, idx, "feature", line)?;
            value.parse::<f64>().with_context(|| {
                format!(
                    "Invalid feature '{}' value '{}' at line {}",
                    headers.get(idx).unwrap_or(""),
                    value,
                    line
                )
            })
        })
        .collect()
}

fn optional_value(record: &StringRecord, idx: Option<usize>, line: usize) -> Result<Option<f64>> {
    match idx.and_then(|i| record.get(i)).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("Invalid retention time '{}' at line {}", value, line)),
    }
}
