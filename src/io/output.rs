//! Tab-delimited result and weight files.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use crate::psm::FeatureNames;
use crate::scores::Scores;

const WEIGHTS_COMMENT: &str = "# first line contains normalized weights, second line the raw weights";

/// Which class of the final ranking to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Targets,
    /// Decoys and test-only decoys.
    Decoys,
}

/// Write the final ranking as `PSMId score q-value posterior_error_prob
/// peptide proteinIds...`, in rank order.
pub fn write_results<W: Write>(output: W, scores: &Scores, kind: ResultKind) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(output);

    writer.write_record([
        "PSMId",
        "score",
        "q-value",
        "posterior_error_prob",
        "peptide",
        "proteinIds",
    ])?;

    let wanted = |target: bool| match kind {
        ResultKind::Targets => target,
        ResultKind::Decoys => !target,
    };
    for holder in scores.iter().filter(|h| wanted(h.is_target())) {
        let psm = &holder.psm;
        let mut record = vec![
            psm.id.clone(),
            holder.score.to_string(),
            holder.q.to_string(),
            holder.pep.to_string(),
            psm.peptide.clone(),
        ];
        record.extend(psm.proteins.iter().cloned());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_results_file<P: AsRef<Path>>(path: P, scores: &Scores, kind: ResultKind) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create results file: {:?}", path))?;
    write_results(BufWriter::new(file), scores, kind)
        .with_context(|| format!("Failed to write results to {:?}", path))
}

/// Write one normalized and one raw weight line per fold.
pub fn write_weights<W: Write>(
    mut output: W,
    feature_names: &FeatureNames,
    normalized: &[Vec<f64>],
    raw: &[Vec<f64>],
) -> Result<()> {
    let header: Vec<&str> = feature_names
        .names()
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("m0"))
        .collect();
    for (norm, raw) in normalized.iter().zip(raw) {
        writeln!(output, "{}", WEIGHTS_COMMENT)?;
        writeln!(output, "{}", header.join("\t"))?;
        writeln!(output, "{}", join_weights(norm))?;
        writeln!(output, "{}", join_weights(raw))?;
    }
    output.flush()?;
    Ok(())
}

pub fn write_weights_file<P: AsRef<Path>>(
    path: P,
    feature_names: &FeatureNames,
    normalized: &[Vec<f64>],
    raw: &[Vec<f64>],
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create weights file: {:?}", path))?;
    write_weights(BufWriter::new(file), feature_names, normalized, raw)
}

fn join_weights(weights: &[f64]) -> String {
    weights
        .iter()
        .map(|w| format!("{:.4}", w))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Read the raw weights of the first fold written by [`write_weights`].
///
/// Comment lines and the header are skipped; of the first two numeric lines
/// the second (raw) one is returned.
pub fn read_weights<R: BufRead>(input: R) -> Result<Vec<f64>> {
    let mut numeric = 0;
    for (idx, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read weights line {}", idx + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line.split('\t').next().unwrap_or("");
        if first.parse::<f64>().is_err() {
            continue;
        }
        numeric += 1;
        if numeric == 2 {
            return line
                .split('\t')
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .with_context(|| format!("Invalid weight '{}' on line {}", v, idx + 1))
                })
                .collect();
        }
    }
    if numeric == 0 {
        bail!("No weights found");
    }
    Err(anyhow!("Raw weight line missing after the normalized weights"))
}

pub fn read_weights_file<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open weights file: {:?}", path))?;
    read_weights(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psm::{Label, Psm};
    use crate::scores::ScoreHolder;
    use std::sync::Arc;

    fn ranked() -> Scores {
        let holders = vec![
            (Label::Target, "t1", 2.0),
            (Label::Decoy, "d1", 1.0),
            (Label::TestOnlyDecoy, "d2", 0.5),
            (Label::Target, "t2", 0.0),
        ]
        .into_iter()
        .map(|(label, id, score)| {
            let psm = Psm::new(id, "K.PEP.A", ["P2", "P1"], vec![score]);
            ScoreHolder::new(label, Arc::new(psm))
        })
        .collect();
        let mut scores = Scores::from_holders(holders);
        scores.calc_scores(&[1.0, 0.0], 0.01);
        scores
    }

    #[test]
    fn test_write_target_results() {
        let mut buffer = Vec::new();
        write_results(&mut buffer, &ranked(), ResultKind::Targets).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "PSMId\tscore\tq-value\tposterior_error_prob\tpeptide\tproteinIds");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("t1\t2\t0\t"));
        assert!(lines[1].ends_with("K.PEP.A\tP1\tP2"));
        assert!(lines[2].starts_with("t2\t0\t"));
    }

    #[test]
    fn test_write_decoy_results() {
        let mut buffer = Vec::new();
        write_results(&mut buffer, &ranked(), ResultKind::Decoys).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let ids: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn test_weights_round_trip() {
        let names = FeatureNames::new(vec!["score".to_string(), "deltCn".to_string()]);
        let normalized = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let raw = vec![vec![0.5, -1.25, 0.125], vec![7.0, 8.0, 9.0]];
        let mut buffer = Vec::new();
        write_weights(&mut buffer, &names, &normalized, &raw).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], WEIGHTS_COMMENT);
        assert_eq!(lines[1], "score\tdeltCn\tm0");
        assert_eq!(lines[2], "1.0000\t2.0000\t3.0000");

        let read = read_weights(buffer.as_slice()).unwrap();
        assert_eq!(read, vec![0.5, -1.25, 0.125]);
    }

    #[test]
    fn test_read_weights_needs_raw_line() {
        let input = "# comment\nscore\tm0\n1.0\t0.0\n";
        let err = read_weights(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Raw weight line missing"));
    }
}
