//! XML report of the final ranking.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::scores::{ScoreHolder, Scores};

const ROOT: &str = "percolator_output";
const NAMESPACE: &str = "http://noble.gs.washington.edu/proj/percolator/model/percolator_out";
const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Write `scores` as an XML report. Decoys are included only when
/// `include_decoys` is set.
pub fn write_xml<W: Write>(output: W, scores: &Scores, command_line: &str, include_decoys: bool) -> Result<()> {
    let mut writer = Writer::new_with_indent(output, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(root_element()))?;

    writer.write_event(Event::Start(BytesStart::new("process_info")))?;
    text_element(&mut writer, "command_line", command_line)?;
    text_element(&mut writer, "pi_0", &scores.pi0().to_string())?;
    writer.write_event(Event::End(BytesEnd::new("process_info")))?;

    writer.write_event(Event::Start(BytesStart::new("psms")))?;
    for holder in scores.iter().filter(|h| include_decoys || h.is_target()) {
        write_psm(&mut writer, holder)?;
    }
    writer.write_event(Event::End(BytesEnd::new("psms")))?;

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;
    writer.into_inner().flush()?;
    Ok(())
}

pub fn write_xml_file<P: AsRef<Path>>(
    path: P,
    scores: &Scores,
    command_line: &str,
    include_decoys: bool,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create XML file: {:?}", path))?;
    write_xml(BufWriter::new(file), scores, command_line, include_decoys)
        .with_context(|| format!("Failed to write XML report to {:?}", path))
}

/// Root element with the schema version and namespace declarations.
fn root_element() -> BytesStart<'static> {
    let version = format!("psm-rescore version {}", env!("CARGO_PKG_VERSION"));
    let schema_location = format!("{} percolator_out.xsd", NAMESPACE);
    let mut root = BytesStart::new(ROOT);
    root.push_attribute(("majorVersion", "1"));
    root.push_attribute(("minorVersion", "1"));
    root.push_attribute(("percolator_version", version.as_str()));
    root.push_attribute(("xsi:schemaLocation", schema_location.as_str()));
    root.push_attribute(("xmlns", NAMESPACE));
    root.push_attribute(("xmlns:xsi", XSI));
    root
}

fn write_psm<W: Write>(writer: &mut Writer<W>, holder: &ScoreHolder) -> Result<()> {
    let psm = &holder.psm;
    let mut start = BytesStart::new("psm");
    start.push_attribute(("psm_id", psm.id.as_str()));
    if !holder.is_target() {
        start.push_attribute(("decoy", "true"));
    }
    writer.write_event(Event::Start(start))?;

    text_element(writer, "svm_score", &holder.score.to_string())?;
    text_element(writer, "q_value", &holder.q.to_string())?;
    text_element(writer, "pep", &holder.pep.to_string())?;

    if psm.retention_time.is_some() || psm.predicted_time.is_some() {
        let mut rt = BytesStart::new("retentionTime");
        if let Some(observed) = psm.retention_time {
            rt.push_attribute(("observed", observed.to_string().as_str()));
        }
        if let Some(predicted) = psm.predicted_time {
            rt.push_attribute(("predicted", predicted.to_string().as_str()));
        }
        writer.write_event(Event::Empty(rt))?;
    }

    let (n, seq, c) = psm.peptide_parts();
    let mut peptide = BytesStart::new("peptide_seq");
    peptide.push_attribute(("n", n));
    peptide.push_attribute(("c", c));
    peptide.push_attribute(("seq", seq));
    writer.write_event(Event::Empty(peptide))?;

    for protein in &psm.proteins {
        text_element(writer, "protein_id", &printable(protein))?;
    }

    writer.write_event(Event::End(BytesEnd::new("psm")))?;
    Ok(())
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Drop control characters and anything outside the 32..=128 code range.
fn printable(s: &str) -> String {
    s.chars().filter(|&c| (32..=128).contains(&(c as u32))).collect()
}
