//! File formats consumed and produced around a rescoring run.
pub mod output;
pub mod percolator_pin;
pub mod xml;

pub use output::{read_weights_file, write_results_file, write_weights_file, ResultKind};
pub use percolator_pin::{read_pin, read_pin_with_config, PinData, PinReaderConfig};
pub use xml::write_xml_file;
