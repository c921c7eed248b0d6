// Metadata module
// Tag reading and multi-value field parsing

pub mod extractor;
pub mod parser;

pub use extractor::{read_artwork, MetadataExtractor, ScannedTrack};
