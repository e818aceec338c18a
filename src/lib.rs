// Tunegram - melody extraction and n-gram similarity for symbolic music
// Main library entry point

pub mod collection;
pub mod config;
pub mod melody;
pub mod ngram;
pub mod reader;

pub use collection::{CollectionError, MelodyCollection};
pub use config::Config;
pub use melody::{Melody, Note};
pub use ngram::{extract_ngrams, NGram};
pub use reader::{default_readers, AbcReader, MelodyReader, MidiReader, RawNote};
