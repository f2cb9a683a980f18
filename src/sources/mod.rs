mod csv;

pub use csv::{Corpus, CorpusLoader};
