use serde::{Deserialize, Serialize};

/// One row of the corpus: a scraped page or document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique id from the source system.
    pub id: String,
    /// Human-readable source link (e.g. a wiki tiny-link).
    pub reference: String,
    /// Raw page text, possibly carrying residual markup.
    pub text: String,
}

/// An embeddable unit produced by splitting a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable id, derived from `{document_id}:{index}`.
    pub id: String,
    pub document_id: String,
    /// Position of this fragment within its document.
    pub index: u32,
    pub text: String,
}

impl Fragment {
    /// Derive a stable fragment id so re-ingesting the same document
    /// overwrites its records instead of duplicating them.
    pub fn generate_id(document_id: &str, index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn new(document: &Document, index: u32, text: String) -> Self {
        Self {
            id: Self::generate_id(&document.id, index),
            document_id: document.id.clone(),
            index,
            text,
        }
    }
}

/// Metadata stored alongside each vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source link shown back to the user as a citation.
    pub reference: String,
    /// Fragment text, retrieved as answer context.
    pub text: String,
}

/// A staged record transmitted to the vector index.
///
/// The index owns the stored copy; upserting an existing id overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    pub fn from_fragment(fragment: &Fragment, reference: &str, values: Vec<f32>) -> Self {
        Self {
            id: fragment.id.clone(),
            values,
            metadata: RecordMetadata {
                reference: reference.to_string(),
                text: fragment.text.clone(),
            },
        }
    }
}
