//! Few-shot prompt rendering for medication entity extraction.
//!
//! Retrieved documents become worked examples: the document content is the
//! example query and its metadata payload is the expected answer. The
//! model is then asked to extrapolate to the new text and reply with bare
//! JSON in the entity schema.

use crate::models::Document;

const OUTPUT_SCHEMA: &str = r#"{
    "original_text": "<input_text>",
    "quantity": ["<quantity>"],
    "drug_name": ["<drug_name>"],
    "dosage": ["<dosage>"],
    "administration_type": ["<administration_type>"],
    "brand": ["<brand>"]
}"#;

/// Render the extraction prompt for one query over its retrieved examples.
pub fn render_medication_ner(query: &str, documents: &[Document]) -> String {
    let mut prompt = String::from("Given the following examples of medication entities:\n");
    for document in documents {
        prompt.push_str("\nQuery: ");
        prompt.push_str(&document.content);
        prompt.push_str("\nAnswer: ");
        prompt.push_str(&document.meta.to_string());
        prompt.push('\n');
    }
    prompt.push_str(
        "\nUsing the examples as context, extrapolate and extract the medication entities \
         from the following text:\n",
    );
    prompt.push_str(query);
    prompt.push_str("\n\nProvide the output in the following JSON format:\n");
    prompt.push_str(OUTPUT_SCHEMA);
    prompt.push_str(
        "\nFor keys without any values, provide an empty list.\n\
         Respond only with valid JSON. Do not write an introduction or summary.\n",
    );
    prompt
}
