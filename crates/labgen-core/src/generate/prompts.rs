//! Instruction sets for artifact generation, one per query language.

use serde_json::Value;

use crate::backend::ChatPrompt;
use crate::schema::SchemaCatalog;
use crate::types::{ParsedDocument, QueryLanguage};

/// Appended to the system instruction when a previous attempt yielded no examples.
pub const RETRY_SUFFIX: &str =
    "\n\nIMPORTANT: You MUST generate at least 4 examples. Do not return an empty examples array.";

const REFERENCE_CONFIG: &str = r#"{
  "queryType": "match",
  "displayName": "Match Query",
  "description": "Returns documents that match a provided text...",
  "docUrl": "https://www.elastic.co/docs/...",
  "keyDisplayFields": {"products": "product_name", "product_reviews": "review_title", "product_users": "username"},
  "searchFields": {"products": "product_description", "product_reviews": "review_text", "product_users": "interests"},
  "sampleQueries": {"products": "premium wireless", "product_reviews": "comfortable durable", "product_users": "Electronics Books"},
  "queryStructure": {"type": "inline", "fieldPath": ""},
  "examples": [
    {
      "id": "basic-match",
      "title": "Basic Match Query",
      "description": "Standard full-text search...",
      "template": "{\"query\": {\"match\": {\"review_text\": {\"query\": \"comfortable durable\"}}}}",
      "index": "product_reviews",
      "tryThis": ["Try changing the query text..."],
      "tooltips": {"query": "The text to search for..."}
    }
  ]
}"#;

fn system_instruction(language: QueryLanguage) -> String {
    match language {
        QueryLanguage::Esql => "You are an expert at creating interactive Elasticsearch ES|QL query lab examples.\n\
             Your task is to generate a LabConfig structure that will be used to create an interactive lab.\n\n\
             The LabConfig should:\n\
             1. Include 4-6 diverse examples that demonstrate different ES|QL commands (FROM, WHERE, KEEP, SORT, LIMIT, etc.)\n\
             2. Use realistic ES|QL queries that will return results from the provided datasets\n\
             3. Include helpful \"tryThis\" suggestions for each example\n\
             4. Include tooltips for key ES|QL commands and parameters\n\
             5. Use appropriate fields from the dataset schemas provided\n\
             6. For ES|QL, templates should be ES|QL query strings, not JSON\n\
             7. ES|QL string literals use DOUBLE QUOTES\n\n\
             Return ONLY valid JSON matching the LabConfig structure. Do not include markdown code blocks or explanations."
            .to_string(),
        QueryLanguage::Eql => "You are an expert at creating interactive Elasticsearch EQL query lab examples.\n\
             Your task is to generate a LabConfig structure that will be used to create an interactive lab.\n\n\
             The LabConfig should:\n\
             1. Include 4-6 diverse examples that demonstrate different EQL features (event queries, sequences, functions)\n\
             2. Use realistic EQL queries that will return results from the provided datasets\n\
             3. Include helpful \"tryThis\" suggestions for each example\n\
             4. Include tooltips for key EQL syntax\n\
             5. Use appropriate fields from the dataset schemas provided\n\
             6. Templates are EQL query strings, not JSON, and each example names its target index\n\n\
             Return ONLY valid JSON matching the LabConfig structure. Do not include markdown code blocks or explanations."
            .to_string(),
        QueryLanguage::QueryDsl => "You are an expert at creating interactive Elasticsearch query lab examples.\n\
             Your task is to generate a LabConfig structure that will be used to create an interactive lab.\n\n\
             The LabConfig should:\n\
             1. Include 4-6 diverse examples that demonstrate different aspects of the query type\n\
             2. Use realistic queries that will return results from the provided datasets\n\
             3. Include helpful \"tryThis\" suggestions for each example\n\
             4. Include tooltips for key parameters\n\
             5. Use appropriate fields from the dataset schemas provided\n\n\
             Return ONLY valid JSON matching the LabConfig structure. Do not include markdown code blocks or explanations."
            .to_string(),
    }
}

fn esql_dataset_examples(catalog: &SchemaCatalog) -> String {
    let lines: Vec<String> = catalog
        .iter()
        .filter_map(|(name, schema)| {
            schema
                .esql_examples
                .first()
                .map(|q| format!("- {name}: {q}"))
        })
        .collect();
    if lines.is_empty() {
        "- products: FROM products | WHERE product_description LIKE \"*wireless*\" | LIMIT 10\n\
         - product_reviews: FROM product_reviews | WHERE review_text LIKE \"*comfortable*\" | LIMIT 10\n\
         - product_users: FROM product_users | WHERE interests LIKE \"*Electronics*\" | LIMIT 10"
            .to_string()
    } else {
        lines.join("\n")
    }
}

fn user_instruction(doc: &ParsedDocument, catalog: &SchemaCatalog) -> String {
    let schemas = pretty(&catalog.to_value());
    let code = pretty(&serde_json::to_value(&doc.code_examples).unwrap_or(Value::Null));
    let header = format!(
        "Title: {}\nDescription: {}\nQuery Type: {}\nURL: {}",
        doc.title, doc.description, doc.query_type, doc.doc_url
    );
    let missing = if doc.missing_params.is_empty() {
        String::new()
    } else {
        format!(
            "\nParameters documented without an example (cover some of these): {}\n",
            doc.missing_params.join(", ")
        )
    };

    match doc.language {
        QueryLanguage::Esql => format!(
            "Generate a LabConfig for the following Elasticsearch ES|QL documentation page:\n\n\
             {header}\n\n\
             Available Datasets:\n{schemas}\n\n\
             ES|QL Query Examples for Datasets:\n{examples}\n\n\
             Existing Code Examples from Documentation:\n{code}\n{missing}\n\
             Generate a complete LabConfig JSON object with:\n\
             - queryLanguage: \"esql\"\n\
             - queryType: \"{query_type}\"\n\
             - displayName: Human-readable name (e.g., \"ES|QL Query\")\n\
             - description: The description from the doc\n\
             - docUrl: The doc URL\n\
             - keyDisplayFields: Use the key_display_field from dataset_schemas\n\
             - searchFields: Use the searchable_text_fields from dataset_schemas (for reference, not used in ES|QL)\n\
             - sampleQueries: Realistic ES|QL query strings that will return results\n\
             - examples: 4-6 diverse ES|QL examples with id, title, description, template (ES|QL query string, NOT JSON), index, tryThis, and tooltips\n\n\
             For ES|QL templates, use the ES|QL query string format directly, not wrapped in JSON.\n\n\
             Return ONLY the JSON object, no markdown formatting.",
            examples = esql_dataset_examples(catalog),
            query_type = doc.query_type,
        ),
        QueryLanguage::Eql => format!(
            "Generate a LabConfig for the following Elasticsearch EQL documentation page:\n\n\
             {header}\n\n\
             Available Datasets:\n{schemas}\n\n\
             Existing Code Examples from Documentation:\n{code}\n{missing}\n\
             Generate a complete LabConfig JSON object with:\n\
             - queryLanguage: \"eql\"\n\
             - queryType: \"{query_type}\"\n\
             - displayName: Human-readable name (e.g., \"EQL Sequences\")\n\
             - description: The description from the doc\n\
             - docUrl: The doc URL\n\
             - keyDisplayFields: Use the key_display_field from dataset_schemas\n\
             - searchFields: Use the searchable_text_fields from dataset_schemas\n\
             - sampleQueries: Realistic EQL query strings that will return results\n\
             - examples: 4-6 diverse EQL examples with id, title, description, template (EQL query string), index, tryThis, and tooltips\n\n\
             Return ONLY the JSON object, no markdown formatting.",
            query_type = doc.query_type,
        ),
        QueryLanguage::QueryDsl => format!(
            "Generate a LabConfig for the following Elasticsearch documentation page:\n\n\
             {header}\n\n\
             Available Datasets:\n{schemas}\n\n\
             Existing Code Examples from Documentation:\n{code}\n{missing}\n\
             Example LabConfig Structure (for reference):\n{REFERENCE_CONFIG}\n\n\
             Generate a complete LabConfig JSON object with:\n\
             - queryLanguage: \"query_dsl\"\n\
             - queryType: \"{query_type}\"\n\
             - displayName: Human-readable name (e.g., \"Match Query\")\n\
             - description: The description from the doc\n\
             - docUrl: The doc URL\n\
             - keyDisplayFields: Use the key_display_field from dataset_schemas\n\
             - searchFields: Use the searchable_text_fields from dataset_schemas\n\
             - sampleQueries: Realistic query strings that will return results\n\
             - queryStructure: Determine the fieldPath based on query type (inline, default_field, fields, or nested)\n\
             - examples: 4-6 diverse examples with id, title, description, template (JSON string), index, tryThis, and tooltips\n\n\
             Return ONLY the JSON object, no markdown formatting.",
            query_type = doc.query_type,
        ),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Build the generation prompt for `doc`.
///
/// `retry` strengthens the system instruction and swaps in the retry
/// temperature.
#[must_use]
pub fn lab_prompt(
    doc: &ParsedDocument,
    catalog: &SchemaCatalog,
    temperature: f32,
    max_tokens: u32,
    retry: bool,
) -> ChatPrompt {
    let mut system = system_instruction(doc.language);
    if retry {
        system.push_str(RETRY_SUFFIX);
    }
    ChatPrompt {
        system,
        user: user_instruction(doc, catalog),
        temperature,
        max_tokens,
    }
}
