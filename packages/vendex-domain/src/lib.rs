pub mod llm_json;
pub mod tier;
