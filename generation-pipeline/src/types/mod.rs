pub mod llm_outputs;
