pub mod qa_record;
