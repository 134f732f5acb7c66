pub mod error;
pub mod openai;
pub mod storage;
pub mod utils;
