pub mod ai;
pub mod ai_types;
pub mod ocr;
pub mod pipeline;
pub mod writer;
