pub mod literature;
pub mod rag;
pub mod redaction;
pub mod safety;
pub mod storage;
