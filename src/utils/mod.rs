pub mod data_path;
pub mod redact;
pub mod template;
pub mod text;
