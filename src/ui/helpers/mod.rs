pub mod formatters;

pub use formatters::{format_file_size, format_time, mime_for_path, safe_file_name, unique_path};
