pub mod image_snapshot_writer;
pub mod in_memory_store;
pub mod json_lines_store;
