pub mod capture_source;
pub mod frame_queue_source;
pub mod frame_sample;
pub mod source_locator;
