pub mod bounding_box;
pub mod camera_id;
pub mod constants;
pub mod feature_vector;
pub mod frame;
pub mod graceful_thread;
pub mod model_resolver;
