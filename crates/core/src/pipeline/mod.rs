pub mod alert_coordinator;
pub mod detection_worker_pool;
pub mod frame_collector;
pub mod frame_detection_result;
pub mod pipeline_stats;
pub mod surveillance_pipeline;
