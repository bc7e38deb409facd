pub mod cooldown_tracker;
pub mod snapshot_writer;
pub mod surveillance_store;
