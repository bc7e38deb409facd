pub mod capture_session;
pub mod domain;
pub mod infrastructure;
pub mod session_registry;
