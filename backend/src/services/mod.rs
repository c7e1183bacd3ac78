pub mod session_registry;
pub mod user_directory;
