pub mod sessions;
pub mod system;
