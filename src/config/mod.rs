pub mod file;
pub mod settings;

pub use file::*;
pub use settings::*;
