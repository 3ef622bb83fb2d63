pub mod bytes;
pub mod error;
pub mod fs;
pub mod hash;
pub mod path;
pub mod system;
pub mod time;
