pub mod config;
pub mod error;
pub mod repository;
pub mod settings;
pub mod state;

#[cfg(test)]
pub mod test_utils;
