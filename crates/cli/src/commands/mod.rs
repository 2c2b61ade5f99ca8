pub mod migrate;
pub mod settings;
