//! FloatRelay core library — query classification and routing relay
//! for an oceanographic data assistant, used by the CLI.

pub mod classifier;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod records;
pub mod registry;
pub mod resolver;
