//! Transaction module split into types, validation and construction

pub mod factory;
pub mod types;
pub mod validation;

pub use factory::*;
pub use types::*;
