// Thin re-export module: the confirmed-transaction store is split into the
// in-memory indices (`state`), confirm-time checks (`validation`) and the
// durable store itself (`chain`).

pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
