// core.rs splits responsibilities into submodules: the block model,
// chain management and structural validation.
pub mod block;
pub mod chain;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use validation::*;
