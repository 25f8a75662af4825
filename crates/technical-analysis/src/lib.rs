pub mod divergence;
pub mod indicators;
pub mod pivots;


pub use divergence::*;
pub use indicators::*;
pub use pivots::*;
