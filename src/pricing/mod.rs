//! Option pricing models.

pub mod black_scholes;

pub use black_scholes::{BlackScholes, ConvergenceError, IvResult};
