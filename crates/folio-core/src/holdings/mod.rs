pub mod error;
pub mod registry;
pub mod valuation;

pub use error::HoldingsError;
pub use registry::{Holding, HoldingAccounts, Holdings};
pub use valuation::{
    IdentityValuation, OneToOneValuation, OracleValuation, TransientValuation, Valuation,
    ValuationError,
};
