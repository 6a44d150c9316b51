pub mod fixed;
pub mod ids;

pub use fixed::{convert_decimals, signed_delta, FixedPointError, Rounding, D18};
pub use ids::{Asset, AssetId, PoolId, ShareClassId};
