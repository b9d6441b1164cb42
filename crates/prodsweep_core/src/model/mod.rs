mod ids;
mod params;
mod records;

pub use ids::ComboId;
pub use params::{ParamValue, ParameterBinding, ParameterCombination};
pub use records::{CombinationOutcome, GrowthRecord, RoleWealth, WealthSample};
