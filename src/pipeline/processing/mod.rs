// Pipeline processing: normalization, risk scoring and aggregation

pub mod aggregate;
pub mod comments;
pub mod normalize;
pub mod risk;
