mod builder;
mod initializer;

pub use builder::QueryBuilder;
pub use initializer::{NoParameters, QueryInitializer};
