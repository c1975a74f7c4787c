pub(crate) mod coerce;
pub mod normalizer;
