pub mod conflict;
pub mod counters;
pub mod rejected_row;
