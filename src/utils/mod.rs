pub mod fuzzy;
pub mod tz;
