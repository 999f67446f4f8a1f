pub mod listener;
pub mod schedule;
