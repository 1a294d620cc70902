pub mod seed;
pub mod task;
pub mod timeutil;
