pub mod engines;
pub mod run;
