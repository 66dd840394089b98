pub mod calendar;
pub mod common;
pub mod generate;
pub mod run;
pub mod trials;
