#![allow(dead_code)]

pub mod population_testkit;
