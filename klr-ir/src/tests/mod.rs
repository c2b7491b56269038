//! Whole-pipeline tests over the sample functions

mod scenario_tests;
