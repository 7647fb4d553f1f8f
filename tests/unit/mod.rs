//! Unit tests for individual components

mod alerts_test;
mod builders_test;
mod config_test;
mod error_test;
mod infra_test;
mod util_test;
