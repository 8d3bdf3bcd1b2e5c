pub mod batch;
pub mod feedback;
pub mod heal;
pub mod health;
pub mod history;
pub mod stats;
pub mod utils;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
