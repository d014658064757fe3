//! Flow execution for the argent silver layer.
//!
//! Generic over any backend implementing both
//! [`argent_core::store::BronzeLog`] and [`argent_core::store::SilverStore`].
//! Scheduling is deliberately simple: each flow runs on its own task and
//! polls its bronze log.

pub mod config;
pub mod error;
pub mod flow;
pub mod runner;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use flow::Flow;
pub use runner::{Pipeline, UpdateReport};

#[cfg(test)]
mod tests;
