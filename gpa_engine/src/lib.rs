//! Term GPA and cumulative CPA aggregation with cohort ranking.
//!
//! Concluded class scores are read through [`store::ScoreSource`], grouped
//! per program and student, folded into per-term GPA and per-program CPA
//! records by [`aggregate`], dense-ranked within cohorts by [`rank`], and
//! written back atomically through the [`store`] traits. [`jobs`] ties the
//! pipeline together; [`dispatch`] queues jobs for a background worker.

#![deny(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod filter;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod rank;
#[allow(missing_docs)]
pub mod schema;
pub mod score;
pub mod store;

#[cfg(test)]
mod testing;
