//! QuickFOIL: a first-order rule learner backed by a columnar relational
//! engine.
//!
//! The learner induces Horn clauses approximating a target relation from
//! positive and negative examples plus background fact tables. The hot path
//! is not the statistics: every literal-search iteration scores thousands of
//! candidate body literals by driving a radix-partitioned hash-join pipeline
//! (`PartitionAssigner -> HashJoin -> Filter -> CountAggregator`) over the
//! clause's current binding table, sharing repeated equality atoms across
//! candidates through a plan DAG.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quickfoil::config::FoilConfig;
//! use quickfoil::learner::quickfoil::QuickFoil;
//! # fn predicates() -> (quickfoil::schema::predicate::FoilPredicateRef,
//! #                     Vec<quickfoil::schema::predicate::FoilPredicateRef>) { unimplemented!() }
//!
//! let (target, background) = predicates();
//! let mut learner = QuickFoil::new(100, 50, target, background,
//!                                  Arc::new(FoilConfig::default())).unwrap();
//! learner.learn().unwrap();
//! for clause in learner.learned_clauses() {
//!     println!("{clause}");
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod learner;
pub mod schema;
pub mod storage;

pub use config::{FoilConfig, TaskConfig};
pub use error::{FoilError, FoilResult};
pub use learner::quickfoil::QuickFoil;
pub use learner::test_runner::QuickFoilTestRunner;
