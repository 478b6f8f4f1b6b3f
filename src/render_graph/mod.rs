//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic graph (DAG).
//! Passes declare the resources they read, write and create once, at startup. The
//! graph orders and culls them, realizes resources on first use and records passes
//! inline or on worker threads, submitting the results in compiled order.

pub mod builder;
pub mod compiler;
pub mod context;
pub mod executor;
pub mod factory;
pub mod graph;
pub mod pass;
pub mod resource;
pub mod staged;
pub mod visualize;

pub use builder::*;
pub use compiler::*;
pub use context::*;
pub use executor::*;
pub use factory::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
pub use staged::*;
pub use visualize::to_dot;
