//! Minimal workflow engine.
//!
//! A workflow is a directed graph of named async nodes over one shared state
//! value. Each node reads the state and returns a partial update; edges are
//! either fixed or decided by a pure function of the state after the update
//! is merged. Graphs are validated once at build time and then run any
//! number of times.
//!
//! # Example
//!
//! ```ignore
//! let graph = StateGraph::new("quiz_creation")
//!     .add_node("summarize", Summarize::new(agent.clone()))?
//!     .add_node("enhance", Enhance::new(agent.clone()))?
//!     .add_edge("summarize", Target::Node("enhance"))?
//!     .add_edge("enhance", Target::End)?
//!     .set_entry("summarize")
//!     .compile()?;
//!
//! let run = graph.invoke(state).await?;
//! ```

pub mod graph;

pub use graph::{
    CompiledGraph, Execution, GraphError, Node, Route, StateGraph, Target, WorkflowError,
    WorkflowState, DEFAULT_STEP_LIMIT,
};
