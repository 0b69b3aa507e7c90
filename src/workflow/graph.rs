//! Graph builder and executor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// Default maximum number of node executions in one run.
pub const DEFAULT_STEP_LIMIT: usize = 25;

/// Errors raised while building a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node '{0}' is already registered")]
    DuplicateNode(&'static str),

    #[error("Edge references unregistered node '{0}'")]
    UnknownNode(&'static str),

    #[error("Node '{0}' already has an outgoing edge")]
    DuplicateEdge(&'static str),

    #[error("Node '{0}' has no outgoing edge")]
    NoOutgoingEdge(&'static str),

    #[error("Graph has no entry node")]
    MissingEntry,

    #[error("Step limit must be greater than 0")]
    InvalidStepLimit,
}

/// Errors raised while running a compiled graph.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node returned an error; no later node ran.
    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: &'static str,
        #[source]
        source: PipelineError,
    },

    /// The run visited more nodes than allowed.
    #[error("Workflow exceeded step limit of {limit}")]
    StepLimitExceeded { limit: usize },
}

impl WorkflowError {
    /// Name of the node that failed, if a node failed.
    pub fn failed_node(&self) -> Option<&'static str> {
        match self {
            WorkflowError::NodeFailed { node, .. } => Some(node),
            WorkflowError::StepLimitExceeded { .. } => None,
        }
    }

    /// The node's own error, if a node failed.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            WorkflowError::NodeFailed { source, .. } => Some(source),
            WorkflowError::StepLimitExceeded { .. } => None,
        }
    }
}

/// Shared state threaded through a run.
///
/// A node never mutates state directly: it returns an `Update` listing the
/// fields it sets, and the engine merges it with `apply`.
pub trait WorkflowState: Send + Sync + 'static {
    type Update: Send;

    fn apply(&mut self, update: Self::Update);
}

/// A unit of work in a graph.
#[async_trait]
pub trait Node<S: WorkflowState>: Send + Sync {
    async fn run(&self, state: &S) -> PipelineResult<S::Update>;
}

/// Where control goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node(&'static str),
    End,
}

/// Decision type for a conditional edge.
///
/// Implemented by small per-pipeline enums; `variants` lets the builder
/// check every reachable target before the graph ever runs.
pub trait Route: Copy + Send + Sync + 'static {
    fn variants() -> &'static [Self];

    fn target(self) -> Target;
}

type Decide<S> = Box<dyn Fn(&S) -> Target + Send + Sync>;

enum Edge<S> {
    Direct(Target),
    Conditional { decide: Decide<S>, targets: Vec<Target> },
}

impl<S> Edge<S> {
    fn targets(&self) -> Vec<Target> {
        match self {
            Edge::Direct(target) => vec![*target],
            Edge::Conditional { targets, .. } => targets.clone(),
        }
    }

    fn resolve(&self, state: &S) -> Target {
        match self {
            Edge::Direct(target) => *target,
            Edge::Conditional { decide, .. } => decide(state),
        }
    }
}

/// Builder for a workflow graph.
pub struct StateGraph<S: WorkflowState> {
    name: &'static str,
    nodes: HashMap<&'static str, Arc<dyn Node<S>>>,
    edges: HashMap<&'static str, Edge<S>>,
    entry: Option<&'static str>,
    step_limit: usize,
}

impl<S: WorkflowState> StateGraph<S> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Registers a node under a unique name.
    pub fn add_node(
        mut self,
        name: &'static str,
        node: impl Node<S> + 'static,
    ) -> Result<Self, GraphError> {
        if self.nodes.contains_key(name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.nodes.insert(name, Arc::new(node));
        Ok(self)
    }

    /// Sets the node a run starts at.
    pub fn set_entry(mut self, name: &'static str) -> Self {
        self.entry = Some(name);
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Adds an unconditional edge.
    pub fn add_edge(mut self, from: &'static str, to: Target) -> Result<Self, GraphError> {
        self.insert_edge(from, Edge::Direct(to))?;
        Ok(self)
    }

    /// Adds a conditional edge decided by a pure function of state.
    pub fn add_conditional_edge<R, F>(
        mut self,
        from: &'static str,
        decide: F,
    ) -> Result<Self, GraphError>
    where
        R: Route,
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        let targets = R::variants().iter().map(|r| r.target()).collect();
        let decide: Decide<S> = Box::new(move |state| decide(state).target());
        self.insert_edge(from, Edge::Conditional { decide, targets })?;
        Ok(self)
    }

    fn insert_edge(&mut self, from: &'static str, edge: Edge<S>) -> Result<(), GraphError> {
        if self.edges.contains_key(from) {
            return Err(GraphError::DuplicateEdge(from));
        }
        self.edges.insert(from, edge);
        Ok(())
    }

    /// Validates the graph and freezes it for execution.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::UnknownNode(entry));
        }
        if self.step_limit == 0 {
            return Err(GraphError::InvalidStepLimit);
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from));
            }
            for target in edge.targets() {
                if let Target::Node(name) = target {
                    if !self.nodes.contains_key(name) {
                        return Err(GraphError::UnknownNode(name));
                    }
                }
            }
        }

        // Sorted so the reported node is deterministic.
        let mut names: Vec<_> = self.nodes.keys().copied().collect();
        names.sort_unstable();
        if let Some(name) = names.into_iter().find(|n| !self.edges.contains_key(n)) {
            return Err(GraphError::NoOutgoingEdge(name));
        }

        Ok(CompiledGraph {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            entry,
            step_limit: self.step_limit,
        })
    }
}

/// Final state of a completed run.
#[derive(Debug)]
pub struct Execution<S> {
    pub state: S,
    /// Node names in execution order.
    pub visited: Vec<&'static str>,
}

impl<S> Execution<S> {
    pub fn visited(&self, node: &str) -> bool {
        self.visited.iter().any(|n| *n == node)
    }
}

/// A validated, executable graph.
pub struct CompiledGraph<S: WorkflowState> {
    name: &'static str,
    nodes: HashMap<&'static str, Arc<dyn Node<S>>>,
    edges: HashMap<&'static str, Edge<S>>,
    entry: &'static str,
    step_limit: usize,
}

impl<S: WorkflowState> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<_> = self.nodes.keys().collect();
        nodes.sort_unstable();
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

impl<S: WorkflowState> CompiledGraph<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the graph from the entry node until `Target::End`.
    ///
    /// Nodes execute one at a time. The first node error aborts the run;
    /// side effects already made by earlier nodes are left as they are.
    pub async fn invoke(&self, mut state: S) -> Result<Execution<S>, WorkflowError> {
        let mut visited = Vec::new();
        let mut current = Target::Node(self.entry);

        while let Target::Node(name) = current {
            if visited.len() >= self.step_limit {
                warn!(graph = self.name, limit = self.step_limit, "Workflow step limit reached");
                return Err(WorkflowError::StepLimitExceeded {
                    limit: self.step_limit,
                });
            }

            // compile() guarantees every target is registered.
            let Some(node) = self.nodes.get(name) else {
                return Err(WorkflowError::NodeFailed {
                    node: name,
                    source: PipelineError::InputMissing(format!("node '{}' not registered", name)),
                });
            };

            debug!(graph = self.name, node = name, "Running node");
            let started = Instant::now();

            let update = match node.run(&state).await {
                Ok(update) => update,
                Err(source) => {
                    warn!(graph = self.name, node = name, error = %source, "Node failed, aborting run");
                    return Err(WorkflowError::NodeFailed { node: name, source });
                }
            };

            let elapsed = started.elapsed().as_secs_f64();
            metrics::record_node_duration(self.name, name, elapsed);
            debug!(graph = self.name, node = name, elapsed_secs = elapsed, "Node completed");

            state.apply(update);
            visited.push(name);

            current = match self.edges.get(name) {
                Some(edge) => edge.resolve(&state),
                None => Target::End,
            };
        }

        info!(graph = self.name, steps = visited.len(), "Workflow completed");
        Ok(Execution { state, visited })
    }
}
