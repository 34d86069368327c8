//! Dependency Planner
//!
//! Turns a set of registered steps into an execution plan: a dependency
//! graph over interned node indices, a topological order, and a greedy
//! parallel batching. Problems found along the way (unknown steps, missing
//! dependencies, circular dependencies) are reported as warnings rather
//! than failing the plan; callers decide how strict to be.

use std::collections::HashMap;

use log::{debug, info, warn};

use super::store::StepRegistry;

/// One step in the dependency graph.
///
/// Edges are indices into the plan's node array.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Id of the planned step
    pub step_id: String,
    /// Indices of the nodes this step depends on
    pub depends_on: Vec<usize>,
    /// Indices of the nodes depending on this step
    pub dependents: Vec<usize>,
    /// Longest dependency chain below this node (roots are 0)
    pub depth: usize,
}

/// Planning knobs.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Maximum steps per parallel batch
    pub max_batch_size: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_batch_size: num_cpus::get().max(1),
        }
    }
}

impl PlanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum steps per parallel batch (at least 1).
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }
}

/// The planner's output.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Step ids in dependency order
    pub ordered: Vec<String>,
    /// Step ids grouped into parallel batches, in execution order
    pub batches: Vec<Vec<String>>,
    /// Non-fatal problems found while planning
    pub warnings: Vec<String>,
    /// The dependency graph the plan was derived from
    pub nodes: Vec<DependencyNode>,
}

impl ExecutionPlan {
    /// Returns the node for a planned step id.
    pub fn node(&self, step_id: &str) -> Option<&DependencyNode> {
        self.nodes.iter().find(|node| node.step_id == step_id)
    }

    /// Returns the index of the batch containing a step id.
    pub fn batch_index_of(&self, step_id: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|id| id == step_id))
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Plans the execution of a set of registered steps.
///
/// Unknown step ids and dependencies outside the requested set are
/// excluded with a warning. Circular dependencies are reported as
/// warnings; the returned order is always finite and contains each
/// planned step exactly once, even for cyclic input.
///
/// # Example
///
/// ```
/// use stepwise::registry::{create_execution_plan, PlanOptions, StepRegistry};
/// use stepwise::step::{StepDefinition, StepMetadata};
/// use serde_json::Value;
///
/// let mut registry = StepRegistry::new();
/// for (id, deps) in [("load", vec![]), ("report", vec!["load"])] {
///     let mut def = StepDefinition::new(id, StepMetadata::new(id, "1.0.0"), |_| Ok(Value::Null));
///     for dep in deps {
///         def = def.depends_on(dep);
///     }
///     registry.register(def).unwrap();
/// }
///
/// let plan = create_execution_plan(&registry, &["load", "report"], &PlanOptions::default());
/// assert_eq!(plan.ordered, vec!["load", "report"]);
/// ```
pub fn create_execution_plan(
    registry: &StepRegistry,
    step_ids: &[&str],
    options: &PlanOptions,
) -> ExecutionPlan {
    let mut warnings = Vec::new();

    // Intern the requested steps into node indices.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut nodes: Vec<DependencyNode> = Vec::new();
    let mut definitions = Vec::new();

    for step_id in step_ids {
        if index.contains_key(*step_id) {
            warnings.push(format!("step '{}' requested more than once", step_id));
            continue;
        }
        match registry.get(step_id) {
            Some(definition) => {
                index.insert((*step_id).to_string(), nodes.len());
                nodes.push(DependencyNode {
                    step_id: (*step_id).to_string(),
                    depends_on: Vec::new(),
                    dependents: Vec::new(),
                    depth: 0,
                });
                definitions.push(definition);
            }
            None => {
                warn!("planning: step '{}' is not available", step_id);
                warnings.push(format!(
                    "step '{}' is not available in the registry; excluded from the plan",
                    step_id
                ));
            }
        }
    }

    // Forward and reverse edges, restricted to the planned set.
    for (i, definition) in definitions.iter().enumerate() {
        for dep in &definition.dependencies {
            match index.get(dep) {
                Some(&j) => {
                    nodes[i].depends_on.push(j);
                    nodes[j].dependents.push(i);
                }
                None => {
                    warnings.push(format!(
                        "step '{}' depends on '{}', which is not in the plan",
                        nodes[i].step_id, dep
                    ));
                }
            }
        }
    }

    detect_cycles(&nodes, &mut warnings);

    let order = topological_order(&nodes);
    assign_depths(&mut nodes, &order);
    let batches = build_batches(&nodes, &order, options.max_batch_size);

    let ordered: Vec<String> = order.iter().map(|&i| nodes[i].step_id.clone()).collect();
    let batch_ids: Vec<Vec<String>> = batches
        .iter()
        .map(|batch| batch.iter().map(|&i| nodes[i].step_id.clone()).collect())
        .collect();

    info!(
        "planned {} steps into {} batches ({} warnings)",
        ordered.len(),
        batch_ids.len(),
        warnings.len()
    );

    ExecutionPlan {
        ordered,
        batches: batch_ids,
        warnings,
        nodes,
    }
}

/// Flags dependency cycles with a DFS over the recursion stack.
///
/// Detection is independent of the topological sort: a cycle produces
/// warnings here but never blocks ordering.
fn detect_cycles(nodes: &[DependencyNode], warnings: &mut Vec<String>) {
    fn dfs(
        current: usize,
        nodes: &[DependencyNode],
        visited: &mut [bool],
        on_stack: &mut [bool],
        warnings: &mut Vec<String>,
    ) {
        visited[current] = true;
        on_stack[current] = true;

        for &dep in &nodes[current].depends_on {
            if !visited[dep] {
                dfs(dep, nodes, visited, on_stack, warnings);
            } else if on_stack[dep] {
                warnings.push(format!(
                    "circular dependency detected involving steps '{}' and '{}'",
                    nodes[current].step_id, nodes[dep].step_id
                ));
            }
        }

        on_stack[current] = false;
    }

    let mut visited = vec![false; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    for i in 0..nodes.len() {
        if !visited[i] {
            dfs(i, nodes, &mut visited, &mut on_stack, warnings);
        }
    }
}

/// Post-order DFS yielding dependencies before dependents.
///
/// The visited set makes the walk terminate on cyclic input; each node
/// appears exactly once regardless.
fn topological_order(nodes: &[DependencyNode]) -> Vec<usize> {
    fn visit(current: usize, nodes: &[DependencyNode], visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[current] {
            return;
        }
        visited[current] = true;
        for &dep in &nodes[current].depends_on {
            visit(dep, nodes, visited, order);
        }
        order.push(current);
    }

    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    for i in 0..nodes.len() {
        visit(i, nodes, &mut visited, &mut order);
    }
    order
}

/// Assigns each node the length of its longest dependency chain.
fn assign_depths(nodes: &mut [DependencyNode], order: &[usize]) {
    for &i in order {
        let depth = nodes[i]
            .depends_on
            .iter()
            .map(|&dep| nodes[dep].depth + 1)
            .max()
            .unwrap_or(0);
        nodes[i].depth = depth;
    }
}

/// Greedy first-fit batching over the topological order.
///
/// A step lands in the earliest batch after all of its dependencies'
/// batches that still has room; placing after the direct dependencies
/// keeps transitive dependencies in earlier batches too. Heuristic, not
/// provably minimal.
fn build_batches(
    nodes: &[DependencyNode],
    order: &[usize],
    max_batch_size: usize,
) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut batch_of: Vec<Option<usize>> = vec![None; nodes.len()];

    for &i in order {
        let start = nodes[i]
            .depends_on
            .iter()
            .filter_map(|&dep| batch_of[dep])
            .map(|batch| batch + 1)
            .max()
            .unwrap_or(0);

        let slot = (start..batches.len())
            .find(|&b| batches[b].len() < max_batch_size)
            .unwrap_or_else(|| {
                batches.push(Vec::new());
                batches.len() - 1
            });

        debug!("step '{}' placed in batch {}", nodes[i].step_id, slot);
        batches[slot].push(i);
        batch_of[i] = Some(slot);
    }

    batches
}
