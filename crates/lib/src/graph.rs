//! Traversals and validation for the build DAG.
//!
//! Two orders matter. BFS from the root is used where order is not
//! load-bearing (emitting per-build artifacts). Post-order DFS — all
//! dependencies of a node before the node itself, deduplicated by id —
//! drives build execution, dependency env groups and findlib path entries.
//! Both visit every reachable id exactly once.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use crate::build::{Build, BuildId, BuildSandbox};
use crate::error::BuildError;

/// Structural errors in the build graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// The graph reachable from the root is not a DAG.
  #[error("dependency cycle detected through build {0}")]
  CycleDetected(BuildId),

  /// A dependency id has no entry in the sandbox's build map.
  #[error("build {from} references unknown dependency {missing}")]
  UnresolvedReference { from: BuildId, missing: BuildId },

  /// The sandbox names a root build that is not in the map.
  #[error("sandbox root build {0} is not defined")]
  MissingRoot(BuildId),
}

/// BFS visitation from the sandbox root.
pub fn bfs(sandbox: &BuildSandbox) -> Result<Vec<&Build>, GraphError> {
  let root = sandbox
    .root_build()
    .ok_or_else(|| GraphError::MissingRoot(sandbox.root.clone()))?;
  bfs_from(sandbox, root)
}

/// BFS visitation starting at `start`, visiting each id at most once.
pub fn bfs_from<'a>(sandbox: &'a BuildSandbox, start: &'a Build) -> Result<Vec<&'a Build>, GraphError> {
  let mut order = Vec::new();
  let mut seen: HashSet<&BuildId> = HashSet::from([&start.id]);
  let mut queue: VecDeque<&Build> = VecDeque::from([start]);

  while let Some(build) = queue.pop_front() {
    order.push(build);
    for dep_id in &build.dependencies {
      let dep = sandbox.get(dep_id).ok_or_else(|| GraphError::UnresolvedReference {
        from: build.id.clone(),
        missing: dep_id.clone(),
      })?;
      if seen.insert(&dep.id) {
        queue.push_back(dep);
      }
    }
  }

  Ok(order)
}

/// Post-order DFS visitation from the sandbox root: dependencies before
/// dependents, each id visited once.
pub fn post_order_dfs(sandbox: &BuildSandbox) -> Result<Vec<&Build>, GraphError> {
  let root = sandbox
    .root_build()
    .ok_or_else(|| GraphError::MissingRoot(sandbox.root.clone()))?;
  let mut order = Vec::new();
  let mut seen = HashSet::new();
  visit_post_order(sandbox, root, &mut seen, &mut order)?;
  Ok(order)
}

/// The transitive dependencies of `build` in BFS order, excluding `build`.
pub fn collect_transitive_dependencies<'a>(
  sandbox: &'a BuildSandbox,
  build: &'a Build,
) -> Result<Vec<&'a Build>, GraphError> {
  let mut order = bfs_from(sandbox, build)?;
  order.remove(0);
  Ok(order)
}

/// The transitive dependencies of `build` in post-order DFS (deepest first),
/// excluding `build`. This is the order dependency env groups and findlib
/// path entries appear in.
pub fn dependencies_post_order<'a>(sandbox: &'a BuildSandbox, build: &'a Build) -> Result<Vec<&'a Build>, GraphError> {
  let mut order = Vec::new();
  let mut seen = HashSet::new();
  visit_post_order(sandbox, build, &mut seen, &mut order)?;
  order.pop();
  Ok(order)
}

fn visit_post_order<'a>(
  sandbox: &'a BuildSandbox,
  build: &'a Build,
  seen: &mut HashSet<BuildId>,
  order: &mut Vec<&'a Build>,
) -> Result<(), GraphError> {
  if !seen.insert(build.id.clone()) {
    return Ok(());
  }
  for dep_id in &build.dependencies {
    let dep = sandbox.get(dep_id).ok_or_else(|| GraphError::UnresolvedReference {
      from: build.id.clone(),
      missing: dep_id.clone(),
    })?;
    visit_post_order(sandbox, dep, seen, order)?;
  }
  order.push(build);
  Ok(())
}

/// Validate a sandbox before any command runs.
///
/// Checks, in order: every dependency reference resolves, the reachable
/// graph is acyclic, and no reachable build carries manifest diagnostics.
/// Diagnostics are aggregated across all reachable builds so the front-end
/// can report everything at once.
pub fn validate(sandbox: &BuildSandbox) -> Result<(), BuildError> {
  let reachable = bfs(sandbox)?;

  verify_acyclic(sandbox, &reachable)?;

  let mut diagnostics = Vec::new();
  for build in &reachable {
    for error in &build.errors {
      diagnostics.push(format!("{}: {}", build.spec_label(), error));
    }
  }
  if !diagnostics.is_empty() {
    return Err(BuildError::Manifest { diagnostics });
  }

  Ok(())
}

/// Cycle check over the reachable graph.
///
/// BFS terminates on cyclic graphs (the visited set bounds it), so a
/// separate topological check is needed to reject them.
fn verify_acyclic(sandbox: &BuildSandbox, reachable: &[&Build]) -> Result<(), GraphError> {
  let mut graph = DiGraph::<&BuildId, ()>::new();
  let mut nodes = HashMap::new();

  for build in reachable {
    let idx = graph.add_node(&build.id);
    nodes.insert(&build.id, idx);
  }
  for build in reachable {
    for dep_id in &build.dependencies {
      let dep = sandbox.get(dep_id).ok_or_else(|| GraphError::UnresolvedReference {
        from: build.id.clone(),
        missing: dep_id.clone(),
      })?;
      graph.add_edge(nodes[&dep.id], nodes[&build.id], ());
    }
  }

  toposort(&graph, None).map_err(|cycle| GraphError::CycleDetected((*graph[cycle.node_id()]).clone()))?;
  Ok(())
}
