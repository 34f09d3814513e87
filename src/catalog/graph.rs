// src/catalog/graph.rs

//! Forward and reverse dependency edges between catalog packages

use super::PackageRecord;
use std::collections::HashMap;

/// Separator used when rendering a dependency path
pub const PATH_ARROW: &str = " > ";

/// Adjacency built from the `requires` lists of a catalog
#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: HashMap<String, Vec<String>>,
    reverse: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn build<'a>(records: impl IntoIterator<Item = &'a PackageRecord>) -> Self {
        let mut graph = Self::default();
        for record in records {
            for dep in &record.requires {
                graph
                    .reverse
                    .entry(dep.clone())
                    .or_default()
                    .push(record.name.clone());
            }
            graph
                .forward
                .insert(record.name.clone(), record.requires.clone());
        }
        graph
    }

    /// Direct requirements of `name`; unknown names have none
    pub fn requires(&self, name: &str) -> &[String] {
        self.forward.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Packages that directly require `name`
    pub fn required_by(&self, name: &str) -> &[String] {
        self.reverse.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every path from `root` along forward edges, one entry per visited node
    pub fn depends(&self, root: &str) -> Vec<String> {
        walk(&self.forward, root)
    }

    /// Every path from `root` along reverse edges
    pub fn rdepends(&self, root: &str) -> Vec<String> {
        walk(&self.reverse, root)
    }
}

/// Depth-first walk that refuses to re-enter a node already on the current
/// path. Diamonds reached through different paths are reported once per path.
fn walk(edges: &HashMap<String, Vec<String>>, root: &str) -> Vec<String> {
    fn visit<'a>(
        edges: &'a HashMap<String, Vec<String>>,
        node: &'a str,
        stack: &mut Vec<&'a str>,
        out: &mut Vec<String>,
    ) {
        if stack.contains(&node) {
            return;
        }
        stack.push(node);
        out.push(stack.join(PATH_ARROW));
        if let Some(next) = edges.get(node) {
            for child in next {
                visit(edges, child, stack, out);
            }
        }
        stack.pop();
    }

    let mut out = Vec::new();
    visit(edges, root, &mut Vec::new(), &mut out);
    out
}
