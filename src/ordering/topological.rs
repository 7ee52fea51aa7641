//! Depth-first topological sort over the foreign-key graph

use std::collections::BTreeMap;

use crate::schema::{SetupError, SetupResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Total order over table names in which every parent precedes its children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologicalOrder {
    tables: Vec<String>,
    rank: BTreeMap<String, usize>,
}

impl TopologicalOrder {
    /// Build the order from a `child -> parents` graph
    ///
    /// Nodes are visited in name order so the result is deterministic. A
    /// cycle, including a table referencing itself, fails with
    /// `CyclicForeignKeys` naming the path.
    pub fn build(graph: &BTreeMap<String, Vec<String>>) -> SetupResult<Self> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut tables = Vec::with_capacity(graph.len());

        for node in graph.keys() {
            let mut path = Vec::new();
            Self::visit(node, graph, &mut marks, &mut path, &mut tables)?;
        }

        let rank = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Ok(Self { tables, rank })
    }

    fn visit<'a>(
        node: &'a str,
        graph: &'a BTreeMap<String, Vec<String>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        out: &mut Vec<String>,
    ) -> SetupResult<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Err(SetupError::CyclicForeignKeys { cycle });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);

        if let Some(parents) = graph.get(node) {
            let mut sorted: Vec<&String> = parents.iter().collect();
            sorted.sort();
            for parent in sorted {
                // Parents outside the graph are rejected by the registry
                if graph.contains_key(parent) {
                    Self::visit(parent, graph, marks, path, out)?;
                }
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        out.push(node.to_string());
        Ok(())
    }

    /// Tables, parents first
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Position of a table; unknown tables sort last
    pub fn rank(&self, table: &str) -> usize {
        self.rank.get(table).copied().unwrap_or(usize::MAX)
    }

    /// Sort items so parents come before children (stable)
    pub fn sort_parents_first<T, F>(&self, items: &mut [T], table_of: F)
    where
        F: Fn(&T) -> &str,
    {
        items.sort_by_key(|item| self.rank(table_of(item)));
    }

    /// Sort items so children come before parents (stable)
    pub fn sort_children_first<T, F>(&self, items: &mut [T], table_of: F)
    where
        F: Fn(&T) -> &str,
    {
        items.sort_by_key(|item| std::cmp::Reverse(self.rank(table_of(item))));
    }
}
