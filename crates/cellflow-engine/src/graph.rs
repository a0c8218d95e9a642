//! Dependency graph between cells.
//!
//! Derived entirely from the cells' read/write sets and rebuilt after every
//! content or position edit, so it never carries stale edges. An edge runs
//! from a writer of `name` to every reader of `name`; a cell reading a name
//! it writes itself gets no edge.
//!
//! Cycles are found with a path-marking depth-first search. Every cell on a
//! cycle is recorded with the cycle's path; those cells are never scheduled.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::cell::{Cell, CellId};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    positions: HashMap<CellId, usize>,
    writers: HashMap<String, Vec<CellId>>,
    readers: HashMap<String, Vec<CellId>>,
    /// cell -> cells that read something it writes
    dependents: HashMap<CellId, BTreeSet<CellId>>,
    /// cell -> cells it reads from
    dependencies: HashMap<CellId, BTreeSet<CellId>>,
    cycles: HashMap<CellId, Vec<CellId>>,
}

impl DependencyGraph {
    /// Build the graph over `cells` in notebook order.
    pub fn build(cells: &[Cell]) -> Self {
        let mut graph = DependencyGraph::default();

        for (position, cell) in cells.iter().enumerate() {
            graph.positions.insert(cell.id.clone(), position);
            for name in cell.writes.names() {
                graph.writers.entry(name).or_default().push(cell.id.clone());
            }
            for name in &cell.reads {
                graph
                    .readers
                    .entry(name.clone())
                    .or_default()
                    .push(cell.id.clone());
            }
        }

        for (name, writers) in &graph.writers {
            let Some(readers) = graph.readers.get(name) else {
                continue;
            };
            for writer in writers {
                for reader in readers {
                    if writer == reader {
                        continue;
                    }
                    graph
                        .dependents
                        .entry(writer.clone())
                        .or_default()
                        .insert(reader.clone());
                    graph
                        .dependencies
                        .entry(reader.clone())
                        .or_default()
                        .insert(writer.clone());
                }
            }
        }

        graph.detect_cycles(cells);
        graph
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position(&self, id: &CellId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Cells that read something `id` writes.
    pub fn dependents(&self, id: &CellId) -> impl Iterator<Item = &CellId> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// Cells whose writes `id` reads.
    pub fn dependencies(&self, id: &CellId) -> impl Iterator<Item = &CellId> {
        self.dependencies.get(id).into_iter().flatten()
    }

    pub fn writers_of(&self, name: &str) -> &[CellId] {
        self.writers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn readers_of(&self, name: &str) -> &[CellId] {
        self.readers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The cycle `id` sits on, as a closed path.
    pub fn cycle_of(&self, id: &CellId) -> Option<&[CellId]> {
        self.cycles.get(id).map(Vec::as_slice)
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// `seeds` plus every cell transitively downstream of them.
    pub fn closure<'a>(&self, seeds: impl IntoIterator<Item = &'a CellId>) -> BTreeSet<CellId> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<CellId> = seeds
            .into_iter()
            .filter(|id| self.contains(id))
            .cloned()
            .collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            for dependent in self.dependents(&id) {
                if !visited.contains(dependent) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        visited
    }

    /// Topologically order `set` (dependencies before dependents).
    ///
    /// Cells are released depth by depth; within one depth they keep notebook
    /// position order. Cells stuck on a cycle are left out.
    pub fn order(&self, set: &BTreeSet<CellId>) -> Vec<CellId> {
        let mut in_degree: HashMap<&CellId, usize> = HashMap::new();
        let mut wave: BTreeSet<(usize, &CellId)> = BTreeSet::new();

        for id in set {
            let Some(position) = self.position(id) else {
                continue;
            };
            let degree = self.dependencies(id).filter(|d| set.contains(*d)).count();
            in_degree.insert(id, degree);
            if degree == 0 {
                wave.insert((position, id));
            }
        }

        let mut order = Vec::with_capacity(set.len());
        while !wave.is_empty() {
            let mut next = BTreeSet::new();
            for (_, id) in std::mem::take(&mut wave) {
                order.push(id.clone());
                for dependent in self.dependents(id) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0
                            && let Some(position) = self.position(dependent)
                        {
                            next.insert((position, dependent));
                        }
                    }
                }
            }
            wave = next;
        }

        order
    }

    fn detect_cycles(&mut self, cells: &[Cell]) {
        let mut finished: HashSet<CellId> = HashSet::new();
        let mut visiting: HashSet<CellId> = HashSet::new();
        let mut path: Vec<CellId> = Vec::new();
        let mut found: Vec<Vec<CellId>> = Vec::new();

        for cell in cells {
            if !finished.contains(&cell.id) {
                self.cycle_dfs(&cell.id, &mut visiting, &mut finished, &mut path, &mut found);
            }
        }

        for cycle in found {
            for id in &cycle[..cycle.len() - 1] {
                self.cycles.entry(id.clone()).or_insert_with(|| cycle.clone());
            }
        }

        // A back edge only reports one path; sweep for cells on overlapping
        // cycles that no reported path passed through.
        if self.cycles.is_empty() {
            return;
        }
        for cell in cells {
            if self.cycles.contains_key(&cell.id) {
                continue;
            }
            if let Some(cycle) = self.path_back_to(&cell.id) {
                self.cycles.insert(cell.id.clone(), cycle);
            }
        }
    }

    /// Shortest path `start -> ... -> start`, if one exists.
    fn path_back_to(&self, start: &CellId) -> Option<Vec<CellId>> {
        let mut parent: HashMap<CellId, CellId> = HashMap::new();
        let mut queue: VecDeque<CellId> = VecDeque::new();
        for next in self.dependents(start) {
            parent.entry(next.clone()).or_insert_with(|| start.clone());
            queue.push_back(next.clone());
        }

        while let Some(id) = queue.pop_front() {
            if &id == start {
                let mut path = vec![start.clone()];
                let mut cursor = parent.get(start)?.clone();
                while &cursor != start {
                    path.push(cursor.clone());
                    cursor = parent.get(&cursor)?.clone();
                }
                path.push(start.clone());
                path.reverse();
                return Some(path);
            }
            for next in self.dependents(&id) {
                if !parent.contains_key(next) {
                    parent.insert(next.clone(), id.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        None
    }

    fn cycle_dfs(
        &self,
        current: &CellId,
        visiting: &mut HashSet<CellId>,
        finished: &mut HashSet<CellId>,
        path: &mut Vec<CellId>,
        found: &mut Vec<Vec<CellId>>,
    ) {
        visiting.insert(current.clone());
        path.push(current.clone());

        let next: Vec<CellId> = self.dependents(current).cloned().collect();
        for dep in &next {
            if visiting.contains(dep) {
                if let Some(start) = path.iter().position(|id| id == dep) {
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    found.push(cycle);
                }
            } else if !finished.contains(dep) {
                self.cycle_dfs(dep, visiting, finished, path, found);
            }
        }

        path.pop();
        visiting.remove(current);
        finished.insert(current.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellDefinition;

    fn cells(defs: Vec<CellDefinition>) -> Vec<Cell> {
        defs.into_iter().map(Cell::new).collect()
    }

    fn id(s: &str) -> CellId {
        CellId::from(s)
    }

    #[test]
    fn test_edges_follow_names() {
        let cells = cells(vec![
            CellDefinition::input("in", "a", "1"),
            CellDefinition::formula("f", "b", "a * 2"),
            CellDefinition::markdown("md", "{{b}}"),
        ]);
        let graph = DependencyGraph::build(&cells);
        assert_eq!(graph.dependents(&id("in")).collect::<Vec<_>>(), vec![&id("f")]);
        assert_eq!(graph.dependencies(&id("md")).collect::<Vec<_>>(), vec![&id("f")]);
        assert_eq!(graph.readers_of("a"), &[id("f")]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_self_read_is_not_a_cycle() {
        let cells = cells(vec![CellDefinition::script(
            "s",
            "exports.count = count + 1;",
        )]);
        let graph = DependencyGraph::build(&cells);
        assert!(graph.cycle_of(&id("s")).is_none());
        assert_eq!(graph.dependents(&id("s")).count(), 0);
    }

    #[test]
    fn test_two_cell_cycle_marks_both() {
        let cells = cells(vec![
            CellDefinition::formula("A", "a", "b + 1"),
            CellDefinition::formula("B", "b", "a + 1"),
            CellDefinition::formula("C", "c", "a + b"),
        ]);
        let graph = DependencyGraph::build(&cells);
        assert_eq!(
            graph.cycle_of(&id("A")).unwrap(),
            &[id("A"), id("B"), id("A")]
        );
        assert!(graph.cycle_of(&id("B")).is_some());
        assert!(graph.cycle_of(&id("C")).is_none());
    }

    #[test]
    fn test_closure_is_transitive() {
        let cells = cells(vec![
            CellDefinition::input("in", "a", "1"),
            CellDefinition::formula("f1", "b", "a + 1"),
            CellDefinition::formula("f2", "c", "b + 1"),
            CellDefinition::formula("other", "z", "42"),
        ]);
        let graph = DependencyGraph::build(&cells);
        let closure = graph.closure([&id("in")]);
        assert_eq!(closure, BTreeSet::from([id("in"), id("f1"), id("f2")]));
    }

    #[test]
    fn test_order_breaks_ties_by_position() {
        let cells = cells(vec![
            CellDefinition::formula("late", "y", "x + 1"),
            CellDefinition::formula("early", "z", "x + 2"),
            CellDefinition::input("src", "x", "1"),
            CellDefinition::formula("sum", "w", "y + z"),
        ]);
        let graph = DependencyGraph::build(&cells);
        let all: BTreeSet<CellId> = cells.iter().map(|c| c.id.clone()).collect();
        assert_eq!(
            graph.order(&all),
            vec![id("src"), id("late"), id("early"), id("sum")]
        );
    }
}
