use crate::error::{BlockedItem, PlanError};
use crate::fs::{case_fold, FileSystem};
use crate::journal::{Operation, Stage};
use crate::preview::PreviewItem;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub fn plan(items: &[PreviewItem], fs: &dyn FileSystem) -> Result<Vec<Operation>, PlanError> {
    let blocked: Vec<BlockedItem> = items
        .iter()
        .filter(|item| item.is_blocked())
        .map(|item| BlockedItem {
            path: item.original_path.clone(),
            target: item.new_path.clone(),
            conflicts: item.conflicts.clone(),
        })
        .collect();
    if !blocked.is_empty() {
        return Err(PlanError::BlockingConflicts {
            count: blocked.len(),
            blocked,
        });
    }

    let mut nodes: Vec<Operation> = items
        .iter()
        .filter(|item| item.is_changed())
        .map(|item| Operation::direct(item.original_path.clone(), item.new_path.clone()))
        .collect();
    nodes.sort_by(|a, b| a.original.cmp(&b.original));

    let mut taken: HashSet<String> = nodes
        .iter()
        .flat_map(|op| [case_fold(&op.original), case_fold(&op.target)])
        .collect();

    loop {
        let graph = DependencyGraph::build(&nodes);
        let cycles = graph.cycles();
        if cycles.is_empty() {
            return Ok(graph.order(nodes));
        }
        let mut split_any = false;
        for cycle in &cycles {
            let Some(&victim) = cycle
                .iter()
                .filter(|&&n| nodes[n].stage == Stage::Direct)
                .min_by(|&&a, &&b| nodes[a].original.cmp(&nodes[b].original))
            else {
                continue;
            };
            let temporary = temporary_for(&nodes[victim].original, &mut taken, fs);
            debug!(
                original = %nodes[victim].original.display(),
                temporary = %temporary.display(),
                members = cycle.len(),
                "breaking rename cycle"
            );
            let original = nodes[victim].original.clone();
            let target = nodes[victim].target.clone();
            nodes[victim] = Operation::staged(
                original.clone(),
                target.clone(),
                temporary.clone(),
                Stage::ToTemporary,
            );
            nodes.push(Operation::staged(
                original,
                target,
                temporary,
                Stage::FromTemporary,
            ));
            split_any = true;
        }
        if !split_any {
            let mut paths: Vec<PathBuf> = cycles
                .iter()
                .flatten()
                .map(|&n| nodes[n].original.clone())
                .collect();
            paths.sort();
            paths.dedup();
            return Err(PlanError::UnresolvableCycle { paths });
        }
    }
}

// u -> v: u vacates the path v lands on, or u creates the temporary v leaves
struct DependencyGraph {
    successors: Vec<Vec<usize>>,
    indegree: Vec<usize>,
}

impl DependencyGraph {
    fn build(nodes: &[Operation]) -> Self {
        let mut by_source = HashMap::<String, Vec<usize>>::new();
        let mut entering = HashMap::<&Path, usize>::new();
        for (index, op) in nodes.iter().enumerate() {
            match (op.stage, op.temporary.as_deref()) {
                (Stage::FromTemporary, _) => {}
                (Stage::ToTemporary, Some(temporary)) => {
                    entering.insert(temporary, index);
                    by_source.entry(case_fold(op.from())).or_default().push(index);
                }
                _ => by_source.entry(case_fold(op.from())).or_default().push(index),
            }
        }

        let mut successors = vec![Vec::new(); nodes.len()];
        let mut indegree = vec![0usize; nodes.len()];
        let mut link = |u: usize, v: usize| {
            successors[u].push(v);
            indegree[v] += 1;
        };
        for (v, op) in nodes.iter().enumerate() {
            if op.stage == Stage::FromTemporary {
                if let Some(&u) = op.temporary.as_deref().and_then(|t| entering.get(t)) {
                    link(u, v);
                }
            }
            let Some(vacating) = by_source.get(&case_fold(op.to())) else {
                continue;
            };
            for &u in vacating {
                if u != v {
                    link(u, v);
                }
            }
        }
        Self {
            successors,
            indegree,
        }
    }

    fn cycles(&self) -> Vec<Vec<usize>> {
        const UNSEEN: usize = usize::MAX;
        let n = self.successors.len();
        let mut index = vec![UNSEEN; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut next_index = 0usize;
        let mut out = Vec::new();

        for root in 0..n {
            if index[root] != UNSEEN {
                continue;
            }
            index[root] = next_index;
            low[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut call = vec![(root, 0usize)];

            while let Some(frame) = call.last_mut() {
                let node = frame.0;
                if frame.1 < self.successors[node].len() {
                    let next = self.successors[node][frame.1];
                    frame.1 += 1;
                    if index[next] == UNSEEN {
                        index[next] = next_index;
                        low[next] = next_index;
                        next_index += 1;
                        stack.push(next);
                        on_stack[next] = true;
                        call.push((next, 0));
                    } else if on_stack[next] {
                        low[node] = low[node].min(index[next]);
                    }
                    continue;
                }

                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    low[parent] = low[parent].min(low[node]);
                }
                if low[node] == index[node] {
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    if component.len() > 1 {
                        out.push(component);
                    }
                }
            }
        }
        out
    }

    fn order(mut self, nodes: Vec<Operation>) -> Vec<Operation> {
        let mut ready = BTreeSet::<(PathBuf, u8, usize)>::new();
        for (index, op) in nodes.iter().enumerate() {
            if self.indegree[index] == 0 {
                ready.insert(sort_key(op, index));
            }
        }

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(key) = ready.pop_first() {
            let index = key.2;
            order.push(index);
            for &next in &self.successors[index] {
                self.indegree[next] -= 1;
                if self.indegree[next] == 0 {
                    ready.insert(sort_key(&nodes[next], next));
                }
            }
        }
        debug_assert_eq!(order.len(), nodes.len(), "acyclic graph must order fully");

        let mut slots: Vec<Option<Operation>> = nodes.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .enumerate()
            .map(|(seq, mut op)| {
                op.seq = seq;
                op
            })
            .collect()
    }
}

fn sort_key(op: &Operation, index: usize) -> (PathBuf, u8, usize) {
    let rank = match op.stage {
        Stage::ToTemporary => 0,
        Stage::Direct => 1,
        Stage::FromTemporary => 2,
    };
    (op.original.clone(), rank, index)
}

fn temporary_for(original: &Path, taken: &mut HashSet<String>, fs: &dyn FileSystem) -> PathBuf {
    let dir = original.parent().unwrap_or_else(|| Path::new("."));
    loop {
        let candidate = dir.join(format!(".gravity-{}.tmp", Uuid::new_v4().simple()));
        if !fs.exists(&candidate) && taken.insert(case_fold(&candidate)) {
            return candidate;
        }
    }
}
