//! Reference graph indexer for reducible control flow
//!
//! Produces a [`BlockMap`] for any reducible graph:
//!
//! 1. reverse postorder and dominators (Cooper-Harvey-Kennedy)
//! 2. natural loops from back edges, nested by containment
//! 3. a topological order of forward edges that keeps every loop contiguous
//! 4. loop ranges, plus block ranges for nodes joined by a distant forward
//!    edge or entered through an exception edge
//! 5. repair of block ranges that would cross another range

use super::block_map::{BlockMap, RegionKind};
use crate::ir::{BasicBlock, BasicBlockId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Edge {from} -> {to} leaves the graph")]
    DanglingEdge { from: BasicBlockId, to: BasicBlockId },

    #[error("Graph is irreducible at {0}")]
    Irreducible(BasicBlockId),

    #[error("{0}")]
    Invalid(String),
}

/// The part of a method graph being indexed.
///
/// Edges to `detached` nodes are ignored: those nodes belong to another part.
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    pub blocks: &'a [BasicBlock],
    pub entry: BasicBlockId,
    pub detached: &'a FxHashSet<BasicBlockId>,
}

impl<'a> GraphView<'a> {
    pub fn new(
        blocks: &'a [BasicBlock],
        entry: BasicBlockId,
        detached: &'a FxHashSet<BasicBlockId>,
    ) -> Self {
        Self {
            blocks,
            entry,
            detached,
        }
    }

    pub fn successors(&self, id: BasicBlockId) -> Result<Vec<BasicBlockId>, IndexError> {
        let block = self.blocks.get(id.index()).ok_or(IndexError::DanglingEdge {
            from: id,
            to: id,
        })?;
        let mut succs = Vec::new();
        for target in block.successors() {
            if target.index() >= self.blocks.len() {
                return Err(IndexError::DanglingEdge {
                    from: id,
                    to: target,
                });
            }
            if target != self.entry && self.detached.contains(&target) {
                continue;
            }
            if !succs.contains(&target) {
                succs.push(target);
            }
        }
        Ok(succs)
    }

    pub fn handler_targets(&self, id: BasicBlockId) -> impl Iterator<Item = BasicBlockId> + 'a {
        self.blocks
            .get(id.index())
            .into_iter()
            .flat_map(|block| block.handlers.iter().map(|h| h.handler))
    }
}

/// Interface of the graph-indexing pass
pub trait GraphIndexer {
    fn index(&self, graph: &GraphView<'_>) -> Result<BlockMap, IndexError>;
}

/// Default indexer: loop nesting over dominator-based natural loops
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopNestIndexer;

struct NaturalLoop {
    /// RPO index of the head
    head: usize,
    body: FxHashSet<usize>,
    parent: Option<usize>,
}

struct Analysis {
    rpo: Vec<BasicBlockId>,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    loops: Vec<NaturalLoop>,
}

impl GraphIndexer for LoopNestIndexer {
    fn index(&self, graph: &GraphView<'_>) -> Result<BlockMap, IndexError> {
        let analysis = analyze(graph)?;
        let order = order_nodes(&analysis)?;

        let mut position = vec![0usize; analysis.rpo.len()];
        for (pos, &node) in order.iter().enumerate() {
            position[node] = pos;
        }

        let mut ranges: Vec<(RegionKind, usize, usize)> = Vec::new();
        for lp in &analysis.loops {
            let start = position[lp.head];
            let last = lp.body.iter().map(|&n| position[n]).max().unwrap_or(start);
            if last + 1 - start != lp.body.len() {
                return Err(IndexError::Invalid(format!(
                    "loop at {} is not contiguous",
                    analysis.rpo[lp.head]
                )));
            }
            ranges.push((RegionKind::Loop, start, last + 1));
        }

        let handlers: FxHashSet<BasicBlockId> = analysis
            .rpo
            .iter()
            .flat_map(|&id| graph.handler_targets(id))
            .collect();
        for (node, preds) in analysis.preds.iter().enumerate() {
            let p = position[node];
            let first = preds
                .iter()
                .map(|&pred| position[pred])
                .filter(|&pos| pos < p)
                .min();
            if let Some(s) = first {
                if s + 1 < p || handlers.contains(&analysis.rpo[node]) {
                    ranges.push((RegionKind::Block, s, p));
                }
            }
        }

        repair_crossings(&mut ranges, &order, &analysis.rpo)?;
        // a block spanning exactly a loop exits where the loop does
        let loops: FxHashSet<(usize, usize)> = ranges
            .iter()
            .filter(|r| r.0 == RegionKind::Loop)
            .map(|r| (r.1, r.2))
            .collect();
        ranges.retain(|r| r.0 == RegionKind::Loop || !loops.contains(&(r.1, r.2)));

        let ids = order.iter().map(|&n| analysis.rpo[n]).collect();
        BlockMap::new(ids, ranges).map_err(IndexError::Invalid)
    }
}

fn analyze(graph: &GraphView<'_>) -> Result<Analysis, IndexError> {
    // Iterative DFS postorder
    let mut visited: FxHashSet<BasicBlockId> = FxHashSet::default();
    let mut postorder: Vec<BasicBlockId> = Vec::new();
    let mut stack: Vec<(BasicBlockId, Vec<BasicBlockId>, usize)> = Vec::new();
    visited.insert(graph.entry);
    stack.push((graph.entry, graph.successors(graph.entry)?, 0));
    while let Some((node, succs, next)) = stack.last_mut() {
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if visited.insert(succ) {
                let succ_succs = graph.successors(succ)?;
                stack.push((succ, succ_succs, 0));
            }
        } else {
            postorder.push(*node);
            stack.pop();
        }
    }
    let rpo: Vec<BasicBlockId> = postorder.into_iter().rev().collect();
    let index: FxHashMap<BasicBlockId, usize> =
        rpo.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut succs = vec![Vec::new(); rpo.len()];
    let mut preds = vec![Vec::new(); rpo.len()];
    for (i, &id) in rpo.iter().enumerate() {
        for succ in graph.successors(id)? {
            let j = index[&succ];
            succs[i].push(j);
            preds[j].push(i);
        }
    }

    let idom = dominators(&preds);
    let dominates = |a: usize, mut b: usize| loop {
        if a == b {
            return true;
        }
        if b == 0 {
            return false;
        }
        b = idom[b];
    };

    let mut latches: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for (u, targets) in succs.iter().enumerate() {
        for &v in targets {
            if v <= u {
                if !dominates(v, u) {
                    return Err(IndexError::Irreducible(rpo[v]));
                }
                latches.entry(v).or_default().push(u);
            }
        }
    }

    let mut heads: Vec<usize> = latches.keys().copied().collect();
    heads.sort_unstable();
    let mut loops: Vec<NaturalLoop> = heads
        .into_iter()
        .map(|head| {
            let mut body = FxHashSet::default();
            body.insert(head);
            let mut work: Vec<usize> = latches[&head].clone();
            while let Some(n) = work.pop() {
                if body.insert(n) {
                    work.extend(preds[n].iter().copied());
                }
            }
            NaturalLoop {
                head,
                body,
                parent: None,
            }
        })
        .collect();

    for i in 0..loops.len() {
        let head = loops[i].head;
        let parent = (0..loops.len())
            .filter(|&j| j != i && loops[j].body.contains(&head))
            .min_by_key(|&j| loops[j].body.len());
        loops[i].parent = parent;
    }

    Ok(Analysis {
        rpo,
        succs,
        preds,
        loops,
    })
}

/// Immediate dominators over RPO indices; the entry is its own dominator
fn dominators(preds: &[Vec<usize>]) -> Vec<usize> {
    const UNSET: usize = usize::MAX;
    let mut idom = vec![UNSET; preds.len()];
    if preds.is_empty() {
        return idom;
    }
    idom[0] = 0;
    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..preds.len() {
            let mut new_idom = UNSET;
            for &p in &preds[b] {
                if idom[p] == UNSET {
                    continue;
                }
                new_idom = if new_idom == UNSET {
                    p
                } else {
                    intersect(&idom, p, new_idom)
                };
            }
            if new_idom != UNSET && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }
    idom
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}

fn order_nodes(analysis: &Analysis) -> Result<Vec<usize>, IndexError> {
    let all: FxHashSet<usize> = (0..analysis.rpo.len()).collect();
    let mut order = Vec::with_capacity(all.len());
    order_region(analysis, &all, 0, None, &mut order)?;
    Ok(order)
}

/// Topologically order `members`, collapsing each child loop into its head
/// and expanding it in place.
fn order_region(
    analysis: &Analysis,
    members: &FxHashSet<usize>,
    head: usize,
    region_loop: Option<usize>,
    out: &mut Vec<usize>,
) -> Result<(), IndexError> {
    let children: Vec<usize> = (0..analysis.loops.len())
        .filter(|&l| analysis.loops[l].parent == region_loop)
        .filter(|&l| members.contains(&analysis.loops[l].head))
        .filter(|&l| Some(l) != region_loop)
        .collect();
    let rep = |n: usize| {
        children
            .iter()
            .find(|&&l| analysis.loops[l].body.contains(&n))
            .map(|&l| analysis.loops[l].head)
            .unwrap_or(n)
    };

    let mut edges: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    let mut in_degree: FxHashMap<usize, usize> = FxHashMap::default();
    for &n in members {
        in_degree.entry(rep(n)).or_insert(0);
    }
    for &u in members {
        for &v in &analysis.succs[u] {
            if !members.contains(&v) || v == head {
                continue;
            }
            let (ru, rv) = (rep(u), rep(v));
            if ru == rv {
                continue;
            }
            let targets = edges.entry(ru).or_default();
            if !targets.contains(&rv) {
                targets.push(rv);
                *in_degree.entry(rv).or_insert(0) += 1;
            }
        }
    }

    // Ready nodes leave in block id order so input order survives where possible
    let key = |n: usize| Reverse((analysis.rpo[n], n));
    let mut ready: BinaryHeap<Reverse<(BasicBlockId, usize)>> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| key(n))
        .collect();
    let total = in_degree.len();
    let mut emitted = 0;
    while let Some(Reverse((_, n))) = ready.pop() {
        emitted += 1;
        match children.iter().find(|&&l| analysis.loops[l].head == n) {
            Some(&child) => {
                let body = &analysis.loops[child].body;
                order_region(analysis, body, n, Some(child), out)?;
            }
            None => out.push(n),
        }
        for &succ in edges.get(&n).map(|v| v.as_slice()).unwrap_or(&[]) {
            if let Some(d) = in_degree.get_mut(&succ) {
                *d -= 1;
                if *d == 0 {
                    ready.push(key(succ));
                }
            }
        }
    }
    if emitted != total {
        return Err(IndexError::Irreducible(analysis.rpo[head]));
    }
    Ok(())
}

/// Widen block ranges until every pair of ranges is nested or disjoint
fn repair_crossings(
    ranges: &mut [(RegionKind, usize, usize)],
    order: &[usize],
    rpo: &[BasicBlockId],
) -> Result<(), IndexError> {
    loop {
        let mut changed = false;
        for i in 0..ranges.len() {
            if ranges[i].0 != RegionKind::Block {
                continue;
            }
            for j in 0..ranges.len() {
                if i == j {
                    continue;
                }
                let (_, s, p) = ranges[i];
                let (kind, a, b) = ranges[j];
                if a < s && s < b && b < p {
                    ranges[i].1 = a;
                    changed = true;
                } else if s < a && a < p && p < b {
                    if kind == RegionKind::Loop {
                        return Err(IndexError::Irreducible(rpo[order[p]]));
                    }
                    ranges[j].1 = s;
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BranchCondition, Terminator, Var};

    fn graph(edges: &[&[u32]]) -> Vec<BasicBlock> {
        edges
            .iter()
            .enumerate()
            .map(|(i, succs)| {
                let mut block = BasicBlock::new(BasicBlockId(i as u32));
                block.terminator = match succs {
                    [] => Terminator::ret(None),
                    [t] => Terminator::jump(BasicBlockId(*t)),
                    [a, b] => Terminator::Branch {
                        condition: BranchCondition::NotEqual,
                        operand: Var(1),
                        consequent: BasicBlockId(*a),
                        alternative: BasicBlockId(*b),
                    },
                    _ => Terminator::Switch {
                        value: Var(1),
                        cases: succs[..succs.len() - 1]
                            .iter()
                            .enumerate()
                            .map(|(k, t)| (k as i32, BasicBlockId(*t)))
                            .collect(),
                        default: BasicBlockId(succs[succs.len() - 1]),
                    },
                };
                block
            })
            .collect()
    }

    fn index(blocks: &[BasicBlock]) -> Result<BlockMap, IndexError> {
        let detached = FxHashSet::default();
        LoopNestIndexer.index(&GraphView::new(blocks, BasicBlockId(0), &detached))
    }

    fn order(map: &BlockMap) -> Vec<u32> {
        map.order().iter().map(|id| id.0).collect()
    }

    #[test]
    fn test_diamond() {
        // 0 -> 1 | 2 -> 3
        let blocks = graph(&[&[1, 2], &[3], &[3], &[]]);
        let map = index(&blocks).unwrap();
        assert_eq!(order(&map), vec![0, 1, 2, 3]);
        // [0, 2) lets 0 jump to 2; [1, 3) is widened to [0, 3) around it
        let spans: Vec<(RegionKind, usize, usize)> = map
            .regions()
            .iter()
            .map(|r| (r.kind, r.start, r.end))
            .collect();
        assert_eq!(
            spans,
            vec![(RegionKind::Block, 0, 3), (RegionKind::Block, 0, 2)]
        );
    }

    #[test]
    fn test_while_loop_keeps_body_contiguous() {
        // 0 -> 1; 1 -> 2 | 3; 2 -> 1; 3 return
        let blocks = graph(&[&[1], &[2, 3], &[1], &[]]);
        let map = index(&blocks).unwrap();
        assert_eq!(order(&map), vec![0, 1, 2, 3]);
        let lp = map
            .regions()
            .iter()
            .find(|r| r.kind == RegionKind::Loop)
            .unwrap();
        assert_eq!((lp.start, lp.end), (1, 3));
    }

    #[test]
    fn test_self_loop() {
        let blocks = graph(&[&[0, 1], &[]]);
        let map = index(&blocks).unwrap();
        let lp = &map.regions()[0];
        assert_eq!((lp.kind, lp.start, lp.end), (RegionKind::Loop, 0, 1));
    }

    #[test]
    fn test_loop_exit_block_encloses_loop() {
        // 0 -> 1; 1 -> 2 | 4 (early exit); 2 -> 3 | 1; 3 -> 4; 4 return
        let blocks = graph(&[&[1], &[2, 4], &[3, 1], &[4], &[]]);
        let map = index(&blocks).unwrap();
        assert_eq!(order(&map), vec![0, 1, 2, 3, 4]);
        let loop_region = map
            .regions()
            .iter()
            .position(|r| r.kind == RegionKind::Loop)
            .unwrap();
        let lp = &map.regions()[loop_region];
        assert_eq!((lp.start, lp.end), (1, 3));
        // the break target 4 gets a block around the loop
        let block = map
            .regions()
            .iter()
            .find(|r| r.kind == RegionKind::Block && r.end == 4)
            .unwrap();
        assert!(block.start <= lp.start);
    }

    #[test]
    fn test_irreducible_is_rejected() {
        // 0 -> 1 | 2; 1 -> 2; 2 -> 1
        let blocks = graph(&[&[1, 2], &[2], &[1]]);
        assert!(matches!(index(&blocks), Err(IndexError::Irreducible(_))));
    }

    #[test]
    fn test_dangling_edge() {
        let blocks = graph(&[&[7]]);
        assert!(matches!(index(&blocks), Err(IndexError::DanglingEdge { .. })));
    }

    #[test]
    fn test_detached_nodes_are_excluded() {
        let blocks = graph(&[&[1], &[2], &[]]);
        let mut detached = FxHashSet::default();
        detached.insert(BasicBlockId(1));
        let map = LoopNestIndexer
            .index(&GraphView::new(&blocks, BasicBlockId(0), &detached))
            .unwrap();
        assert_eq!(order(&map), vec![0]);
    }

    #[test]
    fn test_nested_loops() {
        // 0 -> 1; 1 -> 2 | 5; 2 -> 3; 3 -> 2 | 4; 4 -> 1; 5 return
        let blocks = graph(&[&[1], &[2, 5], &[3], &[2, 4], &[1], &[]]);
        let map = index(&blocks).unwrap();
        assert_eq!(order(&map), vec![0, 1, 2, 3, 4, 5]);
        let loops: Vec<(usize, usize)> = map
            .regions()
            .iter()
            .filter(|r| r.kind == RegionKind::Loop)
            .map(|r| (r.start, r.end))
            .collect();
        assert_eq!(loops, vec![(1, 5), (2, 4)]);
    }
}
