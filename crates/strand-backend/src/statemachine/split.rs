//! Fragmentation of a method graph at suspension points
//!
//! Every suspending instruction is moved into a block of its own. The
//! instructions before it stay in the original block, which now jumps to the
//! call fragment; the instructions after it move to a fresh post fragment that
//! inherits the original terminator. Call fragments and post fragments start
//! parts, as does every monitor-enter of a resumable method, which does not
//! end the fragment it opens.

use crate::analysis::SuspendSet;
use crate::ir::{BasicBlock, BasicBlockId, Instruction, InstructionKind, Terminator};
use crate::structure::GraphView;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// A method graph with suspension points isolated
#[derive(Debug, Clone)]
pub struct Fragments {
    /// Original blocks first, then fragments; index equals id
    pub blocks: Vec<BasicBlock>,
    /// Nodes that begin a part, besides the entry
    pub starts: FxHashSet<BasicBlockId>,
}

/// Does executing `instr` possibly suspend the method?
pub fn suspends(instr: &Instruction, set: &SuspendSet) -> bool {
    match &instr.kind {
        InstructionKind::Invoke(invoke) => set.invocation_suspends(invoke),
        InstructionKind::InitClass { class } => set.class_init_suspends(class),
        _ => false,
    }
}

struct Fragmenter {
    blocks: Vec<BasicBlock>,
    starts: FxHashSet<BasicBlockId>,
}

impl Fragmenter {
    fn fresh(&mut self, template: &BasicBlock) -> BasicBlock {
        let id = BasicBlockId(self.blocks.len() as u32);
        let mut block = BasicBlock::new(id);
        block.handlers = template.handlers.clone();
        // Reserve the slot so later fragments get distinct ids
        self.blocks.push(BasicBlock::new(id));
        block
    }

    fn finish(&mut self, mut block: BasicBlock, next: BasicBlockId) {
        block.terminator = Terminator::jump(next);
        self.store(block);
    }

    fn store(&mut self, block: BasicBlock) {
        let index = block.id.index();
        self.blocks[index] = block;
    }
}

pub fn fragment(blocks: &[BasicBlock], set: &SuspendSet) -> Fragments {
    let mut fragmenter = Fragmenter {
        blocks: blocks.to_vec(),
        starts: FxHashSet::default(),
    };

    for original in blocks {
        let mut current = BasicBlock::new(original.id);
        current.handlers = original.handlers.clone();

        for instr in &original.instructions {
            let suspending = suspends(instr, set);
            let monitor = matches!(instr.kind, InstructionKind::MonitorEnter { .. });
            if !suspending && !monitor {
                current.instructions.push(instr.clone());
                continue;
            }

            if !current.instructions.is_empty() {
                let next = fragmenter.fresh(original);
                fragmenter.finish(current, next.id);
                current = next;
            }
            fragmenter.starts.insert(current.id);
            current.instructions.push(instr.clone());

            if suspending {
                let next = fragmenter.fresh(original);
                fragmenter.starts.insert(next.id);
                fragmenter.finish(current, next.id);
                current = next;
            }
        }

        current.terminator = original.terminator.clone();
        current.terminator_location = original.terminator_location.clone();
        fragmenter.store(current);
    }

    Fragments {
        blocks: fragmenter.blocks,
        starts: fragmenter.starts,
    }
}

/// Part entries in discovery order, entry first.
///
/// Parts are numbered breadth first: each part's nodes are explored from its
/// entry, and every other part start met on the way is numbered when first
/// seen. Starts that are unreachable get no part.
pub fn discover_parts(fragments: &Fragments, entry: BasicBlockId) -> Vec<BasicBlockId> {
    let mut entries = vec![entry];
    let mut numbered: FxHashSet<BasicBlockId> = FxHashSet::default();
    numbered.insert(entry);

    let mut next_part = 0;
    while next_part < entries.len() {
        let part_entry = entries[next_part];
        next_part += 1;

        let mut visited: FxHashSet<BasicBlockId> = FxHashSet::default();
        let mut queue = VecDeque::from([part_entry]);
        visited.insert(part_entry);
        while let Some(node) = queue.pop_front() {
            let Some(block) = fragments.blocks.get(node.index()) else {
                continue;
            };
            for succ in block.successors() {
                if succ == part_entry || !visited.insert(succ) {
                    continue;
                }
                if succ == entry || fragments.starts.contains(&succ) {
                    if numbered.insert(succ) {
                        entries.push(succ);
                    }
                    continue;
                }
                queue.push_back(succ);
            }
        }
    }
    entries
}

/// Part number of every part entry
pub fn part_numbers(entries: &[BasicBlockId]) -> FxHashMap<BasicBlockId, usize> {
    entries.iter().enumerate().map(|(i, &b)| (b, i)).collect()
}

/// The sub-graph of one part for the indexer
pub fn part_view<'a>(
    fragments: &'a Fragments,
    entry: BasicBlockId,
    detached: &'a FxHashSet<BasicBlockId>,
) -> GraphView<'a> {
    GraphView::new(&fragments.blocks, entry, detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, InvocationKind, Invoke, MethodRef, Var};

    fn blocking_call(receiver: u32) -> InstructionKind {
        InstructionKind::Invoke(Invoke {
            receiver: Some(Var(receiver)),
            method: MethodRef::new("rt.T", "block", "()I"),
            instance: None,
            arguments: vec![],
            kind: InvocationKind::Static,
            may_suspend: true,
        })
    }

    fn constant(receiver: u32, value: i32) -> InstructionKind {
        InstructionKind::Constant {
            receiver: Var(receiver),
            value: Constant::Int(value),
        }
    }

    fn suspend_set() -> SuspendSet {
        let mut set = SuspendSet::new();
        set.insert(MethodRef::new("rt.T", "block", "()I"));
        set
    }

    #[test]
    fn test_call_first_in_block_reuses_block() {
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(blocking_call(1));
        b0.add_instr(constant(2, 1));
        b0.set_terminator(Terminator::ret(Some(Var(2))));

        let fragments = fragment(&[b0], &suspend_set());
        assert_eq!(fragments.blocks.len(), 2);
        assert_eq!(fragments.blocks[0].instructions.len(), 1);
        assert_eq!(fragments.blocks[0].terminator, Terminator::jump(BasicBlockId(1)));
        assert_eq!(fragments.blocks[1].instructions.len(), 1);
        assert!(matches!(fragments.blocks[1].terminator, Terminator::Return { .. }));
        assert!(fragments.starts.contains(&BasicBlockId(1)));

        let parts = discover_parts(&fragments, BasicBlockId(0));
        assert_eq!(parts, vec![BasicBlockId(0), BasicBlockId(1)]);
    }

    #[test]
    fn test_call_in_middle_makes_three_fragments() {
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(constant(1, 1));
        b0.add_instr(blocking_call(2));
        b0.add_instr(constant(3, 1));
        b0.set_terminator(Terminator::ret(None));

        let fragments = fragment(&[b0], &suspend_set());
        assert_eq!(fragments.blocks.len(), 3);
        assert_eq!(fragments.blocks[0].terminator, Terminator::jump(BasicBlockId(1)));
        assert_eq!(fragments.blocks[1].terminator, Terminator::jump(BasicBlockId(2)));
        assert!(matches!(
            fragments.blocks[1].instructions[0].kind,
            InstructionKind::Invoke(_)
        ));
        assert_eq!(
            discover_parts(&fragments, BasicBlockId(0)),
            vec![BasicBlockId(0), BasicBlockId(1), BasicBlockId(2)]
        );
    }

    #[test]
    fn test_monitor_enter_opens_part_without_closing_it() {
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(constant(1, 1));
        b0.add_instr(InstructionKind::MonitorEnter { object: Var(0) });
        b0.add_instr(constant(2, 2));
        b0.set_terminator(Terminator::ret(None));

        let fragments = fragment(&[b0], &SuspendSet::new());
        assert_eq!(fragments.blocks.len(), 2);
        assert_eq!(fragments.blocks[1].instructions.len(), 2);
        assert!(fragments.starts.contains(&BasicBlockId(1)));
    }

    #[test]
    fn test_parts_numbered_breadth_first() {
        // 0: if v1 goto 1 else 2; 1: call -> 3; 2: call -> 3; 3: return
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.set_terminator(Terminator::Branch {
            condition: crate::ir::BranchCondition::NotEqual,
            operand: Var(1),
            consequent: BasicBlockId(1),
            alternative: BasicBlockId(2),
        });
        let mut b1 = BasicBlock::new(BasicBlockId(1));
        b1.add_instr(blocking_call(2));
        b1.set_terminator(Terminator::jump(BasicBlockId(3)));
        let mut b2 = BasicBlock::new(BasicBlockId(2));
        b2.add_instr(blocking_call(2));
        b2.set_terminator(Terminator::jump(BasicBlockId(3)));
        let b3 = BasicBlock::new(BasicBlockId(3));

        let fragments = fragment(&[b0, b1, b2, b3], &suspend_set());
        // post fragments 4 (after b1) and 5 (after b2)
        let parts = discover_parts(&fragments, BasicBlockId(0));
        assert_eq!(
            parts,
            vec![
                BasicBlockId(0),
                BasicBlockId(1),
                BasicBlockId(2),
                BasicBlockId(4),
                BasicBlockId(5)
            ]
        );
    }
}
