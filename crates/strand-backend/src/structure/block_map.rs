//! Block map: the structural index of a control-flow graph
//!
//! A block map fixes a program order for the reachable nodes of a graph and
//! overlays it with properly nested ranges. A `Loop` range starts at its head;
//! jumping to the head from inside continues the loop. A `Block` range exists
//! so that nodes inside it can break to the node at its end position.

use crate::ir::BasicBlockId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Region handle, index into [`BlockMap::regions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

impl RegionId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Block,
    Loop,
}

/// Half-open range of program positions `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
    pub parent: Option<RegionId>,
}

impl Region {
    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position < self.end
    }
}

/// Role a node plays for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// First node of a loop; jumping here from inside is a continue
    Head(RegionId),
    /// Node at the end position of a region; jumping here from inside is a break
    Exit(RegionId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRegion {
    kind: RegionKind,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBlockMap {
    order: Vec<BasicBlockId>,
    #[serde(default)]
    regions: Vec<RawRegion>,
}

/// Read-only structural index consumed by the translator
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawBlockMap")]
pub struct BlockMap {
    order: Vec<BasicBlockId>,
    positions: FxHashMap<BasicBlockId, usize>,
    regions: Vec<Region>,
    innermost: Vec<Option<RegionId>>,
    starting: Vec<Vec<RegionId>>,
}

impl BlockMap {
    /// Build and validate a block map.
    ///
    /// Ranges may be given in any order; they are sorted so that outer
    /// regions precede inner ones. Identical spans nest a block outside a loop.
    pub fn new(
        order: Vec<BasicBlockId>,
        ranges: impl IntoIterator<Item = (RegionKind, usize, usize)>,
    ) -> Result<Self, String> {
        let mut positions = FxHashMap::default();
        for (pos, node) in order.iter().enumerate() {
            if positions.insert(*node, pos).is_some() {
                return Err(format!("{} appears twice in the order", node));
            }
        }

        let mut ranges: Vec<(RegionKind, usize, usize)> = ranges.into_iter().collect();
        for &(kind, start, end) in &ranges {
            if start >= end || end > order.len() {
                return Err(format!("{:?} range [{}, {}) is out of bounds", kind, start, end));
            }
        }
        ranges.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then(b.2.cmp(&a.2))
                .then(kind_rank(a.0).cmp(&kind_rank(b.0)))
        });
        ranges.dedup();

        let mut regions: Vec<Region> = Vec::with_capacity(ranges.len());
        let mut stack: Vec<RegionId> = Vec::new();
        for (kind, start, end) in ranges {
            while let Some(top) = stack.last() {
                if regions[top.index()].end <= start {
                    stack.pop();
                } else {
                    break;
                }
            }
            let parent = stack.last().copied();
            if let Some(parent) = parent {
                let outer = &regions[parent.index()];
                if end > outer.end {
                    return Err(format!(
                        "range [{}, {}) crosses [{}, {})",
                        start, end, outer.start, outer.end
                    ));
                }
            }
            let id = RegionId(regions.len() as u32);
            regions.push(Region {
                kind,
                start,
                end,
                parent,
            });
            stack.push(id);
        }

        let mut innermost = vec![None; order.len()];
        let mut starting = vec![Vec::new(); order.len()];
        for (index, region) in regions.iter().enumerate() {
            let id = RegionId(index as u32);
            starting[region.start].push(id);
            for slot in &mut innermost[region.start..region.end] {
                *slot = Some(id);
            }
        }

        Ok(Self {
            order,
            positions,
            regions,
            innermost,
            starting,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[BasicBlockId] {
        &self.order
    }

    pub fn node_at(&self, position: usize) -> Option<BasicBlockId> {
        self.order.get(position).copied()
    }

    pub fn position(&self, node: BasicBlockId) -> Option<usize> {
        self.positions.get(&node).copied()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    /// Regions opening at `position`, outermost first
    pub fn regions_starting_at(&self, position: usize) -> &[RegionId] {
        self.starting
            .get(position)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Regions containing `position`, innermost first
    pub fn enclosing(&self, position: usize) -> impl Iterator<Item = RegionId> + '_ {
        let mut current = self.innermost.get(position).copied().flatten();
        std::iter::from_fn(move || {
            let id = current?;
            current = self.regions[id.index()].parent;
            Some(id)
        })
    }

    /// Head node of a region
    pub fn head(&self, id: RegionId) -> BasicBlockId {
        self.order[self.region(id).start]
    }

    /// Node reached by leaving `id` through its end: the loop head of an
    /// enclosing loop ending at the same position, otherwise the node at the
    /// end position (`None` past the last node).
    pub fn exit_target(&self, id: RegionId) -> Option<BasicBlockId> {
        let region = self.region(id);
        self.flow_past(region.end, region.parent)
    }

    /// Node control reaches when the node at `position` simply ends
    pub fn natural_successor(&self, position: usize) -> Option<BasicBlockId> {
        let innermost = self.innermost.get(position).copied().flatten();
        self.flow_past(position + 1, innermost)
    }

    fn flow_past(&self, position: usize, mut region: Option<RegionId>) -> Option<BasicBlockId> {
        while let Some(id) = region {
            let r = self.region(id);
            if r.end != position {
                break;
            }
            if r.kind == RegionKind::Loop {
                return Some(self.order[r.start]);
            }
            region = r.parent;
        }
        self.node_at(position)
    }

    /// Every role `node` plays, outermost region first
    pub fn roles(&self, node: BasicBlockId) -> Vec<NodeRole> {
        let Some(position) = self.position(node) else {
            return Vec::new();
        };
        let mut roles = Vec::new();
        for (index, region) in self.regions.iter().enumerate() {
            let id = RegionId(index as u32);
            if region.kind == RegionKind::Loop && region.start == position {
                roles.push(NodeRole::Head(id));
            }
            if self.exit_target(id) == Some(node) {
                roles.push(NodeRole::Exit(id));
            }
        }
        roles
    }
}

impl TryFrom<RawBlockMap> for BlockMap {
    type Error = String;

    fn try_from(raw: RawBlockMap) -> Result<Self, Self::Error> {
        BlockMap::new(
            raw.order,
            raw.regions.into_iter().map(|r| (r.kind, r.start, r.end)),
        )
    }
}

fn kind_rank(kind: RegionKind) -> u8 {
    match kind {
        RegionKind::Block => 0,
        RegionKind::Loop => 1,
    }
}
