use crate::program::cfg::NodeId;
use crate::program::FunctionContext;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
struct FifoWorkList {
    queue: VecDeque<FunctionContext>,
    members: HashSet<FunctionContext>,
}

impl FifoWorkList {
    fn enqueue(&mut self, fc: FunctionContext) {
        if self.members.insert(fc) {
            self.queue.push_back(fc);
        }
    }

    fn front(&self) -> Option<FunctionContext> {
        self.queue.front().copied()
    }

    fn dequeue(&mut self) -> Option<FunctionContext> {
        let fc = self.queue.pop_front()?;
        self.members.remove(&fc);
        Some(fc)
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct PrioritizedNode {
    priority: u32,
    node: NodeId,
}

impl Ord for PrioritizedNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap on post-order number = reverse-postorder dequeuing.
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for PrioritizedNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct LocalWorkList {
    heap: BinaryHeap<PrioritizedNode>,
    members: HashSet<NodeId>,
}

impl LocalWorkList {
    fn enqueue(&mut self, node: NodeId, priority: u32) {
        if self.members.insert(node) {
            self.heap.push(PrioritizedNode { priority, node });
        }
    }

    fn dequeue(&mut self) -> Option<NodeId> {
        let item = self.heap.pop()?;
        self.members.remove(&item.node);
        Some(item.node)
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// The engine's two-level worklist: an outer FIFO of (context, function)
/// pairs and, per pair, a priority queue over that function's nodes. A pair
/// is retired only when its local queue drains, so a function's nodes are
/// processed together before moving on. Duplicate enqueues of unread items
/// are collapsed at both levels.
#[derive(Debug, Default)]
pub(crate) struct TwoLevelWorkList {
    global: FifoWorkList,
    locals: HashMap<FunctionContext, LocalWorkList>,
}

impl TwoLevelWorkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, fc: FunctionContext, node: NodeId, priority: u32) {
        self.global.enqueue(fc);
        self.locals.entry(fc).or_default().enqueue(node, priority);
    }

    pub fn dequeue(&mut self) -> Option<(FunctionContext, NodeId)> {
        while let Some(fc) = self.global.front() {
            let local = self.locals.entry(fc).or_default();
            match local.dequeue() {
                Some(node) => {
                    if local.is_empty() {
                        self.global.dequeue();
                        self.locals.remove(&fc);
                    }
                    return Some((fc, node));
                }
                None => {
                    self.global.dequeue();
                    self.locals.remove(&fc);
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }
}
