use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use crate::UserId;

#[derive(Debug, Clone)]
struct Edge {
    to: UserId,
    amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnPath,
    Done,
}

/// Location of an edge: the vertex it leaves and its index in that
/// vertex's adjacency list.
type EdgeRef = (UserId, usize);

/// Directed debt multigraph. An edge `u -> v` of amount `w` means `u` owes
/// `v` the amount `w`.
#[derive(Debug, Clone, Default)]
pub struct DebtGraph {
    adj: BTreeMap<UserId, Vec<Edge>>,
}

impl DebtGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_debt(&mut self, payer: UserId, payee: UserId, amount: Decimal) {
        if payer == payee || amount <= Decimal::ZERO {
            return;
        }
        self.adj.entry(payer).or_default().push(Edge { to: payee, amount });
        self.adj.entry(payee).or_default();
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(Vec::len).sum()
    }

    /// Cancels cycles until a full search finds none.
    ///
    /// Each cancellation removes the closing edge, so the edge count strictly
    /// decreases and the loop terminates.
    pub fn eliminate_cycles(&mut self) {
        while let Some(cycle) = self.find_cycle() {
            self.cancel(&cycle);
        }
    }

    /// Sums parallel edges per `(payer, payee)` and drops zero totals.
    pub fn merged(&self) -> BTreeMap<(UserId, UserId), Decimal> {
        let mut totals: BTreeMap<(UserId, UserId), Decimal> = BTreeMap::new();
        for (from, edges) in &self.adj {
            for edge in edges {
                *totals.entry((*from, edge.to)).or_insert(Decimal::ZERO) += edge.amount;
            }
        }
        totals.retain(|_, amount| *amount > Decimal::ZERO);
        totals
    }

    /// Returns the edges of one directed cycle. The last entry is the
    /// closing edge, the one that reached a vertex already on the path.
    fn find_cycle(&self) -> Option<Vec<EdgeRef>> {
        let mut marks: HashMap<UserId, Mark> =
            self.adj.keys().map(|v| (*v, Mark::Unseen)).collect();
        let mut path: Vec<EdgeRef> = Vec::new();

        for start in self.adj.keys() {
            if marks.get(start) == Some(&Mark::Unseen) {
                if let Some(cycle) = self.visit(*start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: UserId,
        marks: &mut HashMap<UserId, Mark>,
        path: &mut Vec<EdgeRef>,
    ) -> Option<Vec<EdgeRef>> {
        marks.insert(node, Mark::OnPath);

        if let Some(edges) = self.adj.get(&node) {
            for (idx, edge) in edges.iter().enumerate() {
                match marks.get(&edge.to).copied().unwrap_or(Mark::Unseen) {
                    Mark::OnPath => {
                        let entry = path
                            .iter()
                            .position(|(from, _)| *from == edge.to)
                            .unwrap_or(path.len());
                        let mut cycle = path[entry..].to_vec();
                        cycle.push((node, idx));
                        return Some(cycle);
                    }
                    Mark::Unseen => {
                        path.push((node, idx));
                        if let Some(cycle) = self.visit(edge.to, marks, path) {
                            return Some(cycle);
                        }
                        path.pop();
                    }
                    Mark::Done => {}
                }
            }
        }

        marks.insert(node, Mark::Done);
        None
    }

    /// Rotates the closing edge's amount `a` around the cycle.
    ///
    /// The closing edge is removed. Every other edge of weight `w` keeps
    /// `w - a` when positive, is removed when zero, and is replaced by a
    /// reverse edge of `a - w` when negative.
    fn cancel(&mut self, cycle: &[EdgeRef]) {
        let Some((&closing, rest)) = cycle.split_last() else {
            return;
        };
        let Some(a) = self.amount_at(closing) else {
            return;
        };

        let mut removals: Vec<EdgeRef> = vec![closing];
        let mut reversed: Vec<(UserId, UserId, Decimal)> = Vec::new();

        for &(from, idx) in rest {
            let Some(edge) = self.adj.get_mut(&from).and_then(|edges| edges.get_mut(idx)) else {
                continue;
            };
            let left = edge.amount - a;
            if left > Decimal::ZERO {
                edge.amount = left;
            } else {
                if left < Decimal::ZERO {
                    reversed.push((edge.to, from, -left));
                }
                removals.push((from, idx));
            }
        }

        // A simple cycle leaves each vertex at most once, so no two removals
        // share an adjacency list and indices stay valid.
        for (from, idx) in removals {
            if let Some(edges) = self.adj.get_mut(&from) {
                if idx < edges.len() {
                    edges.remove(idx);
                }
            }
        }
        for (payer, payee, amount) in reversed {
            self.add_debt(payer, payee, amount);
        }
    }

    fn amount_at(&self, (from, idx): EdgeRef) -> Option<Decimal> {
        self.adj.get(&from)?.get(idx).map(|e| e.amount)
    }
}
