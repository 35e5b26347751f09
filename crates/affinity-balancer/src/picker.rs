//! Smooth weighted round-robin selection.
//!
//! Each selection adds every node's weight to its running score, picks the
//! highest score, then charges the winner the total weight. Over a fixed
//! roster node `i` is chosen `w_i / Σw` of the time, and picks of a heavy
//! node are interleaved with the others instead of arriving in bursts.
//!
//! Scores are process-local and keyed by address. They shape distribution
//! only; routing correctness never depends on them. An address that takes
//! part in no selection for [`IDLE_SELECTIONS`] selections is forgotten, so
//! backend churn does not grow the score map.

use std::collections::HashMap;
use std::sync::Mutex;

use affinity_core::Node;

/// Selections an address may sit out before its score is dropped.
pub const IDLE_SELECTIONS: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Score {
    current: f64,
    last_seen: u64,
}

#[derive(Debug, Default)]
struct Scores {
    by_address: HashMap<String, Score>,
    tick: u64,
}

impl Scores {
    fn sweep(&mut self) {
        let tick = self.tick;
        self.by_address
            .retain(|_, score| tick - score.last_seen < IDLE_SELECTIONS);
    }
}

/// Stateful weighted chooser shared by every pick of one balancer.
#[derive(Debug, Default)]
pub struct WeightedPicker {
    scores: Mutex<Scores>,
}

impl WeightedPicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose one node. Returns `None` if `nodes` is empty.
    ///
    /// Ties go to the earliest node in `nodes`.
    pub fn select<'a, T>(&self, nodes: &[&'a Node<T>]) -> Option<&'a Node<T>> {
        if nodes.is_empty() {
            return None;
        }
        let mut scores = self.scores.lock().expect("weights lock");
        scores.tick += 1;
        let tick = scores.tick;

        let mut total = 0.0;
        let mut selected: Option<(&'a Node<T>, f64)> = None;
        for &node in nodes {
            total += node.weight();
            let score = scores
                .by_address
                .entry(node.address().to_string())
                .or_insert(Score {
                    current: 0.0,
                    last_seen: tick,
                });
            score.current += node.weight();
            score.last_seen = tick;

            if selected.is_none_or(|(_, best)| score.current > best) {
                selected = Some((node, score.current));
            }
        }

        let (node, _) = selected?;
        if let Some(winner) = scores.by_address.get_mut(node.address()) {
            winner.current -= total;
        }
        if tick % IDLE_SELECTIONS == 0 {
            scores.sweep();
        }
        Some(node)
    }

    /// Current score of an address (0 for addresses never seen or forgotten).
    pub fn current_weight(&self, address: &str) -> f64 {
        self.scores
            .lock()
            .expect("weights lock")
            .by_address
            .get(address)
            .map_or(0.0, |score| score.current)
    }

    /// Number of addresses holding a score.
    pub fn tracked(&self) -> usize {
        self.scores.lock().expect("weights lock").by_address.len()
    }

    /// Forget every score.
    pub fn reset(&self) {
        self.scores.lock().expect("weights lock").by_address.clear();
    }
}
