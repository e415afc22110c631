//! BPE Encoder - applies learned merge rules to token sequences.
//!
//! Merges are applied in the order they were learned during training: at each
//! step the live adjacent pair with the lowest merge order is merged, leftmost
//! first among equals. A min-heap of candidates with lazy validation keeps
//! this at O(N log N) per sequence.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use crate::types::{MergeOrder, Token, TokenPair};

/// Item in the priority queue for merge ordering.
///
/// Candidates are ordered by merge_order (earliest first) with position
/// as a tiebreaker.
#[derive(Debug, PartialEq, Eq)]
struct MergeCandidate {
    /// Merge order from training. Lower values are applied first.
    merge_order: MergeOrder,

    /// The token pair to be merged.
    pair: TokenPair,

    /// Position in the token sequence where this pair starts.
    position: usize,
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed (other vs self) for min-heap behavior on BinaryHeap.
        other
            .merge_order
            .cmp(&self.merge_order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Applies an ordered list of merge rules to token sequences.
#[derive(Debug, Clone, Default)]
pub(crate) struct BPEEncoder {
    /// Maps token pairs to (merged_token, merge_order).
    merges: HashMap<TokenPair, (Token, MergeOrder)>,
}

impl BPEEncoder {
    /// Appends a rule with the next merge order.
    pub(crate) fn push_merge(&mut self, left: Token, right: Token, merged: Token) {
        let order = self.merges.len();
        self.merges.insert(TokenPair(left, right), (merged, order));
    }

    /// Encodes a token sequence by applying every applicable merge.
    ///
    /// The output has the same or fewer tokens than the input.
    pub(crate) fn encode(&self, tokens: Vec<Token>) -> Vec<Token> {
        if tokens.len() <= 1 || self.merges.is_empty() {
            return tokens;
        }

        let mut heap = BinaryHeap::new();

        // slots consumed by an earlier merge become None
        let mut slots: Vec<Option<Token>> = tokens.iter().map(|&t| Some(t)).collect();

        self.initialize_minheap(&tokens, &mut heap);

        while let Some(candidate) = heap.pop() {
            let pos = candidate.position;

            let Some(left) = slots.get(pos).copied().flatten() else {
                continue;
            };

            // the slot right after a merged token is empty; skip to the next live one
            let mut right_idx = pos + 1;
            while right_idx < slots.len() && matches!(slots.get(right_idx), Some(None)) {
                right_idx += 1;
            }
            let Some(right) = slots.get(right_idx).copied().flatten() else {
                continue;
            };

            // stale candidate
            if candidate.pair != TokenPair(left, right) {
                continue;
            }

            let Some(&(merged, _)) = self.merges.get(&candidate.pair) else {
                continue;
            };

            slots[pos] = Some(merged);
            slots[right_idx] = None;

            self.track_new_candidate(&mut heap, &slots, pos, merged, true);
            self.track_new_candidate(&mut heap, &slots, pos, merged, false);
        }

        slots.into_iter().flatten().collect()
    }

    /// Pushes the pair formed by a freshly merged token and its left or right
    /// live neighbour, if a rule exists for it.
    fn track_new_candidate(
        &self,
        heap: &mut BinaryHeap<MergeCandidate>,
        slots: &[Option<Token>],
        pos: usize,
        merged: Token,
        check_left: bool,
    ) {
        let n = slots.len();
        let mut idx;

        if check_left {
            if pos == 0 {
                return;
            }
            idx = pos - 1;
            while idx > 0 && matches!(slots.get(idx), Some(None)) {
                idx -= 1;
            }
        } else {
            if pos + 1 >= n {
                return;
            }
            idx = pos + 1;
            while idx < n && matches!(slots.get(idx), Some(None)) {
                idx += 1;
            }
        }

        let Some(&Some(tok)) = slots.get(idx) else {
            return;
        };

        let pair = if check_left {
            TokenPair(tok, merged)
        } else {
            TokenPair(merged, tok)
        };

        if let Some(&(_, merge_order)) = self.merges.get(&pair) {
            let position = if check_left { idx } else { pos };
            heap.push(MergeCandidate {
                merge_order,
                pair,
                position,
            });
        }
    }

    /// Seeds the heap with every adjacent pair that has a rule.
    fn initialize_minheap(&self, tokens: &[Token], heap: &mut BinaryHeap<MergeCandidate>) {
        for (i, window) in tokens.windows(2).enumerate() {
            let pair = TokenPair(window[0], window[1]);
            if let Some(&(_, merge_order)) = self.merges.get(&pair) {
                heap.push(MergeCandidate {
                    merge_order,
                    pair,
                    position: i,
                });
            }
        }
    }
}
