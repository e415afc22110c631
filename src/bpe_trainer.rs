//! Core BPE merge-learning algorithm.
//!
//! Incremental implementation after Algorithm 2 of "Byte Pair Encoding is
//! Suboptimal for Language Model Pretraining"
//! https://aclanthology.org/2023.findings-acl.38.pdf
//!
//! Every distinct corpus line (a *word*) is laid out as a run of nodes in one
//! arena-backed doubly-linked list; links never cross word boundaries. A word
//! seen `k` times is stored once with weight `k`, and every pair it contains
//! contributes `k` to that pair's frequency.
//!
//! Memory is proportional to the total length of the distinct words plus the
//! pair-position index. This is the scaling limit of training: the whole
//! deduplicated corpus stays resident until training finishes.
//!
//! Time complexity: O(N log V) vs O(NV) for a full rescan per merge.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    ops::ControlFlow,
};

use crate::types::{TextIdx, Token, TokenFreq, TokenPair};

/// Node in doubly-linked list representing a token in the training arena.
#[derive(Debug)]
struct Node {
    /// The token identifier at this position.
    token: Token,

    /// Occurrence count of the word this node belongs to.
    weight: TokenFreq,

    /// Index of the previous node in the same word, if any.
    prev_idx: Option<TextIdx>,

    /// Index of the next node in the same word, if any.
    next_idx: Option<TextIdx>,
}

/// Item in the max heap for tracking most frequent token pairs.
///
/// The heap may contain stale entries after merges, so frequencies
/// must be validated against `pair_freqs` before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    freq: TokenFreq,
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest frequency on top; among equal frequencies the smallest
/// `(left, right)` pair wins.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq
            .cmp(&other.freq)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// Result of a single merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeStep {
    /// `pair` occurred `freq` times and was merged into `merged`.
    Merged {
        left: Token,
        right: Token,
        merged: Token,
        freq: TokenFreq,
    },
    /// The best remaining pair occurs only `freq` times.
    BelowMinFrequency { freq: TokenFreq },
    /// No adjacent pair remains anywhere in the corpus.
    Exhausted,
}

/// BPE training structure.
///
/// Nodes are stored in a `Vec<Option<Node>>` arena, where:
/// - the `Vec` provides stable indices for nodes
/// - deletions are O(1) by setting entries to `None`
/// - traversal is done via index-based prev/next links inside `Node`
#[derive(Debug, Default)]
pub(crate) struct BPETrainer {
    /// Storage arena for nodes. `None` marks a node consumed by a merge.
    nodes: Vec<Option<Node>>,

    /// Arena index of the first node of every word.
    heads: Vec<TextIdx>,

    /// Max heap of (frequency, pair). Contains stale entries.
    heap: BinaryHeap<HeapItem>,

    /// Arena index of the first node of every occurrence of a pair.
    pair_positions: HashMap<TokenPair, HashSet<TextIdx>>,

    /// Current weighted frequency of each pair. Pairs at zero are removed.
    pair_freqs: HashMap<TokenPair, TokenFreq>,

    /// Next available merge token ID.
    next_tok: Token,
}

impl BPETrainer {
    /// Creates a trainer over weighted words.
    ///
    /// # Arguments
    /// * `words` - Distinct token sequences with their occurrence counts.
    /// * `next_tok` - ID given to the first learned merge.
    pub(crate) fn new<'a>(
        words: impl IntoIterator<Item = (&'a [Token], TokenFreq)>,
        next_tok: Token,
    ) -> Self {
        let mut trainer = Self {
            next_tok,
            ..Self::default()
        };

        for (tokens, weight) in words {
            if tokens.is_empty() || weight == 0 {
                continue;
            }
            let start = trainer.nodes.len();
            let end = start + tokens.len();
            trainer.heads.push(start);
            for (i, &token) in tokens.iter().enumerate() {
                let idx = start + i;
                trainer.nodes.push(Some(Node {
                    token,
                    weight,
                    prev_idx: (idx > start).then(|| idx - 1),
                    next_idx: (idx + 1 < end).then(|| idx + 1),
                }));
            }
        }

        trainer.build_initial_pairs();
        trainer
    }

    /// Performs one merge of the most frequent pair, provided it occurs at
    /// least `min_freq` times.
    ///
    /// # Time Complexity
    /// Proportional to the number of occurrences of the merged pair, times
    /// `log` of the heap size.
    pub(crate) fn merge_step(&mut self, min_freq: TokenFreq) -> MergeStep {
        let Some((merge_pair, merge_freq)) = self.peek_max_pair() else {
            return MergeStep::Exhausted;
        };
        if merge_freq < min_freq {
            return MergeStep::BelowMinFrequency { freq: merge_freq };
        }

        // ascending order makes overlapping runs (a a a) merge left to right
        let mut positions: Vec<TextIdx> = self
            .pair_positions
            .get(&merge_pair)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();

        let new_tok_id = self.next_tok;
        self.next_tok += 1;

        for &pos in &positions {
            let (idx1, idx2) = match self.get_merge_idxs(merge_pair, pos) {
                ControlFlow::Continue(idxs) => idxs,
                ControlFlow::Break(()) => continue,
            };

            let (cur_prev_idx, weight) = match &self.nodes[idx1] {
                Some(node) => (node.prev_idx, node.weight),
                None => continue,
            };
            let new_next_idx = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);

            self.remove_neighbours(merge_pair, idx1, idx2, weight);
            self.merge_pair_in_list(new_next_idx, new_tok_id, idx1, idx2);
            self.add_neighbours(new_tok_id, idx1, cur_prev_idx, new_next_idx, weight);
        }

        self.pair_freqs.remove(&merge_pair);
        self.pair_positions.remove(&merge_pair);

        MergeStep::Merged {
            left: merge_pair.0,
            right: merge_pair.1,
            merged: new_tok_id,
            freq: merge_freq,
        }
    }

    /// Tokens left in the corpus, counting every occurrence of each word.
    pub(crate) fn corpus_tokens(&self) -> TokenFreq {
        self.nodes.iter().flatten().map(|node| node.weight).sum()
    }

    /// Current token sequence of every word, in insertion order.
    #[cfg(test)]
    pub(crate) fn get_encodings(&self) -> Vec<Vec<Token>> {
        self.heads
            .iter()
            .map(|&head| {
                let mut tokens = Vec::new();
                let mut current = Some(head);
                while let Some(idx) = current {
                    match &self.nodes[idx] {
                        Some(node) => {
                            tokens.push(node.token);
                            current = node.next_idx;
                        }
                        None => break,
                    }
                }
                tokens
            })
            .collect()
    }

    /// The `n` most frequent live pairs, most frequent first.
    pub(crate) fn top_pairs(&self, n: usize) -> Vec<((Token, Token), TokenFreq)> {
        let mut pairs: Vec<_> = self
            .pair_freqs
            .iter()
            .map(|(pair, &freq)| ((pair.0, pair.1), freq))
            .collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(n);
        pairs
    }

    /// Scans every word once, recording all adjacent pairs, then populates
    /// the max heap.
    fn build_initial_pairs(&mut self) {
        for idx in 0..self.nodes.len() {
            let Some(node) = &self.nodes[idx] else {
                continue;
            };
            let Some(next_idx) = node.next_idx else {
                continue;
            };
            let Some(next_node) = &self.nodes[next_idx] else {
                continue;
            };
            let pair = TokenPair(node.token, next_node.token);
            *self.pair_freqs.entry(pair).or_insert(0) += node.weight;
            self.pair_positions.entry(pair).or_default().insert(idx);
        }

        for (&pair, &freq) in &self.pair_freqs {
            self.heap.push(HeapItem { freq, pair });
        }
    }

    /// Returns the most frequent valid pair, discarding stale heap entries
    /// on the way. The returned entry stays on the heap.
    fn peek_max_pair(&mut self) -> Option<(TokenPair, TokenFreq)> {
        while let Some(entry) = self.heap.peek() {
            match self.pair_freqs.get(&entry.pair) {
                Some(&true_freq) if true_freq == entry.freq => {
                    return Some((entry.pair, entry.freq));
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }

    /// Removes one occurrence of `pair` starting at `idx` from the
    /// bookkeeping. The linked list itself is not modified.
    fn remove_pair_at(&mut self, idx: TextIdx, pair: TokenPair, weight: TokenFreq) {
        if let Some(pos_set) = self.pair_positions.get_mut(&pair) {
            pos_set.remove(&idx);
        }

        let Some(freq) = self.pair_freqs.get_mut(&pair) else {
            return;
        };
        *freq = freq.saturating_sub(weight);
        let freq = *freq;

        if freq == 0 {
            self.pair_freqs.remove(&pair);
            self.pair_positions.remove(&pair);
        } else {
            // the older, higher entry is now stale
            self.heap.push(HeapItem { freq, pair });
        }
    }

    /// Records one new occurrence of `pair` starting at `idx`.
    fn add_pair_at(&mut self, idx: TextIdx, pair: TokenPair, weight: TokenFreq) {
        self.pair_positions.entry(pair).or_default().insert(idx);
        let freq = self.pair_freqs.entry(pair).or_insert(0);
        *freq += weight;
        self.heap.push(HeapItem { freq: *freq, pair });
    }

    /// Records the pairs the merged token forms with its neighbours.
    fn add_neighbours(
        &mut self,
        new_tok_id: Token,
        idx1: TextIdx,
        cur_prev_idx: Option<TextIdx>,
        new_next_idx: Option<TextIdx>,
        weight: TokenFreq,
    ) {
        if let Some(prev_idx) = cur_prev_idx {
            if let Some(prev_node) = &self.nodes[prev_idx] {
                let new_pair = TokenPair(prev_node.token, new_tok_id);
                self.add_pair_at(prev_idx, new_pair, weight);
            }
        }

        if let Some(next_idx) = new_next_idx {
            if let Some(next_node) = &self.nodes[next_idx] {
                let new_pair = TokenPair(new_tok_id, next_node.token);
                self.add_pair_at(idx1, new_pair, weight);
            }
        }
    }

    /// Rewrites `idx1` to hold the merged token, unlinks `idx2` and marks it
    /// deleted.
    fn merge_pair_in_list(
        &mut self,
        next_idx: Option<TextIdx>,
        tok_id: Token,
        idx1: TextIdx,
        idx2: TextIdx,
    ) {
        if let Some(node) = &mut self.nodes[idx1] {
            node.token = tok_id;
            node.next_idx = next_idx;
        }

        if let Some(new_right_idx) = next_idx {
            if let Some(new_right_node) = &mut self.nodes[new_right_idx] {
                new_right_node.prev_idx = Some(idx1);
            }
        }

        self.nodes[idx2] = None;
    }

    /// Drops the pairs the two merged tokens formed with their outer
    /// neighbours.
    fn remove_neighbours(
        &mut self,
        merge_pair: TokenPair,
        idx1: TextIdx,
        idx2: TextIdx,
        weight: TokenFreq,
    ) {
        let prev = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx);
        if let Some(prev_idx) = prev {
            if let Some(prev_node) = &self.nodes[prev_idx] {
                let old_pair = TokenPair(prev_node.token, merge_pair.0);
                self.remove_pair_at(prev_idx, old_pair, weight);
            }
        }

        let next = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);
        if let Some(next_idx) = next {
            if let Some(next_node) = &self.nodes[next_idx] {
                let old_pair = TokenPair(merge_pair.1, next_node.token);
                self.remove_pair_at(idx2, old_pair, weight);
            }
        }
    }

    /// Checks that `pair` still starts at `pos` and returns both node indices.
    fn get_merge_idxs(&self, pair: TokenPair, pos: TextIdx) -> ControlFlow<(), (TextIdx, TextIdx)> {
        let idx1 = pos;
        let idx2 = match &self.nodes[idx1] {
            Some(node1) => match node1.next_idx {
                Some(idx2) => idx2,
                None => return ControlFlow::Break(()),
            },
            // consumed by an earlier merge in this step
            None => return ControlFlow::Break(()),
        };

        let is_target = match (&self.nodes[idx1], &self.nodes[idx2]) {
            (Some(node1), Some(node2)) => node1.token == pair.0 && node2.token == pair.1,
            _ => false,
        };

        if !is_target {
            return ControlFlow::Break(());
        }

        ControlFlow::Continue((idx1, idx2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer(words: &[(Vec<Token>, TokenFreq)], next_tok: Token) -> BPETrainer {
        BPETrainer::new(words.iter().map(|(w, c)| (w.as_slice(), *c)), next_tok)
    }

    #[test]
    fn test_basic_merge() {
        let mut t = trainer(&[(vec![0, 1, 0, 0, 1, 1, 0, 0], 1)], 2);
        for _ in 0..3 {
            if !matches!(t.merge_step(1), MergeStep::Merged { .. }) {
                break;
            }
        }
        assert!(t.get_encodings()[0].len() < 8);
    }

    #[test]
    fn test_empty_input() {
        let t = trainer(&[], 0);
        assert!(t.get_encodings().is_empty());
        let mut t = trainer(&[(vec![], 3)], 0);
        assert_eq!(t.merge_step(1), MergeStep::Exhausted);
    }

    #[test]
    fn test_single_token_words_have_no_pairs() {
        let mut t = trainer(&[(vec![0], 5), (vec![1], 5)], 2);
        assert_eq!(t.merge_step(1), MergeStep::Exhausted);
        assert_eq!(t.get_encodings(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_pairs_do_not_cross_words() {
        // (1, 0) would only exist across the word boundary
        let mut t = trainer(&[(vec![0, 1], 1), (vec![0, 1], 1)], 2);
        assert_eq!(t.top_pairs(5), vec![((0, 1), 2)]);
        assert!(matches!(t.merge_step(1), MergeStep::Merged { merged: 2, .. }));
        assert_eq!(t.merge_step(1), MergeStep::Exhausted);
    }

    #[test]
    fn test_weights_count_as_frequency() {
        let mut t = trainer(&[(vec![0, 1], 3), (vec![2, 3, 2, 3], 1)], 4);
        // (0,1) = 3 beats (2,3) = 2
        assert_eq!(
            t.merge_step(2),
            MergeStep::Merged { left: 0, right: 1, merged: 4, freq: 3 }
        );
        assert_eq!(
            t.merge_step(2),
            MergeStep::Merged { left: 2, right: 3, merged: 5, freq: 2 }
        );
        assert_eq!(t.get_encodings(), vec![vec![4], vec![5, 5]]);
        // 3 x [4] + 1 x [5, 5]
        assert_eq!(t.corpus_tokens(), 5);
    }

    #[test]
    fn test_tie_break_prefers_smallest_pair() {
        let mut t = trainer(&[(vec![5, 6], 1), (vec![1, 2], 1)], 10);
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 1, right: 2, .. }
        ));
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 5, right: 6, .. }
        ));
    }

    #[test]
    fn test_min_frequency_stops() {
        let mut t = trainer(&[(vec![0, 1, 2], 1)], 3);
        assert_eq!(t.merge_step(2), MergeStep::BelowMinFrequency { freq: 1 });
        // nothing was consumed
        assert!(matches!(t.merge_step(1), MergeStep::Merged { .. }));
    }

    #[test]
    fn test_overlapping_run_merges_left_to_right() {
        let mut t = trainer(&[(vec![0, 0, 0], 1)], 1);
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 0, right: 0, merged: 1, freq: 2 }
        ));
        assert_eq!(t.get_encodings(), vec![vec![1, 0]]);
        // the only remaining pair is (1, 0) with frequency 1
        assert_eq!(t.top_pairs(5), vec![((1, 0), 1)]);
    }

    #[test]
    fn test_decremented_pair_stays_selectable() {
        // (1,2) starts at 3; merging (0,1) removes two of them
        let words = [(vec![0, 1, 2], 2), (vec![3, 1, 2], 1), (vec![0, 1], 2)];
        let mut t = trainer(&words, 4);
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 0, right: 1, merged: 4, freq: 4 }
        ));
        // (4,2) = 2 beats (1,2) = 1 and (3,1) = 1
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 4, right: 2, freq: 2, .. }
        ));
        // (1,2) now occurs once, after its count dropped from 3
        assert!(matches!(
            t.merge_step(1),
            MergeStep::Merged { left: 1, right: 2, freq: 1, .. }
        ));
    }

    #[test]
    fn test_merged_tokens_merge_again() {
        let mut t = trainer(&[(vec![0, 1, 0, 1], 1)], 2);
        assert_eq!(
            t.merge_step(1),
            MergeStep::Merged { left: 0, right: 1, merged: 2, freq: 2 }
        );
        assert_eq!(
            t.merge_step(1),
            MergeStep::Merged { left: 2, right: 2, merged: 3, freq: 1 }
        );
        assert_eq!(t.get_encodings(), vec![vec![3]]);
        assert_eq!(t.corpus_tokens(), 1);
    }
}
