// Copyright 2021 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A single beam search worker. Each worker owns its own `beam`/`next_beam` layers and a
//! slice of the root moves; workers never share state except through the transposition
//! table handed to them by the parallel driver.

use tracing::Level;

use crate::grid::{Coordinate, Grid, Move};
use crate::heuristic;
use crate::table::TranspositionTable;

/// A candidate board state reached after `path.len()` moves, with `cost` the heuristic
/// value of `grid` at the moment it was admitted to a beam layer.
#[derive(Clone, Debug)]
struct Node {
    grid: Grid,
    path: Vec<Coordinate>,
    cost: u32,
    insertion_order: u64,
}

/// An ordered multiset of `Node`s, kept sorted ascending by `(cost, insertion_order)` so
/// that the best candidate is always first and the worst is always last. Ties on cost are
/// broken by insertion order, which means earlier-discovered states win retention slots
/// when the beam is full -- this favors shallower paths when the transposition table
/// produces duplicate costs.
struct Beam {
    nodes: Vec<Node>,
    next_insertion_order: u64,
}

impl Beam {
    fn new() -> Beam {
        Beam {
            nodes: Vec::new(),
            next_insertion_order: 0,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts unconditionally, ignoring the width bound. Used for the root layer, whose
    /// breadth is already bounded by the driver's partitioning of root moves.
    fn insert_unbounded(&mut self, grid: Grid, path: Vec<Coordinate>, cost: u32) {
        let node = self.make_node(grid, path, cost);
        let pos = self
            .nodes
            .binary_search_by(|n| sort_key(n).cmp(&sort_key(&node)))
            .unwrap_or_else(|pos| pos);
        self.nodes.insert(pos, node);
    }

    /// Admits a node under the bounded-multiset rule: insert if there's room, otherwise
    /// evict the current worst node if `cost` beats it.
    fn admit(&mut self, grid: Grid, path: Vec<Coordinate>, cost: u32, width: usize) {
        if self.nodes.len() < width {
            self.insert_unbounded(grid, path, cost);
            return;
        }

        let worst_cost = self.nodes.last().map(|n| n.cost).unwrap_or(u32::MAX);
        if cost < worst_cost {
            self.nodes.pop();
            self.insert_unbounded(grid, path, cost);
        }
    }

    fn make_node(&mut self, grid: Grid, path: Vec<Coordinate>, cost: u32) -> Node {
        let insertion_order = self.next_insertion_order;
        self.next_insertion_order += 1;
        Node {
            grid,
            path,
            cost,
            insertion_order,
        }
    }

    fn take(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.nodes)
    }

    /// Rebuilds a `Beam` from a `Vec<Node>` that is already sorted by `sort_key` (as
    /// produced by a prior `take()`). Used to restore the active layer when the next
    /// layer turns out to be empty, instead of discarding it.
    fn from_sorted(nodes: Vec<Node>) -> Beam {
        let next_insertion_order = nodes.len() as u64;
        Beam {
            nodes,
            next_insertion_order,
        }
    }

    fn best(&self) -> Option<&Node> {
        self.nodes.first()
    }
}

fn sort_key(node: &Node) -> (u32, u64) {
    (node.cost, node.insertion_order)
}

/// Builds the final move path for a board that has fewer than 3 remaining clusters:
/// `base_path` plus the move just played, plus every remaining cluster's representative
/// in `enumerate_moves` order, since so few clusters remain that clicking them all in
/// discovery order is as good as any other choice.
fn solved_path(base_path: &[Coordinate], played: Coordinate, child: &Grid) -> Vec<Coordinate> {
    let mut path = base_path.to_vec();
    path.push(played);
    for trailing in child.enumerate_moves() {
        path.push(trailing.representative());
    }
    path
}

/// The outcome of one worker's beam search over its slice of root moves.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub solved: bool,
    pub path: Vec<Coordinate>,
    pub boards_analyzed: u64,
    pub duplicates_dropped: u64,
}

/// Runs a beam search starting from `start`, considering only the root moves in `roots`,
/// consulting `table` to prune revisited states, retaining at most `beam_width` candidates
/// per layer, and searching to at most `max_depth` layers.
pub fn run_worker(
    worker_id: usize,
    start: &Grid,
    roots: &[Move],
    beam_width: usize,
    max_depth: u32,
    table: &TranspositionTable,
) -> WorkerResult {
    let _span = tracing::span!(Level::DEBUG, "beam_worker", worker_id).entered();

    let mut boards_analyzed: u64 = 0;
    let mut duplicates_dropped: u64 = 0;

    let mut beam = Beam::new();
    for root in roots {
        let child = start.play(root);
        boards_analyzed += 1;

        if child.count_moves() < 3 {
            let path = solved_path(&[], root.representative(), &child);

            tracing::event!(
                Level::DEBUG,
                worker_id,
                depth = 0u32,
                path_len = path.len(),
                boards_analyzed,
                "worker found a clearing path at the root"
            );

            return WorkerResult {
                solved: true,
                path,
                boards_analyzed,
                duplicates_dropped,
            };
        }

        beam.insert_unbounded(child, vec![root.representative()], 0);
    }

    for depth in 0..max_depth {
        let mut next_beam = Beam::new();
        let nodes = beam.take();

        tracing::event!(
            Level::TRACE,
            worker_id,
            depth,
            beam_size = nodes.len(),
            boards_analyzed,
            "expanding beam layer"
        );

        for node in &nodes {
            for mv in node.grid.enumerate_moves() {
                let child = node.grid.play(&mv);
                boards_analyzed += 1;

                if child.count_moves() < 3 {
                    let path = solved_path(&node.path, mv.representative(), &child);

                    tracing::event!(
                        Level::DEBUG,
                        worker_id,
                        depth,
                        path_len = path.len(),
                        boards_analyzed,
                        "worker found a clearing path"
                    );

                    return WorkerResult {
                        solved: true,
                        path,
                        boards_analyzed,
                        duplicates_dropped,
                    };
                }

                let cost = heuristic::score(&child);
                let key = crate::compressed::CompressedGrid::pack(&child);
                if !table.insert_if_better(key, depth) {
                    duplicates_dropped += 1;
                    continue;
                }

                let mut path = node.path.clone();
                path.push(mv.representative());
                next_beam.admit(child, path, cost, beam_width);
            }
        }

        if next_beam.is_empty() {
            beam = Beam::from_sorted(nodes);
            break;
        }

        beam = next_beam;
    }

    match beam.best() {
        Some(best) => WorkerResult {
            solved: false,
            path: best.path.clone(),
            boards_analyzed,
            duplicates_dropped,
        },
        None => WorkerResult {
            solved: false,
            path: Vec::new(),
            boards_analyzed,
            duplicates_dropped,
        },
    }
}
