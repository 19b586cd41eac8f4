//! A* Pathfinder
//!
//! Grid search used by bots to chase their targets. Heuristic is squared
//! Euclidean distance, step cost is 1. The search never fails outright:
//! when the node budget runs out or the open set empties before reaching
//! the destination, the best-effort path to the closest expanded node is
//! returned, and an empty result means "no move available this tick".
//!
//! Note the search space does not wrap: rays of reachable tiles end at the
//! board edge even though movement itself is toroidal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::core::position::Position;
use crate::MAX_PATH_ITER;

/// Find a path from `origin` toward `destination` over free tiles.
///
/// `is_free` reports whether a tile can be entered (no blockable entity).
/// The returned path excludes `origin`; when the destination is reached its
/// last element equals `destination`, otherwise it leads to the expanded
/// node with the smallest heuristic.
pub fn find_path<F>(
    origin: Position,
    destination: Position,
    budget: Option<u32>,
    is_free: F,
) -> Vec<Position>
where
    F: Fn(Position) -> bool,
{
    let mut budget = budget.unwrap_or(MAX_PATH_ITER);

    // Priority queue keyed by f = g + h; ties broken toward smaller h.
    let mut open: BinaryHeap<Reverse<(i64, i64, Position)>> = BinaryHeap::new();
    let mut g_score: HashMap<Position, i64> = HashMap::new();
    let mut parent: HashMap<Position, Position> = HashMap::new();
    let mut closed: HashSet<Position> = HashSet::new();
    let mut best = (origin.distance_squared(destination), origin);

    g_score.insert(origin, 0);
    open.push(Reverse((best.0, best.0, origin)));

    while let Some(Reverse((_, h, node))) = open.pop() {
        if budget == 0 {
            break;
        }
        budget -= 1;

        // Stale heap entries are skipped instead of updated in place.
        if !closed.insert(node) {
            continue;
        }
        if h < best.0 {
            best = (h, node);
        }
        if node == destination {
            return reconstruct(&parent, origin, node);
        }

        let node_g = g_score.get(&node).copied().unwrap_or(0);
        for neighbor in node.raw_neighbors() {
            if !neighbor.in_bounds() || !is_free(neighbor) || closed.contains(&neighbor) {
                continue;
            }
            let tentative = node_g + 1;
            if g_score.get(&neighbor).map_or(true, |&old| tentative < old) {
                g_score.insert(neighbor, tentative);
                parent.insert(neighbor, node);
                let nh = neighbor.distance_squared(destination);
                open.push(Reverse((tentative + nh, nh, neighbor)));
            }
        }
    }

    // Budget exhausted or unreachable: best-effort toward the destination.
    reconstruct(&parent, origin, best.1)
}

fn reconstruct(
    parent: &HashMap<Position, Position>,
    origin: Position,
    goal: Position,
) -> Vec<Position> {
    let mut path = Vec::new();
    let mut node = goal;
    while node != origin {
        path.push(node);
        match parent.get(&node) {
            Some(prev) => node = *prev,
            None => return Vec::new(),
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacent(a: Position, b: Position) -> bool {
        (a.x - b.x).abs() + (a.y - b.y).abs() == 1
    }

    #[test]
    fn straight_line_on_an_empty_grid() {
        let path = find_path(Position::new(0, 0), Position::new(0, 3), None, |_| true);

        assert_eq!(path.len(), 3);
        assert_eq!(*path.last().unwrap(), Position::new(0, 3));
        let mut prev = Position::new(0, 0);
        for step in &path {
            assert!(adjacent(prev, *step));
            prev = *step;
        }
    }

    #[test]
    fn routes_around_an_obstacle() {
        // Wall across x=2 except at y=4.
        let blocked = |p: Position| p.x == 2 && p.y != 4;
        let path = find_path(
            Position::new(0, 0),
            Position::new(5, 0),
            None,
            |p| !blocked(p),
        );

        assert_eq!(*path.last().unwrap(), Position::new(5, 0));
        assert!(path.contains(&Position::new(2, 4)));
        let mut prev = Position::new(0, 0);
        for step in &path {
            assert!(adjacent(prev, *step));
            assert!(!blocked(*step));
            prev = *step;
        }
    }

    #[test]
    fn walled_in_origin_yields_no_move() {
        let origin = Position::new(5, 5);
        let path = find_path(origin, Position::new(0, 0), None, |p| {
            !adjacent(origin, p)
        });
        assert!(path.is_empty());
    }

    #[test]
    fn exhausted_budget_returns_best_effort() {
        // Destination sealed off; the search must still come back with the
        // closest tile it expanded.
        let dest = Position::new(9, 9);
        let path = find_path(Position::new(0, 0), dest, Some(30), |p| {
            !adjacent(dest, p) && p != dest
        });

        assert!(!path.is_empty());
        let end = *path.last().unwrap();
        assert!(end != dest);
        assert!(
            end.distance_squared(dest) < Position::new(0, 0).distance_squared(dest),
            "best-effort path should move toward the destination"
        );
    }

    #[test]
    fn already_there_is_an_empty_path() {
        let path = find_path(Position::new(3, 3), Position::new(3, 3), None, |_| true);
        assert!(path.is_empty());
    }
}
