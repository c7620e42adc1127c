/// Renumbering plan for moving one waiting job immediately after a pivot.
///
/// The queue keeps a dense total order of integer priority indices; moving a
/// job shifts the contiguous run between its old and new position by one so
/// that every other job keeps its relative order. The plan is computed here
/// as pure data and applied by the repository inside a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderPlan {
    /// Job and pivot are the same, or the job is already in place.
    Noop,
    /// Move to the head of the queue: no other row moves.
    MoveToHead { new_index: i64 },
    /// Job moves towards the head: rows strictly between pivot and job
    /// (exclusive on both ends) shift by +1.
    ShiftUp {
        shift_above: i64,
        shift_below: i64,
        new_index: i64,
    },
    /// Job moves towards the tail: rows in `[job+1, pivot]` (inclusive)
    /// shift by -1.
    ShiftDown {
        shift_from: i64,
        shift_to: i64,
        new_index: i64,
    },
}

/// Compute the plan for `reorder_after(job, pivot)`.
///
/// `pivot_index = None` means "move to head". `queue_min` is the smallest
/// priority index currently in the queue and is only consulted for the head
/// move.
pub fn plan(job_index: i64, pivot_index: Option<i64>, queue_min: i64) -> ReorderPlan {
    let Some(pivot) = pivot_index else {
        return ReorderPlan::MoveToHead {
            new_index: queue_min - 1,
        };
    };

    if pivot < job_index {
        ReorderPlan::ShiftUp {
            shift_above: pivot,
            shift_below: job_index,
            new_index: pivot + 1,
        }
    } else if pivot > job_index {
        ReorderPlan::ShiftDown {
            shift_from: job_index + 1,
            shift_to: pivot,
            new_index: pivot,
        }
    } else {
        ReorderPlan::Noop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply a plan to an in-memory queue of (name, index) pairs, the way
    /// the repository applies it to rows.
    fn apply(queue: &mut [(char, i64)], job: char, plan: ReorderPlan) {
        match plan {
            ReorderPlan::Noop => {}
            ReorderPlan::MoveToHead { new_index } => {
                queue.iter_mut().find(|(n, _)| *n == job).unwrap().1 = new_index;
            }
            ReorderPlan::ShiftUp {
                shift_above,
                shift_below,
                new_index,
            } => {
                for (name, idx) in queue.iter_mut() {
                    if *name != job && *idx > shift_above && *idx < shift_below {
                        *idx += 1;
                    }
                }
                queue.iter_mut().find(|(n, _)| *n == job).unwrap().1 = new_index;
            }
            ReorderPlan::ShiftDown {
                shift_from,
                shift_to,
                new_index,
            } => {
                for (name, idx) in queue.iter_mut() {
                    if *name != job && *idx >= shift_from && *idx <= shift_to {
                        *idx -= 1;
                    }
                }
                queue.iter_mut().find(|(n, _)| *n == job).unwrap().1 = new_index;
            }
        }
    }

    fn ordered(queue: &mut [(char, i64)]) -> Vec<char> {
        queue.sort_by_key(|(_, idx)| *idx);
        queue.iter().map(|(n, _)| *n).collect()
    }

    fn index_of(queue: &[(char, i64)], job: char) -> i64 {
        queue.iter().find(|(n, _)| *n == job).unwrap().1
    }

    #[test]
    fn move_down_after_pivot() {
        // [A(1), B(2), C(3), D(4)], reorder_after(A, C)
        let mut q = vec![('A', 1), ('B', 2), ('C', 3), ('D', 4)];
        let p = plan(1, Some(3), 1);
        apply(&mut q, 'A', p);
        assert_eq!(index_of(&q, 'B'), 1);
        assert_eq!(index_of(&q, 'C'), 2);
        assert_eq!(index_of(&q, 'A'), 3);
        assert_eq!(index_of(&q, 'D'), 4);
        assert_eq!(ordered(&mut q), vec!['B', 'C', 'A', 'D']);
    }

    #[test]
    fn move_to_head() {
        // [A(1), B(2), C(3)], reorder_after(C, null)
        let mut q = vec![('A', 1), ('B', 2), ('C', 3)];
        let p = plan(3, None, 1);
        assert_eq!(p, ReorderPlan::MoveToHead { new_index: 0 });
        apply(&mut q, 'C', p);
        assert_eq!(index_of(&q, 'C'), 0);
        assert_eq!(ordered(&mut q), vec!['C', 'A', 'B']);
    }

    #[test]
    fn move_up_after_pivot() {
        // [A(1), B(2), C(3), D(4)], reorder_after(D, A) -> [A, D, B, C]
        let mut q = vec![('A', 1), ('B', 2), ('C', 3), ('D', 4)];
        let p = plan(4, Some(1), 1);
        apply(&mut q, 'D', p);
        assert_eq!(ordered(&mut q), vec!['A', 'D', 'B', 'C']);
    }

    #[test]
    fn reorder_onto_self_is_noop() {
        assert_eq!(plan(2, Some(2), 1), ReorderPlan::Noop);
    }

    #[test]
    fn reorder_is_reversible() {
        // reorder_after(J, pivot); reorder_after(J, original_pivot) restores
        // the original order.
        let mut q = vec![('A', 1), ('B', 2), ('C', 3), ('D', 4)];
        let p = plan(index_of(&q, 'A'), Some(index_of(&q, 'C')), 1);
        apply(&mut q, 'A', p);
        assert_eq!(ordered(&mut q.clone()), vec!['B', 'C', 'A', 'D']);

        // A originally sat at the head; moving it back is a head move.
        let p = plan(index_of(&q, 'A'), None, q.iter().map(|(_, i)| *i).min().unwrap());
        apply(&mut q, 'A', p);
        assert_eq!(ordered(&mut q), vec!['A', 'B', 'C', 'D']);
    }

    #[test]
    fn indices_stay_pairwise_distinct() {
        let mut q = vec![('A', 1), ('B', 2), ('C', 3), ('D', 4), ('E', 5)];
        for (job, pivot) in [('B', Some(4)), ('E', Some(1)), ('A', None)] {
            let min = q.iter().map(|(_, i)| *i).min().unwrap();
            let p = plan(index_of(&q, job), pivot, min);
            apply(&mut q, job, p);
            let mut seen = std::collections::BTreeSet::new();
            assert!(q.iter().all(|(_, i)| seen.insert(*i)), "duplicate index after moving {job}");
        }
    }

    #[test]
    fn relative_order_of_others_is_preserved() {
        let original = vec![('A', 1), ('B', 2), ('C', 3), ('D', 4), ('E', 5)];
        for pivot in [None, Some(1), Some(2), Some(4), Some(5)] {
            let mut q = original.clone();
            let p = plan(3, pivot, 1);
            apply(&mut q, 'C', p);
            let rest: Vec<char> = ordered(&mut q).into_iter().filter(|c| *c != 'C').collect();
            assert_eq!(rest, vec!['A', 'B', 'D', 'E'], "others moved for pivot {pivot:?}");
        }
    }
}
