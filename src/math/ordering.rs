//! Dof reorderings applied before factorization
//!
//! Permutations follow the `perm[new] = old` convention throughout.

use std::collections::{BTreeSet, VecDeque};

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

/// Reordering applied to an operator before it is factorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reordering {
    /// Keep the dof order produced by the model
    #[default]
    Natural,
    /// Bandwidth reduction, suited to skyline storage
    ReverseCuthillMcKee,
    /// Greedy minimum-degree fill reduction, suited to general sparse LDLᵀ
    MinimumDegree,
}

impl Reordering {
    /// Compute the permutation for `csr`, or `None` for the natural order
    pub fn permutation(&self, csr: &CsrMatrix<f64>) -> Option<Vec<usize>> {
        match self {
            Reordering::Natural => None,
            Reordering::ReverseCuthillMcKee => Some(reverse_cuthill_mckee(csr)),
            Reordering::MinimumDegree => Some(minimum_degree(csr)),
        }
    }
}

/// Symmetric off-diagonal adjacency of the stored pattern
fn adjacency(csr: &CsrMatrix<f64>) -> Vec<Vec<usize>> {
    let n = csr.nrows();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (row, col, &val) in csr.triplet_iter() {
        if val != 0.0 && row != col {
            adj[row].push(col);
            adj[col].push(row);
        }
    }
    for neighbors in &mut adj {
        neighbors.sort_unstable();
        neighbors.dedup();
    }
    adj
}

/// Bandwidth reduction using Reverse Cuthill-McKee algorithm
///
/// Returns a permutation vector that reorders dofs to minimize bandwidth
pub fn reverse_cuthill_mckee(csr: &CsrMatrix<f64>) -> Vec<usize> {
    let n = csr.nrows();
    if n == 0 {
        return vec![];
    }

    let mut adj = adjacency(csr);

    // Get degrees for sorting
    let degrees: Vec<usize> = adj.iter().map(|v| v.len()).collect();

    // Sort adjacencies by degree (for tie-breaking)
    for neighbors in &mut adj {
        neighbors.sort_by_key(|&i| degrees[i]);
    }

    let mut visited = vec![false; n];
    let mut result = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    // Start from node with minimum degree
    let start = (0..n).min_by_key(|&i| degrees[i]).unwrap_or(0);

    queue.push_back(start);
    visited[start] = true;

    while let Some(node) = queue.pop_front() {
        result.push(node);

        for &neighbor in &adj[node] {
            if !visited[neighbor] {
                visited[neighbor] = true;
                queue.push_back(neighbor);
            }
        }

        // Handle disconnected components
        if queue.is_empty() && result.len() < n {
            if let Some(next) = (0..n).filter(|&i| !visited[i]).min_by_key(|&i| degrees[i]) {
                queue.push_back(next);
                visited[next] = true;
            }
        }
    }

    // Reverse the ordering (Cuthill-McKee -> Reverse Cuthill-McKee)
    result.reverse();
    result
}

/// Greedy minimum-degree ordering on the explicit elimination graph
///
/// Eliminating a node turns its neighbourhood into a clique; the next pivot is
/// always the remaining node of smallest degree (ties broken by index).
pub fn minimum_degree(csr: &CsrMatrix<f64>) -> Vec<usize> {
    let n = csr.nrows();
    let mut adj: Vec<BTreeSet<usize>> = adjacency(csr)
        .into_iter()
        .map(|v| v.into_iter().collect())
        .collect();

    let mut queue: BTreeSet<(usize, usize)> = (0..n).map(|i| (adj[i].len(), i)).collect();
    let mut order = Vec::with_capacity(n);

    while let Some((_, pivot)) = queue.pop_first() {
        order.push(pivot);

        let neighbors: Vec<usize> = std::mem::take(&mut adj[pivot]).into_iter().collect();
        for &a in &neighbors {
            queue.remove(&(adj[a].len(), a));
            adj[a].remove(&pivot);
            for &b in &neighbors {
                if b != a {
                    adj[a].insert(b);
                }
            }
            queue.insert((adj[a].len(), a));
        }
    }

    order
}

/// Apply permutation to reorder dofs
pub fn apply_permutation<T: Clone>(vec: &[T], perm: &[usize]) -> Vec<T> {
    perm.iter().map(|&i| vec[i].clone()).collect()
}

/// Create inverse permutation
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (new_idx, &old_idx) in perm.iter().enumerate() {
        inv[old_idx] = new_idx;
    }
    inv
}

/// `A'(i, j) = A(perm[i], perm[j])`
pub fn permute_symmetric(csr: &CsrMatrix<f64>, perm: &[usize]) -> CsrMatrix<f64> {
    let inv = inverse_permutation(perm);
    let mut coo = CooMatrix::new(csr.nrows(), csr.ncols());
    for (row, col, &val) in csr.triplet_iter() {
        coo.push(inv[row], inv[col], val);
    }
    CsrMatrix::from(&coo)
}

/// `y[k] = x[perm[k]]`
pub fn permute_vector(x: &DVector<f64>, perm: &[usize]) -> DVector<f64> {
    DVector::from_vec(apply_permutation(x.as_slice(), perm))
}

/// Inverse of [`permute_vector`]: `x[perm[k]] = y[k]`
pub fn unpermute_vector(y: &DVector<f64>, perm: &[usize]) -> DVector<f64> {
    let mut x = DVector::zeros(perm.len());
    for (k, &old) in perm.iter().enumerate() {
        x[old] = y[k];
    }
    x
}

/// Largest `|i - j|` over the stored entries
pub fn bandwidth(csr: &CsrMatrix<f64>) -> usize {
    csr.triplet_iter()
        .map(|(i, j, _)| i.abs_diff(j))
        .max()
        .unwrap_or(0)
}
