//! HDBSCAN density-based clustering.
//!
//! Core distances → mutual-reachability MST (Prim, O(n²) time, O(n) memory) →
//! single-linkage dendrogram → condensed tree → excess-of-mass selection.
//! The root cluster is never selected, so a dataset with no density structure
//! comes back as all noise.

use std::collections::VecDeque;

/// Label assigned to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Lambda used for zero-distance merges.
const MAX_LAMBDA: f64 = 1e10;

#[derive(Debug, Clone)]
pub struct Hdbscan {
    min_cluster_size: usize,
    min_samples: usize,
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    lambda: f64,
    size: usize,
}

impl Hdbscan {
    /// `min_samples` defaults to `min_cluster_size`. Sizes below 2 are raised to 2.
    pub fn new(min_cluster_size: usize) -> Self {
        let size = min_cluster_size.max(2);
        Self {
            min_cluster_size: size,
            min_samples: size,
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    /// Cluster label per point, numbered from 0, or [`NOISE`].
    pub fn fit(&self, points: &[Vec<f64>]) -> Vec<i32> {
        let n = points.len();
        if n < 2 {
            return vec![NOISE; n];
        }
        let core = core_distances(points, self.min_samples.min(n));
        let mst = minimum_spanning_tree(points, &core);
        let dendrogram = single_linkage(n, mst);
        self.label(n, &dendrogram)
    }

    fn label(&self, n: usize, dendrogram: &[Merge]) -> Vec<i32> {
        let m = self.min_cluster_size;
        let size_of = |node: usize| if node < n { 1 } else { dendrogram[node - n].size };

        // Condense: clusters are numbered in breadth-first order, root = 0.
        let mut cluster_edges: Vec<CondensedEdge> = Vec::new(); // index = child cluster - 1
        let mut birth = vec![0.0_f64];
        let mut point_exit: Vec<(usize, f64)> = vec![(0, 0.0); n];
        let mut queue = VecDeque::from([(2 * n - 2, 0_usize, 0.0_f64)]);

        while let Some((node, cluster, entry_lambda)) = queue.pop_front() {
            if node < n {
                point_exit[node] = (cluster, entry_lambda);
                continue;
            }
            let merge = dendrogram[node - n];
            let lambda = lambda_of(merge.distance);
            let (ls, rs) = (size_of(merge.left), size_of(merge.right));
            match (ls >= m, rs >= m) {
                (true, true) => {
                    for child in [merge.left, merge.right] {
                        let id = birth.len();
                        birth.push(lambda);
                        cluster_edges.push(CondensedEdge {
                            parent: cluster,
                            lambda,
                            size: size_of(child),
                        });
                        queue.push_back((child, id, lambda));
                    }
                }
                (true, false) => {
                    fall_out(n, dendrogram, merge.right, cluster, lambda, &mut point_exit);
                    queue.push_back((merge.left, cluster, lambda));
                }
                (false, true) => {
                    fall_out(n, dendrogram, merge.left, cluster, lambda, &mut point_exit);
                    queue.push_back((merge.right, cluster, lambda));
                }
                (false, false) => {
                    fall_out(n, dendrogram, merge.left, cluster, lambda, &mut point_exit);
                    fall_out(n, dendrogram, merge.right, cluster, lambda, &mut point_exit);
                }
            }
        }

        let n_clusters = birth.len();
        let mut stability = vec![0.0_f64; n_clusters];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for (i, edge) in cluster_edges.iter().enumerate() {
            let child = i + 1;
            stability[edge.parent] += (edge.lambda - birth[edge.parent]) * edge.size as f64;
            children[edge.parent].push(child);
        }
        for &(cluster, lambda) in &point_exit {
            stability[cluster] += lambda - birth[cluster];
        }

        // Excess of mass, leaves first. Ties keep the parent.
        let mut selected = vec![false; n_clusters];
        for cluster in (1..n_clusters).rev() {
            let subtree: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
            if subtree > stability[cluster] {
                stability[cluster] = subtree;
            } else {
                selected[cluster] = true;
                let mut stack = children[cluster].clone();
                while let Some(c) = stack.pop() {
                    selected[c] = false;
                    stack.extend(children[c].iter().copied());
                }
            }
        }

        let mut label_of = vec![NOISE; n_clusters];
        let mut next = 0;
        for (cluster, &is_selected) in selected.iter().enumerate() {
            if is_selected {
                label_of[cluster] = next;
                next += 1;
            }
        }

        point_exit
            .iter()
            .map(|&(mut cluster, _)| loop {
                if selected[cluster] {
                    return label_of[cluster];
                }
                if cluster == 0 {
                    return NOISE;
                }
                cluster = cluster_edges[cluster - 1].parent;
            })
            .collect()
    }
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

/// Record every point under `node` as leaving `cluster` at `lambda`.
fn fall_out(
    n: usize,
    dendrogram: &[Merge],
    node: usize,
    cluster: usize,
    lambda: f64,
    point_exit: &mut [(usize, f64)],
) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node < n {
            point_exit[node] = (cluster, lambda);
        } else {
            let merge = dendrogram[node - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Distance to the k-th nearest neighbor, counting the point itself.
fn core_distances(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    let k = k.max(1);
    let mut dists = vec![0.0; points.len()];
    points
        .iter()
        .map(|p| {
            for (d, q) in dists.iter_mut().zip(points) {
                *d = euclidean(p, q);
            }
            let (_, kth, _) = dists.select_nth_unstable_by(k - 1, f64::total_cmp);
            *kth
        })
        .collect()
}

/// Prim's algorithm over the implicit mutual-reachability graph.
fn minimum_spanning_tree(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));
    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = euclidean(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }
        let mut next = None;
        for j in 0..n {
            if !in_tree[j] && next.is_none_or(|k: usize| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(j) = next else { break };
        in_tree[j] = true;
        edges.push((from[j], j, best[j]));
        current = j;
    }
    edges
}

/// Union-find merge of MST edges in ascending weight; node ids `n..2n-1`.
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size = vec![1usize; 2 * n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (a, b, distance) in edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let id = n + merges.len();
        size[id] = size[ra] + size[rb];
        parent[ra] = id;
        parent[rb] = id;
        merges.push(Merge {
            left: ra,
            right: rb,
            distance,
            size: size[id],
        });
    }
    merges
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blob(cx: f64, cy: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|i| {
                let angle = i as f64 * 0.7;
                let r = 0.1 + (i % 3) as f64 * 0.05;
                vec![cx + r * angle.cos(), cy + r * angle.sin()]
            })
            .collect()
    }

    #[test]
    fn test_two_blobs_and_outlier() {
        let mut points = blob(0.0, 0.0, 12);
        points.extend(blob(10.0, 10.0, 12));
        points.push(vec![50.0, -40.0]);
        let labels = Hdbscan::new(4).fit(&points);

        assert_eq!(labels.len(), 25);
        assert!(labels[..12].iter().all(|&l| l == labels[0]));
        assert!(labels[12..24].iter().all(|&l| l == labels[12]));
        assert_ne!(labels[0], labels[12]);
        assert_ne!(labels[0], NOISE);
        assert_eq!(labels[24], NOISE);
        let mut distinct: Vec<i32> = labels.iter().copied().filter(|&l| l != NOISE).collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct, vec![0, 1]);
    }

    #[test]
    fn test_uniform_points_are_noise() {
        let points: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let labels = Hdbscan::new(5).fit(&points);
        assert!(labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_tiny_inputs() {
        assert!(Hdbscan::new(2).fit(&[]).is_empty());
        assert_eq!(Hdbscan::new(2).fit(&[vec![1.0]]), vec![NOISE]);
    }

    #[test]
    fn test_duplicate_points() {
        let mut points = vec![vec![0.0, 0.0]; 5];
        points.extend(vec![vec![5.0, 5.0]; 5]);
        let labels = Hdbscan::new(3).fit(&points);
        assert!(labels[..5].iter().all(|&l| l == labels[0] && l != NOISE));
        assert!(labels[5..].iter().all(|&l| l == labels[5] && l != NOISE));
        assert_ne!(labels[0], labels[5]);
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = vec![vec![0.0], vec![1.0], vec![3.0]];
        assert_eq!(core_distances(&points, 1), vec![0.0, 0.0, 0.0]);
        assert_eq!(core_distances(&points, 2), vec![1.0, 1.0, 2.0]);
    }
}
