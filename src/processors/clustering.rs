//! DBSCAN clustering of projected galaxy positions.
//!
//! This module implements a parallelized DBSCAN using:
//! - `kiddo` KD-tree for radius neighbor queries
//! - `rayon` for parallel neighbor finding and core point identification
//! - Compare-and-swap disjoint sets for lock-free cluster merging
//!
//! # Example
//!
//! ```
//! use cosmicflows_pipeline::processors::clustering::label;
//!
//! let points = vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [100.0, 0.0, 0.0]];
//! let labels = label(&points, 1.0, 3);
//! assert_eq!(labels, vec![0, 0, 0, -1]);
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::ClusteringConfig;
use crate::core::types::{GalaxyTable, NOISE_LABEL};

/// Disjoint sets over `0..n` that many threads can merge at once.
///
/// A root points at itself. Merging links the smaller root under the
/// larger one with a single compare-and-swap, retrying if another thread
/// moved either root first.
struct ClusterForest {
    parent: Vec<AtomicUsize>,
}

impl ClusterForest {
    fn with_len(n: usize) -> Self {
        Self {
            parent: (0..n).map(AtomicUsize::new).collect(),
        }
    }

    fn root(&self, start: usize) -> usize {
        let mut node = start;
        loop {
            let up = self.parent[node].load(Ordering::Acquire);
            if up == node {
                return node;
            }
            let grand = self.parent[up].load(Ordering::Acquire);
            if grand != up {
                // Path halving; a lost race only skips the shortcut
                let _ = self.parent[node].compare_exchange(
                    up,
                    grand,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            node = grand;
        }
    }

    /// Join the sets of `a` and `b`; false if they were already one set.
    fn merge(&self, a: usize, b: usize) -> bool {
        loop {
            let (ra, rb) = (self.root(a), self.root(b));
            if ra == rb {
                return false;
            }
            let (child, parent) = if ra < rb { (ra, rb) } else { (rb, ra) };
            if self.parent[child]
                .compare_exchange(child, parent, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[inline]
fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

fn lexicographic(a: &[f64; 3], b: &[f64; 3]) -> CmpOrdering {
    a[0].total_cmp(&b[0])
        .then(a[1].total_cmp(&b[1]))
        .then(a[2].total_cmp(&b[2]))
}

/// Fixed rotation applied to tree keys only.
///
/// `ImmutableKdTree` cannot split a bucket whose items all share the split
/// axis value, so axis-aligned layouts (a plane `x = 0`, a line of equal
/// RA/Dec) are turned off-axis before the tree is built. Distances are
/// unchanged; the exact test still runs on the original coordinates.
const TREE_ROTATION: [[f64; 3]; 3] = [
    // Rz(0.61) * Ry(1.13) * Rx(0.37)
    [0.349_710_865_864_286_5, -0.266_034_602_293_583_1, 0.898_291_656_801_367_6],
    [0.244_419_520_495_908_5, 0.951_536_222_513_381_0, 0.186_649_176_921_613_5],
    [-0.904_412_189_378_825_8, 0.154_286_770_746_751_6, 0.397_786_606_204_304_2],
];

fn rotate(p: &[f64; 3]) -> [f64; 3] {
    TREE_ROTATION.map(|row| row[0] * p[0] + row[1] * p[1] + row[2] * p[2])
}

/// Distinct positions plus, for each, the input indices that share it.
fn distinct_positions(points: &[[f64; 3]]) -> (Vec<[f64; 3]>, Vec<Vec<usize>>) {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| lexicographic(&points[a], &points[b]).then(a.cmp(&b)));

    let mut unique: Vec<[f64; 3]> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for i in order {
        match unique.last() {
            Some(last) if lexicographic(last, &points[i]) == CmpOrdering::Equal => {
                if let Some(group) = members.last_mut() {
                    group.push(i);
                }
            }
            _ => {
                unique.push(points[i]);
                members.push(vec![i]);
            }
        }
    }
    (unique, members)
}

/// Indices of every point within `eps` of each point (itself included),
/// sorted ascending.
///
/// Coincident points are collapsed before the tree is built and fanned
/// back out afterwards.
fn radius_neighbors(points: &[[f64; 3]], eps: f64) -> Vec<Vec<usize>> {
    let (unique, members) = distinct_positions(points);
    let keys: Vec<[f64; 3]> = unique.iter().map(rotate).collect();
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&keys);

    let eps_sq = eps * eps;
    // Query slightly wide to absorb rotation rounding; the exact `<= eps`
    // test below decides membership.
    let scale = unique
        .iter()
        .flat_map(|p| p.iter())
        .fold(0.0f64, |m, c| m.max(c.abs()));
    let slack = 1e-9 * (1.0 + scale + eps);
    let query_sq = (eps + slack) * (eps + slack);

    let unique_neighbors: Vec<Vec<usize>> = keys
        .par_iter()
        .zip(unique.par_iter())
        .map(|(key, p)| {
            tree.within::<SquaredEuclidean>(key, query_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .filter(|&u| squared_distance(p, &unique[u]) <= eps_sq)
                .collect()
        })
        .collect();

    let mut neighbors = vec![Vec::new(); points.len()];
    for (u, group) in members.iter().enumerate() {
        let mut found: Vec<usize> = unique_neighbors[u]
            .iter()
            .flat_map(|&v| members[v].iter().copied())
            .collect();
        found.sort_unstable();
        for &i in group {
            neighbors[i] = found.clone();
        }
    }
    neighbors
}

/// DBSCAN cluster labels for a point cloud.
///
/// Two points are neighbors when their Euclidean distance is `<= eps`. A
/// core point has at least `min_samples` neighbors, itself included.
/// Clusters are the connected components of core points; a non-core point
/// within `eps` of a core point joins that cluster (the nearest core point
/// wins when several clusters reach it), and every other point is noise
/// (`-1`).
///
/// Cluster ids are assigned 0, 1, ... in order of each cluster's first core
/// point in the input. The induced partition does not depend on thread
/// scheduling or input order.
///
/// # Algorithm (Parallelized)
///
/// 1. **Build KD-tree**: O(n log n) construction using kiddo
/// 2. **Parallel neighbor finding**: radius query per point
/// 3. **Parallel core point identification**
/// 4. **Lock-free cluster formation**: concurrent disjoint sets over
///    core-core edges
/// 5. **Label assignment**: sequential ids from set roots, border
///    points attached to their nearest core neighbor
///
/// A negative or NaN `eps` reaches nothing, so every point is noise.
pub fn label(points: &[[f64; 3]], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    if !(eps >= 0.0) {
        return vec![NOISE_LABEL; n];
    }
    if n == 0 {
        return Vec::new();
    }
    let min_samples = min_samples.max(1);

    let neighbors = radius_neighbors(points, eps);

    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    let forest = ClusterForest::with_len(n);
    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if j != i && is_core[j] {
                    forest.merge(i, j);
                }
            }
        }
    });

    let mut root_to_cluster: BTreeMap<usize, i32> = BTreeMap::new();
    let mut next_cluster_id: i32 = 0;
    let mut labels = vec![NOISE_LABEL; n];

    for i in 0..n {
        if is_core[i] {
            let root = forest.root(i);
            let id = *root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
            labels[i] = id;
        }
    }

    for i in 0..n {
        if is_core[i] {
            continue;
        }
        let nearest_core = neighbors[i]
            .iter()
            .copied()
            .filter(|&j| is_core[j])
            .min_by(|&a, &b| {
                squared_distance(&points[i], &points[a])
                    .total_cmp(&squared_distance(&points[i], &points[b]))
                    .then_with(|| lexicographic(&points[a], &points[b]))
            });
        if let Some(j) = nearest_core {
            labels[i] = labels[j];
        }
    }

    labels
}

/// Cluster sizes and noise count for a labeled point set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSummary {
    /// Rows that took part in clustering.
    pub points: usize,
    /// Size of each cluster, indexed by cluster id.
    pub cluster_sizes: Vec<usize>,
    pub noise: usize,
}

impl ClusterSummary {
    pub fn from_labels(labels: &[i32]) -> Self {
        let n_clusters = labels.iter().copied().max().map_or(0, |m| (m + 1).max(0)) as usize;
        let mut cluster_sizes = vec![0usize; n_clusters];
        let mut noise = 0;
        for &l in labels {
            if l < 0 {
                noise += 1;
            } else {
                cluster_sizes[l as usize] += 1;
            }
        }
        Self {
            points: labels.len(),
            cluster_sizes,
            noise,
        }
    }

    #[inline]
    pub fn n_clusters(&self) -> usize {
        self.cluster_sizes.len()
    }
}

/// Label every positioned row of the table in place.
///
/// Rows without a position are not passed to [`label`] and keep
/// `cluster_id = None`.
pub fn label_table(table: &mut GalaxyTable, config: &ClusteringConfig) -> ClusterSummary {
    let (offsets, points): (Vec<usize>, Vec<[f64; 3]>) = table.positioned().unzip();

    let labels = label(&points, config.eps, config.min_samples);

    let rows = table.rows_mut();
    for row in rows.iter_mut() {
        row.cluster_id = None;
    }
    for (&offset, &l) in offsets.iter().zip(labels.iter()) {
        rows[offset].cluster_id = Some(l);
    }

    let summary = ClusterSummary::from_labels(&labels);
    log::info!(
        "dbscan (eps={}, min_samples={}): {} points, {} clusters, {} noise",
        config.eps,
        config.min_samples,
        summary.points,
        summary.n_clusters(),
        summary.noise
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GalaxyRecord;
    use std::collections::HashMap;

    /// Canonical form of a labeling: noise flags plus the partition of the
    /// clustered points, independent of the numeric ids.
    fn partition(labels: &[i32]) -> (Vec<bool>, Vec<Vec<usize>>) {
        let noise = labels.iter().map(|&l| l == NOISE_LABEL).collect();
        let mut groups: HashMap<i32, Vec<usize>> = HashMap::new();
        for (i, &l) in labels.iter().enumerate() {
            if l >= 0 {
                groups.entry(l).or_default().push(i);
            }
        }
        let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
        groups.sort();
        (noise, groups)
    }

    #[test]
    fn test_cluster_forest_merges() {
        let forest = ClusterForest::with_len(6);
        assert_eq!(forest.root(5), 5);

        assert!(forest.merge(4, 1));
        assert!(forest.merge(2, 3));
        assert_eq!(forest.root(1), 4);
        assert_ne!(forest.root(1), forest.root(2));

        assert!(forest.merge(3, 1));
        assert!(!forest.merge(2, 4));
        let root = forest.root(1);
        assert!([2, 3, 4].iter().all(|&i| forest.root(i) == root));
        assert_eq!(forest.root(0), 0);
    }

    #[test]
    fn test_cluster_forest_parallel_chain() {
        let n = 2000;
        let forest = ClusterForest::with_len(n);
        (1..n).into_par_iter().for_each(|i| {
            forest.merge(i - 1, i);
        });
        let root = forest.root(0);
        assert!((0..n).all(|i| forest.root(i) == root));
    }

    #[test]
    fn test_three_close_points_and_outlier() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [0.5, 0.0, 0.0],
            [0.0, 0.5, 0.0],
            [100.0, 0.0, 0.0],
        ];

        let labels = label(&points, 1.0, 3);

        assert!(labels[0] >= 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], NOISE_LABEL);
    }

    #[test]
    fn test_two_separated_clusters() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [100.0, 100.0, 0.0],
            [101.0, 100.0, 0.0],
            [100.0, 101.0, 0.0],
            [101.0, 101.0, 0.0],
        ];

        let labels = label(&points, 5.0, 2);

        assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_eps_boundary_is_inclusive() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        assert_eq!(label(&points, 1.0, 2), vec![0, 0]);
        assert_eq!(label(&points, 0.999, 2), vec![-1, -1]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Chain of three core points, then a point reachable only from the end
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
            [50.0, 0.0, 0.0],
        ];

        let labels = label(&points, 1.0, 3);

        // 0 and 3 have two neighbors each, so they are border points
        assert_eq!(labels[..4], [0, 0, 0, 0]);
        assert_eq!(labels[4], NOISE_LABEL);
    }

    #[test]
    fn test_min_samples_one_links_connected_points() {
        let points = vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [9.0, 0.0, 0.0]];
        assert_eq!(label(&points, 1.0, 1), vec![0, 0, 1]);
        assert_eq!(label(&points, 1.0, 0), vec![0, 0, 1]);
    }

    #[test]
    fn test_duplicate_points() {
        for n in [20, 33, 40, 257] {
            let points = vec![[1.0, 1.0, 1.0]; n];
            let labels = label(&points, 0.1, 5);
            assert!(labels.iter().all(|&l| l == 0), "{} coincident points", n);
        }

        let points = vec![[1.0, 1.0, 1.0]; 4];
        assert_eq!(label(&points, 0.1, 5), vec![NOISE_LABEL; 4]);
    }

    /// O(n^2) reference for the tree-backed neighbor lists.
    fn brute_neighbors(points: &[[f64; 3]], eps: f64) -> Vec<Vec<usize>> {
        points
            .iter()
            .map(|p| {
                (0..points.len())
                    .filter(|&j| squared_distance(p, &points[j]) <= eps * eps)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_points_sharing_an_axis_value() {
        // Every point on the plane x = 0, many on shared y values
        let points: Vec<[f64; 3]> = (0..300)
            .map(|i| [0.0, (i % 17) as f64, 0.1 * i as f64])
            .collect();

        for eps in [1.0, 2.0] {
            assert_eq!(radius_neighbors(&points, eps), brute_neighbors(&points, eps));
        }

        let labels = label(&points, 2.0, 3);
        assert_eq!(labels.len(), 300);
        assert!(labels.iter().all(|&l| l >= 0));
    }

    #[test]
    fn test_grid_with_duplicates_matches_brute_force() {
        let mut points = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                points.push([x as f64, y as f64, 5.0]);
                if (x + y) % 3 == 0 {
                    points.push([x as f64, y as f64, 5.0]);
                }
            }
        }
        for eps in [0.0, 0.5, 1.0, 1.5, 2.0] {
            assert_eq!(radius_neighbors(&points, eps), brute_neighbors(&points, eps));
        }
    }

    #[test]
    fn test_tree_rotation_is_orthonormal() {
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| TREE_ROTATION[i][k] * TREE_ROTATION[j][k]).sum();
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((dot - want).abs() < 1e-12, "rows {} and {}", i, j);
            }
        }
        let (a, b) = ([3.0, -4.0, 12.0], [-1.0, 2.0, 0.5]);
        let d = squared_distance(&a, &b);
        assert!((squared_distance(&rotate(&a), &rotate(&b)) - d).abs() < 1e-9);
    }

    #[test]
    fn test_negative_eps_reaches_nothing() {
        let points = vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]];
        assert_eq!(label(&points, -1.0, 2), vec![NOISE_LABEL; 3]);
        assert_eq!(label(&points, -1.0, 1), vec![NOISE_LABEL; 3]);
        assert_eq!(label(&points, f64::NAN, 1), vec![NOISE_LABEL; 3]);
        assert!(label(&[], -1.0, 1).is_empty());
    }

    #[test]
    fn test_permutation_invariance() {
        // Two dense blobs with a border point between them equidistant
        // from neither, plus scattered noise.
        let mut points = Vec::new();
        for i in 0..6 {
            points.push([i as f64 * 0.3, 0.0, 0.0]);
            points.push([10.0 + i as f64 * 0.3, 0.0, 0.0]);
        }
        points.push([2.9, 0.0, 0.0]);
        points.push([8.6, 0.0, 0.0]);
        points.push([40.0, 40.0, 40.0]);
        points.push([-40.0, 5.0, 3.0]);

        let labels = label(&points, 1.5, 4);
        let expected = partition(&labels);

        // Deterministic shuffles: reverse and a stride permutation
        let n = points.len();
        let orders: Vec<Vec<usize>> = vec![
            (0..n).rev().collect(),
            (0..n).map(|i| (i * 7) % n).collect(),
            (0..n).map(|i| (i * 5 + 3) % n).collect(),
        ];

        for order in orders {
            let mut seen = order.clone();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), n, "order must be a permutation");

            let permuted: Vec<[f64; 3]> = order.iter().map(|&i| points[i]).collect();
            let permuted_labels = label(&permuted, 1.5, 4);

            // Map back to original indices
            let mut restored = vec![0i32; n];
            for (pos, &orig) in order.iter().enumerate() {
                restored[orig] = permuted_labels[pos];
            }
            assert_eq!(partition(&restored), expected);
        }
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let points: Vec<[f64; 3]> = (0..200)
            .map(|i| {
                let t = i as f64;
                [(t * 0.37).sin() * 20.0, (t * 0.11).cos() * 20.0, (t * 0.07).sin() * 5.0]
            })
            .collect();

        let first = label(&points, 2.0, 4);
        for _ in 0..5 {
            assert_eq!(label(&points, 2.0, 4), first);
        }
    }

    #[test]
    fn test_empty_and_single() {
        assert!(label(&[], 1.0, 3).is_empty());
        assert_eq!(label(&[[0.0, 0.0, 0.0]], 5.0, 2), vec![NOISE_LABEL]);
    }

    #[test]
    fn test_cluster_summary() {
        let summary = ClusterSummary::from_labels(&[0, 0, 1, -1, 1, 1, -1]);
        assert_eq!(summary.points, 7);
        assert_eq!(summary.cluster_sizes, vec![2, 3]);
        assert_eq!(summary.noise, 2);
        assert_eq!(summary.n_clusters(), 2);

        assert_eq!(ClusterSummary::from_labels(&[-1, -1]).n_clusters(), 0);
    }

    #[test]
    fn test_label_table_skips_unpositioned_rows() {
        let mut table = GalaxyTable::new();
        for (i, pos) in [
            Some([0.0, 0.0, 0.0]),
            None,
            Some([0.5, 0.0, 0.0]),
            Some([0.0, 0.5, 0.0]),
            Some([100.0, 0.0, 0.0]),
        ]
        .into_iter()
        .enumerate()
        {
            table.push(GalaxyRecord {
                position: pos,
                ..GalaxyRecord::new(i)
            });
        }

        let config = ClusteringConfig {
            eps: 1.0,
            min_samples: 3,
        };
        let summary = label_table(&mut table, &config);

        let ids: Vec<Option<i32>> = table.iter().map(|r| r.cluster_id).collect();
        assert_eq!(ids, vec![Some(0), None, Some(0), Some(0), Some(-1)]);
        assert_eq!(summary.points, 4);
        assert_eq!(summary.noise, 1);
        assert!(table.rows()[4].is_noise());
    }

    #[test]
    fn test_label_table_with_repeated_galaxy() {
        use crate::processors::projection::project;

        // Same RA/Dec/distance returned for 40 queries, plus two strays
        let mut table: GalaxyTable = (0..42)
            .map(|i| GalaxyRecord {
                ra: Some(if i < 40 { 150.0 } else { 10.0 * i as f64 }),
                dec: Some(-20.0),
                distance: Some(35.0),
                ..GalaxyRecord::new(i)
            })
            .collect();
        project(&mut table);

        let config = ClusteringConfig {
            eps: 1.0,
            min_samples: 3,
        };
        let summary = label_table(&mut table, &config);

        assert_eq!(summary.cluster_sizes, vec![40]);
        assert_eq!(summary.noise, 2);
        assert!(table.rows()[..40].iter().all(|r| r.cluster_id == Some(0)));
    }
}
