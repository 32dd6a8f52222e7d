//! Vantage-point tree for range queries over an arbitrary async metric

use crate::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Pairwise distance oracle. Evaluations are suspension points so the
/// metric can consult caches or other I/O while the tree walks.
pub type Metric<P> = Arc<dyn Fn(Arc<P>, Arc<P>) -> BoxFuture<'static, Result<f64>> + Send + Sync>;

/// Options for a range search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Radius around the query point
    pub max_distance: f64,
    /// Order results by ascending distance
    pub sort: bool,
}

struct VpNode<P> {
    point: Arc<P>,
    threshold: f64,
    left: Option<Box<VpNode<P>>>,
    right: Option<Box<VpNode<P>>>,
}

/// Metric-space index partitioning points by distance from vantage points.
///
/// Immutable after build. The metric is assumed symmetric; the triangle
/// inequality is not enforced, so similarity-derived distances that mildly
/// violate it are accepted as an approximation.
pub struct VpTree<P> {
    root: Option<Box<VpNode<P>>>,
    metric: Metric<P>,
    len: usize,
}

impl<P: Send + Sync + 'static> VpTree<P> {
    /// Build a tree over the given points.
    ///
    /// Each node takes the first remaining point as its vantage point and
    /// splits the rest at the median distance: strictly-closer points go
    /// left, the others right. Vantage-point choice affects balance only,
    /// never correctness.
    pub async fn build(points: Vec<Arc<P>>, metric: Metric<P>) -> Result<Self> {
        let len = points.len();
        let root = build_node(points, metric.clone()).await?;
        Ok(Self { root, metric, len })
    }

    /// Number of points in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All points within `max_distance` of the query, with their distances.
    pub async fn search(&self, query: &Arc<P>, options: SearchOptions) -> Result<Vec<(Arc<P>, f64)>> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            search_node(root, query, options.max_distance, &self.metric, &mut results).await?;
        }
        if options.sort {
            results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        Ok(results)
    }
}

fn build_node<P: Send + Sync + 'static>(
    mut points: Vec<Arc<P>>,
    metric: Metric<P>,
) -> BoxFuture<'static, Result<Option<Box<VpNode<P>>>>> {
    Box::pin(async move {
        if points.is_empty() {
            return Ok(None);
        }
        let vantage = points.remove(0);
        if points.is_empty() {
            return Ok(Some(Box::new(VpNode {
                point: vantage,
                threshold: 0.0,
                left: None,
                right: None,
            })));
        }

        let mut measured = Vec::with_capacity(points.len());
        for point in points {
            let distance = metric(vantage.clone(), point.clone()).await?;
            measured.push((point, distance));
        }

        let mut distances: Vec<f64> = measured.iter().map(|(_, d)| *d).collect();
        distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let threshold = distances[distances.len() / 2];

        let mut near = Vec::new();
        let mut far = Vec::new();
        for (point, distance) in measured {
            if distance < threshold {
                near.push(point);
            } else {
                far.push(point);
            }
        }

        let left = build_node(near, metric.clone()).await?;
        let right = build_node(far, metric).await?;
        Ok(Some(Box::new(VpNode { point: vantage, threshold, left, right })))
    })
}

fn search_node<'a, P: Send + Sync + 'static>(
    node: &'a VpNode<P>,
    query: &'a Arc<P>,
    max_distance: f64,
    metric: &'a Metric<P>,
    results: &'a mut Vec<(Arc<P>, f64)>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let distance = metric(query.clone(), node.point.clone()).await?;
        if distance <= max_distance {
            results.push((node.point.clone(), distance));
        }
        if let Some(left) = &node.left {
            if distance - max_distance < node.threshold {
                search_node(left, query, max_distance, metric, results).await?;
            }
        }
        if let Some(right) = &node.right {
            if distance + max_distance >= node.threshold {
                search_node(right, query, max_distance, metric, results).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn scalar_metric() -> Metric<f64> {
        Arc::new(|a: Arc<f64>, b: Arc<f64>| {
            Box::pin(async move { Ok((*a - *b).abs()) }) as BoxFuture<'static, Result<f64>>
        })
    }

    async fn build_scalar(values: &[f64]) -> VpTree<f64> {
        let points = values.iter().map(|&v| Arc::new(v)).collect();
        VpTree::build(points, scalar_metric()).await.unwrap()
    }

    #[tokio::test]
    async fn empty_tree_returns_nothing() {
        let tree = build_scalar(&[]).await;
        assert!(tree.is_empty());
        let hits = tree
            .search(&Arc::new(1.0), SearchOptions { max_distance: 10.0, sort: false })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn finds_points_within_radius() {
        let tree = build_scalar(&[1.0, 2.0, 5.0, 9.0, 10.0]).await;
        assert_eq!(tree.len(), 5);

        let hits = tree
            .search(&Arc::new(1.5), SearchOptions { max_distance: 1.0, sort: true })
            .await
            .unwrap();
        let values: Vec<f64> = hits.iter().map(|(p, _)| **p).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn sorted_results_are_ascending_by_distance() {
        let tree = build_scalar(&[4.0, 0.0, 8.0, 2.0, 6.0]).await;
        let hits = tree
            .search(&Arc::new(5.0), SearchOptions { max_distance: 3.0, sort: true })
            .await
            .unwrap();
        let distances: Vec<f64> = hits.iter().map(|(_, d)| *d).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn duplicate_points_are_all_returned() {
        let tree = build_scalar(&[3.0, 3.0, 3.0, 7.0]).await;
        let hits = tree
            .search(&Arc::new(3.0), SearchOptions { max_distance: 0.0, sort: false })
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Range search must agree exactly with a brute-force scan.
        #[test]
        fn search_matches_brute_force(
            values in prop::collection::vec(0u16..1000, 1..256),
            query in 0u16..1000,
            radius in 0u16..200,
        ) {
            tokio_test::block_on(async {
                let values: Vec<f64> = values.into_iter().map(f64::from).collect();
                let query = f64::from(query);
                let radius = f64::from(radius);

                let tree = build_scalar(&values).await;
                let hits = tree
                    .search(&Arc::new(query), SearchOptions { max_distance: radius, sort: false })
                    .await
                    .unwrap();

                let got: BTreeSet<u64> = hits.iter().map(|(p, _)| **p as u64).collect();
                let expected: BTreeSet<u64> = values
                    .iter()
                    .filter(|&&v| (v - query).abs() <= radius)
                    .map(|&v| v as u64)
                    .collect();
                prop_assert_eq!(got, expected);

                // Counts must match too, so duplicates are neither lost nor invented
                let got_count = hits.len();
                let expected_count = values.iter().filter(|&&v| (v - query).abs() <= radius).count();
                prop_assert_eq!(got_count, expected_count);
                Ok(())
            })?;
        }
    }
}
