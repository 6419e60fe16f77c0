use nearing::{IndexParams, ProgressiveIndex, ResultSet, SearchParams, VecSource, L2};
use nearing::PointSource;

#[test]
fn test_points_stream_in_batches() {
    let source = VecSource::random(500, 2).unwrap();
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();

    let mut total = 0;
    while index.points_pending() > 0 {
        let added = index.add_points(7);
        assert!(added <= 7);
        total += added;
        assert_eq!(index.points_indexed(), total);

        let counts = index.compute_count_distribution();
        let held: usize = counts.values().sum();
        assert_eq!(held, total, "tree holds {} of {} streamed points", held, total);
    }
    assert_eq!(total, 500);
    assert_eq!(index.add_points(7), 0);
}

#[test]
fn test_single_point_index_answers_queries() {
    let mut source = VecSource::new(3).unwrap();
    source.feed(&[0.25, 0.5, 0.75]);
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
    assert_eq!(index.add_points(10), 1);

    let mut results: Vec<ResultSet> = Vec::new();
    index
        .knn_search(&[0.0, 0.0, 0.0], &mut results, 3, &SearchParams::exact(1))
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 1, "only one point exists to return");
    assert_eq!(results[0][0].id, 0);
}

#[test]
fn test_every_streamed_point_stays_findable() {
    let source = VecSource::random(300, 2).unwrap();
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();

    while index.add_points(13) > 0 {
        // Re-querying an indexed point must hit distance zero
        let target = index.points_indexed() / 2;
        let query = index.source().point(target).to_vec();

        let mut results: Vec<ResultSet> = Vec::new();
        index
            .knn_search(&query, &mut results, 1, &SearchParams::exact(1))
            .unwrap();
        assert_eq!(
            results[0][0].dist, 0.0,
            "point {} drifted away mid-stream",
            target
        );
    }
}

#[test]
fn test_sorted_feed_skews_the_root() {
    let mut source = VecSource::new(1).unwrap();
    for i in 0..400 {
        source.feed(&[i as f32]);
    }
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();

    // Insertion alone never restructures, so under sorted input the root
    // ratio can only drift up
    let mut last_root = 0.0f32;
    for _ in 0..400 {
        index.add_points(1);
        let levels = index.recompute_imbalances();
        if let Some(&root) = levels.first() {
            assert!(
                root >= last_root,
                "root ratio fell from {} to {} without maintenance",
                last_root,
                root
            );
            last_root = root;
        }
    }
    assert!(
        last_root > 1.2,
        "sorted input left the root at {}, expected a clear skew",
        last_root
    );
}

#[test]
fn test_maintenance_preserves_the_point_set() {
    let mut source = VecSource::new(1).unwrap();
    for i in 0..500 {
        source.feed(&[i as f32]);
    }
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
    index.add_points(500);

    let spent = index.update(1 << 20);
    assert!(spent > 0, "a fully sorted feed must leave work to do");

    let counts = index.compute_count_distribution();
    let held: usize = counts.values().sum();
    assert_eq!(held, 500);
    assert_eq!(index.points_indexed(), 500);

    // Every original point is still reachable under its own id
    for target in [0usize, 7, 249, 499] {
        let query = [target as f32];
        let mut results: Vec<ResultSet> = Vec::new();
        index
            .knn_search(&query, &mut results, 1, &SearchParams::exact(1))
            .unwrap();
        assert_eq!(results[0][0].id, target);
        assert_eq!(results[0][0].dist, 0.0);
    }
}

#[test]
fn test_flat_index_reports_no_levels() {
    let mut source = VecSource::new(2).unwrap();
    source.feed(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
    index.add_points(3);

    assert_eq!(index.compute_max_depth(), 0);
    assert!(index.recompute_imbalances().is_empty());
    assert!(index.cached_imbalances().is_empty());
}
