use name_blocking::{
    build_blocks, recall, BlockingPolicy, Dataset, GroundTruth, Metric, NameParts, NamePartIndex,
    SimilarityScorer,
};
use proptest::prelude::*;

// Assignment scoring is cubic per candidate; keep the default run small.
// Soak: PROPTEST_CASES=5000 cargo test --release --test properties
fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn name_parts() -> impl Strategy<Value = NameParts> {
    prop::collection::btree_map(
        prop::sample::select(vec!["given-name", "surname", "middle-name", "patronymic"]),
        "[a-e]{1,6}",
        0..4,
    )
    .prop_map(NameParts::from_pairs)
}

fn dataset(max_len: usize) -> impl Strategy<Value = Dataset> {
    prop::collection::vec(name_parts(), 1..max_len).prop_map(Dataset::from_parts)
}

fn filling_policy(choice: u8, block_size: usize) -> BlockingPolicy {
    match choice % 3 {
        0 => BlockingPolicy::MaxScoreTopK { block_size },
        1 => BlockingPolicy::NormalizedSumTopK { block_size },
        _ => BlockingPolicy::AssignmentTopK { block_size },
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn index_covers_every_part(reference in dataset(12)) {
        let index = NamePartIndex::build(&reference);
        for record in reference.records() {
            let Some(parts) = &record.name_parts else { continue };
            for value in parts.values() {
                let bucket = index.get(value).unwrap_or(&[]);
                prop_assert!(bucket.contains(&record.id));
            }
        }
    }

    #[test]
    fn top_k_blocks_have_exact_size(
        query in dataset(8),
        reference in dataset(10),
        block_size in 1_usize..12,
        choice in any::<u8>(),
    ) {
        let policy = filling_policy(choice, block_size);
        let blocks = build_blocks(&query, &reference, policy, false).unwrap();
        prop_assert_eq!(blocks.len(), query.len());
        for (_, block) in blocks.iter() {
            prop_assert_eq!(block.len(), block_size.min(reference.len()));
        }
    }

    #[test]
    fn same_dataset_never_blocks_self(
        data in dataset(10),
        block_size in 1_usize..12,
        choice in any::<u8>(),
    ) {
        let policy = filling_policy(choice, block_size);
        let blocks = build_blocks(&data, &data, policy, true).unwrap();
        for (query, block) in blocks.iter() {
            prop_assert!(!block.contains(&query));
            prop_assert_eq!(block.len(), block_size.min(data.len() - 1));
        }
    }

    #[test]
    fn threshold_count_respects_block_size(
        data in dataset(10),
        block_size in 1_usize..6,
        threshold in 0.0_f64..=1.0,
    ) {
        let policy = BlockingPolicy::ThresholdCountTopK { block_size, similarity_threshold: threshold };
        let blocks = build_blocks(&data, &data, policy, true).unwrap();
        for (query, block) in blocks.iter() {
            prop_assert!(block.len() <= block_size);
            prop_assert!(!block.contains(&query));
        }
    }

    #[test]
    fn larger_blocks_extend_smaller_ones(
        query in dataset(6),
        reference in dataset(10),
        small in 1_usize..5,
        extra in 0_usize..5,
        choice in any::<u8>(),
    ) {
        let narrow = build_blocks(&query, &reference, filling_policy(choice, small), false).unwrap();
        let wide =
            build_blocks(&query, &reference, filling_policy(choice, small + extra), false).unwrap();
        for (query_id, block) in narrow.iter() {
            let wider = wide.get(query_id).unwrap();
            prop_assert!(wider.starts_with(block));
        }

        let truth = GroundTruth::from_pairs(
            query.ids().zip(reference.ids().cycle()),
        );
        prop_assert!(recall(&wide, &truth).unwrap() >= recall(&narrow, &truth).unwrap());
    }

    #[test]
    fn jaro_winkler_identity_and_symmetry(a in "\\PC{0,12}", b in "\\PC{0,12}") {
        let metric = Metric::JaroWinkler;
        if !a.is_empty() {
            prop_assert!((metric.similarity(&a, &a) - 1.0).abs() < 1e-9);
        }
        let ab = metric.similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - metric.similarity(&b, &a)).abs() < 1e-9);
    }
}
