use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use idxtree_common::{
    leaf::NullifierLeaf, preimage::NullifierLeafPreimage, test_utils::random_nullifier_leaves,
};
use idxtree_tree::indexed_tree::IndexedTree;
use rand::{SeedableRng, rngs::StdRng};

const TREE_HEIGHT: usize = 20;

fn setup_tree(initial_batches: usize, subtree_height: usize) -> IndexedTree<NullifierLeafPreimage> {
    let mut rng = StdRng::seed_from_u64(42);
    let batch_size = 1 << subtree_height;
    let mut tree = IndexedTree::new_prefilled(TREE_HEIGHT, batch_size as u64 * 2)
        .expect("valid tree height");
    for _ in 0..initial_batches {
        let leaves = random_nullifier_leaves(batch_size, &mut rng);
        tree.batch_insert(&leaves, subtree_height).expect("batch insert");
    }
    tree
}

fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for subtree_height in [4usize, 6, 8] {
        let tree = setup_tree(16, subtree_height);
        let mut rng = StdRng::seed_from_u64(7);

        group.bench_with_input(
            BenchmarkId::new("plan_and_commit", 1 << subtree_height),
            &subtree_height,
            |b, &subtree_height| {
                b.iter_batched(
                    || {
                        let leaves: Vec<NullifierLeaf> =
                            random_nullifier_leaves(1 << subtree_height, &mut rng);
                        (tree.clone(), leaves)
                    },
                    |(mut tree, leaves)| tree.batch_insert(&leaves, subtree_height),
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_sequential_insert(c: &mut Criterion) {
    let tree = setup_tree(16, 6);
    let mut rng = StdRng::seed_from_u64(9);

    c.bench_function("sequential_insert_64", |b| {
        b.iter_batched(
            || (tree.clone(), random_nullifier_leaves(64, &mut rng)),
            |(mut tree, leaves)| {
                for leaf in leaves {
                    tree.insert(leaf).expect("insert");
                }
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_batch_insert, bench_sequential_insert);
criterion_main!(benches);
