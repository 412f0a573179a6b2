// SPDX-License-Identifier: MIT

use criterion::{criterion_group, criterion_main, Criterion};

use sofsfs::{DiskLayout, Identity, InodeType, Sofs, SofsFormatter};
use sofsio::prelude::*;

fn bench_cluster_alloc_free(c: &mut Criterion) {
    const BLOCKS: usize = 4 * 256 + 4;
    let layout = DiskLayout::compute((BLOCKS * BLOCK_SIZE) as u64, 8).unwrap();

    let mut base = vec![0u8; BLOCKS * BLOCK_SIZE];
    {
        let mut dev = MemDev::new(&mut base).unwrap();
        SofsFormatter::new(&mut dev, &layout, "bench", Identity::ROOT)
            .format(false)
            .unwrap();
    }

    c.bench_function("alloc_free_cycle_30", |b| {
        let mut img = base.clone();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let n = fs.alloc_inode(InodeType::Regular).unwrap();

        // three cache lengths per iteration, so every round crosses the
        // replenish and deplete boundaries
        b.iter(|| {
            for idx in 0..30u32 {
                fs.alloc_cluster_at(n, idx).unwrap();
            }
            for idx in (0..30u32).rev() {
                fs.free_clean_cluster_at(n, idx).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_cluster_alloc_free);
criterion_main!(benches);
