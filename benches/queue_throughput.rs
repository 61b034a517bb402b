use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use linkcheck_store::{
    DurableStore, HybridQueue, QueueConfig, RebuildError, ResultCache, StoredUrlRow, UrlRecord,
    DEFAULT_CACHE_SIZE,
};

const BATCH_SIZES: &[usize] = &[64, 256, 1024];

fn build_queue(dir: &tempfile::TempDir) -> HybridQueue {
    let path = dir.path().join("bench.sqlite3");
    let store = Arc::new(DurableStore::open(&path).expect("open store"));
    let cache = Arc::new(ResultCache::new(store.clone(), DEFAULT_CACHE_SIZE).expect("open cache"));
    let rebuilder: Box<_> = Box::new(|row: &StoredUrlRow| -> Result<UrlRecord, RebuildError> {
        Ok(UrlRecord::new(row.url.clone(), row.fingerprint.clone()))
    });
    HybridQueue::new(store, cache, rebuilder, QueueConfig::default(), 0, 0)
}

fn put_get_task_done_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_put_get_task_done");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.iter(|| {
                let dir = tempfile::tempdir().expect("tempdir");
                let queue = build_queue(&dir);
                for i in 0..size {
                    let rec = UrlRecord::new(
                        format!("https://example.test/{i}"),
                        Some(format!("fp-{i}")),
                    );
                    queue.put(rec).expect("put");
                }
                for _ in 0..size {
                    let rec = queue.get(Some(Duration::from_secs(5))).expect("get");
                    queue.task_done(&rec).expect("task_done");
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, put_get_task_done_roundtrip);
criterion_main!(benches);
