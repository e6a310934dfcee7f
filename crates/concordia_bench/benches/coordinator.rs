//! Message path benchmarks.

use concordia_bench::payload;
use concordia_coordinator::{
    BoxError, Coordinator, CoordinatorConfig, HistoryReader, Message, Origin, Policy,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

struct AcceptAll;

impl Policy for AcceptAll {
    fn should_process(&self, message: &Message, history: &dyn HistoryReader) -> bool {
        !history.contains(message.id)
    }

    fn process(&self, _message: &Message, _origin: Origin) -> Result<(), BoxError> {
        Ok(())
    }
}

fn bench_handle_new_message(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let config = CoordinatorConfig::new(dir.path())
        .without_signals()
        .with_sync_on_write(false);

    let running = runtime
        .block_on(Coordinator::builder(config, AcceptAll).build().start())
        .unwrap();
    let handle = running.handle();
    let body = payload(128);
    let mut id = 0u64;

    let mut group = c.benchmark_group("coordinator");
    group.sample_size(20);

    group.bench_function("handle_new_message", |b| {
        b.iter(|| {
            id += 1;
            let digest = handle
                .handle_new_message(black_box(Message::new(id, body.clone())))
                .unwrap();
            black_box(digest);
            black_box(handle.dequeue_pending().unwrap());
        });
    });

    group.bench_function("handle_remote_message_skipped", |b| {
        let seen = Message::new(1, body.clone());
        b.iter(|| {
            black_box(handle.handle_remote_message(black_box(seen.clone())).unwrap());
        });
    });

    group.finish();
    runtime.block_on(running.stop());
}

criterion_group!(benches, bench_handle_new_message);
criterion_main!(benches);
