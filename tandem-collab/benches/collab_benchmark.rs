use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_collab::{
    Awareness, AwarenessUpdate, BindRequest, CursorRange, MemoryHub, OfflineQueue, PresenceState,
    Provider, SessionId, SharedReplica, UserProfile, DEFAULT_FIELD,
};
use yrs::{XmlFragment, XmlTextPrelim};

fn typed_replica(paragraphs: usize) -> SharedReplica {
    let replica = SharedReplica::new(DEFAULT_FIELD);
    for i in 0..paragraphs {
        replica.apply_local(|txn, fragment| {
            let at = fragment.len(&*txn);
            fragment.insert(txn, at, XmlTextPrelim::new(format!("paragraph {i}")));
        });
    }
    replica
}

fn bench_local_edit(c: &mut Criterion) {
    let replica = SharedReplica::new(DEFAULT_FIELD);

    c.bench_function("replica_local_edit", |b| {
        b.iter(|| {
            replica.apply_local(|txn, fragment| {
                fragment.insert(txn, 0, XmlTextPrelim::new(black_box("x")));
            });
        })
    });
}

fn bench_merge_full_state(c: &mut Criterion) {
    let source = typed_replica(200);
    let update = source.encode_state_as_update();

    c.bench_function("replica_merge_200_paragraphs", |b| {
        b.iter(|| {
            let target = SharedReplica::new(DEFAULT_FIELD);
            target.merge_remote(black_box(&update)).unwrap();
            black_box(target.len());
        })
    });
}

fn bench_encode_diff(c: &mut Criterion) {
    let a = typed_replica(200);
    let b_replica = SharedReplica::new(DEFAULT_FIELD);
    b_replica.merge_remote(&a.encode_state_as_update()).unwrap();
    a.apply_local(|txn, fragment| {
        fragment.insert(txn, 0, XmlTextPrelim::new("new"));
    });
    let sv = b_replica.state_vector();

    c.bench_function("replica_encode_diff", |b| {
        b.iter(|| black_box(a.encode_diff(black_box(&sv)).unwrap()))
    });
}

fn bench_awareness_encode(c: &mut Criterion) {
    let update = AwarenessUpdate {
        session: SessionId::random(),
        clock: 42,
        state: Some(PresenceState {
            user: Some(UserProfile::new("TestUser", "#87CEFA")),
            cursor: Some(CursorRange::new(10, 20)),
        }),
    };
    let encoded = update.encode().unwrap();

    c.bench_function("awareness_encode", |b| {
        b.iter(|| black_box(black_box(&update).encode().unwrap()))
    });
    c.bench_function("awareness_decode", |b| {
        b.iter(|| black_box(AwarenessUpdate::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_awareness_apply_100_peers(c: &mut Criterion) {
    let updates: Vec<AwarenessUpdate> = (0..100)
        .map(|i| AwarenessUpdate {
            session: SessionId::new(format!("peer-{i:03}")),
            clock: 1,
            state: Some(PresenceState {
                user: Some(UserProfile::new(format!("Peer{i}"), "#FFD700")),
                cursor: Some(CursorRange::caret(i)),
            }),
        })
        .collect();

    c.bench_function("awareness_apply_100_peers", |b| {
        b.iter(|| {
            let mut awareness = Awareness::new(SessionId::new("local"));
            for update in &updates {
                black_box(awareness.apply(update));
            }
            black_box(awareness.participants());
        })
    });
}

fn bench_offline_queue(c: &mut Criterion) {
    c.bench_function("offline_queue_1000_ops", |b| {
        b.iter(|| {
            let mut queue = OfflineQueue::new(10_000);
            for _ in 0..1000 {
                queue.enqueue(vec![0u8; 64]);
            }
            black_box(queue.drain());
        })
    });
}

fn bench_hub_fanout(c: &mut Criterion) {
    let hub = MemoryHub::new();
    let room = BindRequest::document("bench");
    let handles: Vec<_> = (0..10).map(|_| hub.bind(&room).unwrap()).collect();

    c.bench_function("hub_fanout_10_peers", |b| {
        b.iter(|| {
            handles[0].replica().apply_local(|txn, fragment| {
                fragment.insert(txn, 0, XmlTextPrelim::new(black_box("k")));
            });
        })
    });
}

criterion_group!(
    benches,
    bench_local_edit,
    bench_merge_full_state,
    bench_encode_diff,
    bench_awareness_encode,
    bench_awareness_apply_100_peers,
    bench_offline_queue,
    bench_hub_fanout,
);
criterion_main!(benches);
