use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cowrite::document::{doc_id_for_room, DocumentStore, Edit, TextOp};
use cowrite::protocol::WireMessage;
use uuid::Uuid;

fn bench_ops_encode(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let doc = doc_id_for_room("bench");
    let mut store = DocumentStore::new(doc, peer);
    let ops = store
        .apply_local(Edit::Insert {
            pos: 0,
            text: "typical edit".to_string(),
        })
        .ops;

    c.bench_function("ops_encode_12ch", |b| {
        b.iter(|| {
            let msg = WireMessage::ops(
                black_box(peer),
                black_box(doc),
                black_box(store.clock()),
                black_box(&ops),
            )
            .unwrap();
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_ops_decode(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let doc = doc_id_for_room("bench");
    let mut store = DocumentStore::new(doc, peer);
    let ops = store
        .apply_local(Edit::Insert {
            pos: 0,
            text: "typical edit".to_string(),
        })
        .ops;
    let encoded = WireMessage::ops(peer, doc, store.clock(), &ops)
        .unwrap()
        .encode()
        .unwrap();

    c.bench_function("ops_decode_12ch", |b| {
        b.iter(|| {
            black_box(WireMessage::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_local_typing(c: &mut Criterion) {
    let doc = doc_id_for_room("bench");

    c.bench_function("local_insert_1k_chars", |b| {
        b.iter(|| {
            let mut store = DocumentStore::new(doc, Uuid::new_v4());
            for i in 0..1000 {
                store.apply_local(Edit::Insert {
                    pos: i,
                    text: "x".to_string(),
                });
            }
            black_box(store.visible_len());
        })
    });
}

fn bench_remote_apply(c: &mut Criterion) {
    let doc = doc_id_for_room("bench");
    let mut source = DocumentStore::new(doc, Uuid::new_v4());
    let mut ops: Vec<TextOp> = Vec::with_capacity(1000);
    for i in 0..1000 {
        ops.extend(
            source
                .apply_local(Edit::Insert {
                    pos: i,
                    text: "x".to_string(),
                })
                .ops,
        );
    }

    c.bench_function("remote_apply_1k_ops", |b| {
        b.iter(|| {
            let mut replica = DocumentStore::new(doc, Uuid::new_v4());
            for op in &ops {
                replica.apply_remote(*op);
            }
            black_box(replica.visible_len());
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let doc = doc_id_for_room("bench");
    let mut store = DocumentStore::new(doc, Uuid::new_v4());
    let text: String = "lorem ipsum dolor sit amet ".repeat(40);
    store.apply_local(Edit::Insert { pos: 0, text });

    c.bench_function("snapshot_1k_doc", |b| {
        b.iter(|| {
            black_box(store.snapshot());
        })
    });
}

fn bench_diff_since(c: &mut Criterion) {
    let doc = doc_id_for_room("bench");
    let mut ahead = DocumentStore::new(doc, Uuid::new_v4());
    let behind = DocumentStore::new(doc, Uuid::new_v4());
    for i in 0..1000 {
        ahead.apply_local(Edit::Insert {
            pos: i,
            text: "x".to_string(),
        });
    }

    c.bench_function("diff_since_1k_behind", |b| {
        b.iter(|| {
            black_box(ahead.diff_since(black_box(behind.version())));
        })
    });
}

criterion_group!(
    benches,
    bench_ops_encode,
    bench_ops_decode,
    bench_local_typing,
    bench_remote_apply,
    bench_snapshot,
    bench_diff_since
);
criterion_main!(benches);
