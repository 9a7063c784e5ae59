use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use xqvm::datamodel::tree::{attr, doc, elem, text};
use xqvm::datamodel::{AtomicValue, Item, NodeData, SequencePointable, Value};

fn sample_sequence(n: i64) -> Value {
    Value::Sequence(
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Value::Atomic(AtomicValue::integer(i))
                } else {
                    Value::Atomic(AtomicValue::string(format!("item-{i}")))
                }
            })
            .collect(),
    )
}

fn sample_document(sections: usize) -> NodeData {
    let root = (0..sections).fold(elem("root").attr(attr("lang", "en")), |root, s| {
        let section = (0..10).fold(elem("section").attr(attr("name", &format!("s{s}"))), |section, i| {
            section.child(
                elem("item")
                    .attr(attr("id", &format!("item-{s}-{i}")))
                    .child(text(&format!("Item {i} of section {s}"))),
            )
        });
        root.child(section)
    });
    doc().child(root).build()
}

fn benchmark_sequences(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/sequence");
    for n in [16, 256, 4096] {
        let value = sample_sequence(n);
        group.bench_with_input(BenchmarkId::new("encode", n), &value, |b, v| {
            b.iter(|| black_box(v.to_tagged().expect("encode")));
        });
        let encoded = value.to_tagged().expect("encode");
        group.bench_with_input(BenchmarkId::new("scan", n), &encoded, |b, v| {
            b.iter(|| {
                let seq = SequencePointable::new(&v.pointable()).expect("sequence");
                let mut total = 0usize;
                for entry in seq.iter() {
                    total += entry.expect("entry").len();
                }
                black_box(total)
            });
        });
    }
    group.finish();
}

fn benchmark_trees(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/tree");
    for sections in [4, 64] {
        let node = Value::Node(sample_document(sections));
        group.bench_with_input(BenchmarkId::new("build", sections), &node, |b, v| {
            b.iter(|| black_box(v.to_tagged().expect("build")));
        });
        let tree = node.to_tagged().expect("build");
        group.bench_with_input(BenchmarkId::new("string_value", sections), &tree, |b, t| {
            b.iter(|| {
                let item = Item::from_value(t.clone()).expect("node");
                black_box(item.as_node().expect("node").string_value().expect("string"))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_sequences, benchmark_trees);
criterion_main!(benches);
