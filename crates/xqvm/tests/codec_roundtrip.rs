use proptest::prelude::*;
use rstest::rstest;
use xqvm::builders::{NodeTreeOptions, write_tree};
use xqvm::datamodel::tree::{attr, attr_typed, comment, doc, elem, elem_ns, pi, text};
use xqvm::datamodel::{AtomicValue, NodeData, SequencePointable, Value, ValueTag};
use xqvm::names::QName;

fn roundtrip(v: &Value) -> Value {
    let encoded = v.to_tagged().expect("encode");
    Value::decode_value(&encoded).expect("decode")
}

#[rstest]
#[case::empty_sequence(Value::empty())]
#[case::singleton(Value::Atomic(AtomicValue::integer(42)))]
#[case::multi_item(Value::Sequence(vec![
    Value::Atomic(AtomicValue::integer(1)),
    Value::Atomic(AtomicValue::string("two")),
    Value::Atomic(AtomicValue::Boolean(false)),
    Value::Atomic(AtomicValue::Double(2.5)),
]))]
#[case::nested_json(Value::Object(vec![
    ("a".into(), Value::Array(vec![Value::Atomic(AtomicValue::integer(1)), Value::empty()])),
    ("b".into(), Value::Atomic(AtomicValue::untyped("x"))),
]))]
fn values_roundtrip(#[case] v: Value) {
    assert_eq!(roundtrip(&v), v);
}

#[rstest]
#[case::plain_element(elem("root").build())]
#[case::with_namespaces(
    elem_ns("urn:a", "p:root")
        .namespace("p", "urn:a")
        .namespace("q", "urn:b")
        .child(elem_ns("urn:b", "q:inner").build())
        .build()
)]
#[case::attributes(elem("e").attr(attr("id", "7")).attr(attr("class", "x y")).build())]
#[case::typed_attribute_value(elem("e").attr(attr_typed("n", AtomicValue::integer(3))).build())]
#[case::mixed_children(
    elem("e")
        .child(text("a"))
        .child(comment("c"))
        .child(pi("target", "data"))
        .child(elem("f").child(text("b")))
        .build()
)]
#[case::document(doc().child(elem("root").child(text("hello"))).build())]
fn nodes_roundtrip(#[case] node: NodeData) {
    let v = Value::Node(node);
    assert_eq!(roundtrip(&v), v);
}

#[rstest]
fn attribute_type_annotation_survives_with_types() {
    let mut a = attr("id", "7");
    a.type_name = Some(QName::ns(xqvm::consts::XS, "ID"));
    let node = elem("e").attr(a).build();
    let options = NodeTreeOptions {
        types: true,
        ..NodeTreeOptions::default()
    };
    let tree = write_tree(&node, &options, None).unwrap();
    let Value::Node(decoded) = Value::decode_value(&tree).unwrap() else {
        panic!("expected a node");
    };
    let decoded_type = decoded.attributes[0].type_name.as_ref().unwrap();
    assert_eq!(decoded_type.local, "ID");
    assert_eq!(decoded_type.uri, xqvm::consts::XS);
}

#[rstest]
fn attribute_without_type_has_none() {
    let node = elem("e").attr(attr("id", "7")).build();
    let Value::Node(decoded) = roundtrip(&Value::Node(node)) else {
        panic!("expected a node");
    };
    assert_eq!(decoded.attributes[0].type_name, None);
}

#[rstest]
#[case(Value::Atomic(AtomicValue::integer(1)))]
#[case(Value::Atomic(AtomicValue::string("a")))]
#[case(Value::Array(vec![Value::Atomic(AtomicValue::integer(1))]))]
#[case(Value::Node(elem("e").build()))]
fn singleton_sequence_is_its_item(#[case] item: Value) {
    let single = Value::Sequence(vec![item.clone()]).to_tagged().unwrap();
    let bare = item.to_tagged().unwrap();
    assert_eq!(single.as_bytes(), bare.as_bytes());
    assert_ne!(single.tag(), ValueTag::Sequence);
}

#[rstest]
fn one_a_empty_is_two_entries() {
    let v = Value::Sequence(vec![
        Value::Atomic(AtomicValue::integer(1)),
        Value::Atomic(AtomicValue::string("a")),
        Value::empty(),
    ])
    .to_tagged()
    .unwrap();
    assert_eq!(v.tag(), ValueTag::Sequence);
    let seq = SequencePointable::new(&v.pointable()).unwrap();
    assert_eq!(seq.entry_count(), 2);
    assert_eq!(AtomicValue::decode(&seq.entry(0).unwrap()).unwrap(), AtomicValue::integer(1));
    assert_eq!(AtomicValue::decode(&seq.entry(1).unwrap()).unwrap(), AtomicValue::string("a"));
}

fn atomic_strategy() -> impl Strategy<Value = AtomicValue> {
    prop_oneof![
        any::<i64>().prop_map(AtomicValue::integer),
        "[a-z]{0,24}".prop_map(AtomicValue::string),
        any::<bool>().prop_map(AtomicValue::Boolean),
    ]
}

proptest! {
    #[test]
    fn slots_increase_to_data_length(items in prop::collection::vec(atomic_strategy(), 2..40)) {
        let v = Value::Sequence(items.iter().cloned().map(Value::Atomic).collect()).to_tagged().unwrap();
        let seq = SequencePointable::new(&v.pointable()).unwrap();
        prop_assert_eq!(seq.entry_count(), items.len());
        let mut previous = 0;
        for i in 0..seq.entry_count() {
            let slot = seq.slot(i).unwrap();
            prop_assert!(slot > previous, "slot {} not after {}", slot, previous);
            previous = slot;
        }
        prop_assert_eq!(previous, seq.data_len());
        for (i, expected) in items.iter().enumerate() {
            prop_assert_eq!(&AtomicValue::decode(&seq.entry(i).unwrap()).unwrap(), expected);
        }
    }
}
