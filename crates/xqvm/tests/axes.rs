use proptest::prelude::*;
use rstest::{fixture, rstest};
use std::cmp::Ordering;
use xqvm::datamodel::tree::{attr, doc, elem, text};
use xqvm::datamodel::{Item, NodeData, NodeKind, NodeRef, Value};
use xqvm::runtime::functions::LocalVariable;
use xqvm::runtime::paths::sort_distinct;
use xqvm::runtime::{
    Axis, AxisStep, Binding, DynamicContext, Frame, NameTest, NodeTest, RegisterAllocator, RuntimeIterator,
    SortDistinctNodes, drain_items,
};
use xqvm::{ErrorCode, TaggedValue};

fn encode(node: NodeData) -> NodeRef {
    let tree = Value::Node(node).to_tagged().unwrap();
    Item::from_value(tree).unwrap().as_node().cloned().unwrap()
}

fn label(node: &NodeRef, ctx: &DynamicContext) -> String {
    match node.kind() {
        NodeKind::Document => "#doc".to_owned(),
        NodeKind::Text => format!("'{}'", node.string_value().unwrap()),
        NodeKind::Attribute => format!("@{}", node.name(ctx.name_cache()).unwrap().unwrap().local),
        _ => node.name(ctx.name_cache()).unwrap().unwrap().local.to_string(),
    }
}

/// Runs `axis::test` from `context` and labels the result nodes.
fn step(ctx: &DynamicContext, context: &NodeRef, axis: Axis, test: NodeTest) -> Vec<String> {
    let mut alloc = RegisterAllocator::new();
    let var = alloc.local::<Binding>();
    let input = Box::new(LocalVariable::new(&mut alloc, var));
    let it = AxisStep::new(&mut alloc, input, axis, test);
    let mut frame = Frame::new(ctx, alloc.local_count(), alloc.global_count());
    var.set(&mut frame, vec![Item::Node(context.clone())]);
    drain_items(&it, &mut frame)
        .unwrap()
        .iter()
        .map(|i| label(i.as_node().unwrap(), ctx))
        .collect()
}

/// `<root id="r"><a><b/>t<c/></a><d/></root>`
#[fixture]
fn document() -> NodeRef {
    encode(
        doc()
            .child(
                elem("root")
                    .attr(attr("id", "r"))
                    .child(elem("a").child(elem("b")).child(text("t")).child(elem("c")))
                    .child(elem("d")),
            )
            .build(),
    )
}

fn find(node: &NodeRef, path: &[usize]) -> NodeRef {
    path.iter()
        .fold(node.clone(), |n, &i| n.children().unwrap()[i].clone())
}

#[rstest]
#[case::child(&[0], Axis::Child, NodeTest::AnyKind, &["a", "d"])]
#[case::descendant(&[0], Axis::Descendant, NodeTest::AnyKind, &["a", "b", "'t'", "c", "d"])]
#[case::descendant_or_self(&[0, 0], Axis::DescendantOrSelf, NodeTest::Kind(NodeKind::Element), &["a", "b", "c"])]
#[case::attribute(&[0], Axis::Attribute, NodeTest::AnyKind, &["@id"])]
#[case::attribute_by_name(&[0], Axis::Attribute, NodeTest::Name(NameTest::local("nope")), &[])]
#[case::self_axis(&[0, 0], Axis::SelfAxis, NodeTest::Name(NameTest::local("a")), &["a"])]
#[case::parent(&[0, 0, 0], Axis::Parent, NodeTest::AnyKind, &["a"])]
#[case::ancestor(&[0, 0, 0], Axis::Ancestor, NodeTest::AnyKind, &["a", "root", "#doc"])]
#[case::ancestor_or_self(&[0, 0, 2], Axis::AncestorOrSelf, NodeTest::Kind(NodeKind::Element), &["c", "a", "root"])]
#[case::following_sibling(&[0, 0, 0], Axis::FollowingSibling, NodeTest::AnyKind, &["'t'", "c"])]
#[case::preceding_sibling(&[0, 0, 2], Axis::PrecedingSibling, NodeTest::AnyKind, &["'t'", "b"])]
#[case::name_on_child(&[0, 0], Axis::Child, NodeTest::Name(NameTest::any()), &["b", "c"])]
#[case::text_kind(&[0, 0], Axis::Child, NodeTest::Kind(NodeKind::Text), &["'t'"])]
fn axis_steps(
    document: NodeRef,
    #[case] path: &[usize],
    #[case] axis: Axis,
    #[case] test: NodeTest,
    #[case] expected: &[&str],
) {
    let ctx = DynamicContext::default();
    let context = find(&document, path);
    assert_eq!(step(&ctx, &context, axis, test), expected);
}

#[rstest]
fn attributes_have_no_siblings(document: NodeRef) {
    let ctx = DynamicContext::default();
    let id = find(&document, &[0]).attributes().unwrap()[0].clone();
    assert!(step(&ctx, &id, Axis::FollowingSibling, NodeTest::AnyKind).is_empty());
    assert_eq!(step(&ctx, &id, Axis::Parent, NodeTest::AnyKind), ["root"]);
}

#[rstest]
#[case::first(0, 0, 199)]
#[case::middle(100, 100, 99)]
#[case::last(199, 199, 0)]
fn siblings_of_wide_parent(#[case] at: usize, #[case] preceding: usize, #[case] following: usize) {
    let ctx = DynamicContext::default();
    let root = (0..200).fold(elem("root"), |e, i| e.child(elem(&format!("e{i}"))));
    let root = encode(root.build());
    assert_eq!(root.child_count().unwrap(), 200);
    let node = root.child(at).unwrap();
    assert_eq!(node.child_index().unwrap(), Some(at));

    let before = step(&ctx, &node, Axis::PrecedingSibling, NodeTest::AnyKind);
    assert_eq!(before.len(), preceding);
    if let Some(nearest) = before.first() {
        assert_eq!(*nearest, format!("e{}", at - 1));
    }
    let after = step(&ctx, &node, Axis::FollowingSibling, NodeTest::AnyKind);
    assert_eq!(after.len(), following);
    if let Some(next) = after.first() {
        assert_eq!(*next, format!("e{}", at + 1));
    }
}

#[rstest]
fn roots_and_attributes_have_no_child_index(document: NodeRef) {
    assert_eq!(document.child_index().unwrap(), None);
    let id = find(&document, &[0]).attribute(0).unwrap();
    assert_eq!(id.child_index().unwrap(), None);
    assert_eq!(find(&document, &[0, 1]).child_index().unwrap(), Some(1));
}

#[rstest]
fn descendant_step_stops_early(document: NodeRef) {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let var = alloc.local::<Binding>();
    let input = Box::new(LocalVariable::new(&mut alloc, var));
    let it = AxisStep::new(&mut alloc, input, Axis::Descendant, NodeTest::AnyKind);
    let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
    var.set(&mut frame, vec![Item::Node(document)]);
    it.open(&mut frame).unwrap();
    let first = it.next(&mut frame).unwrap().unwrap();
    let second = it.next(&mut frame).unwrap().unwrap();
    it.close(&mut frame);
    assert_eq!(label(first.as_node().unwrap(), &ctx), "root");
    assert_eq!(label(second.as_node().unwrap(), &ctx), "a");
}

#[rstest]
fn axis_over_atomic_requires_a_node() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let var = alloc.local::<Binding>();
    let input = Box::new(LocalVariable::new(&mut alloc, var));
    let it = AxisStep::new(&mut alloc, input, Axis::Child, NodeTest::AnyKind);
    let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
    var.set(&mut frame, vec![Item::Value(TaggedValue::boolean(true))]);
    let err = drain_items(&it, &mut frame).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPDY0050);
}

#[rstest]
fn sort_distinct_step_merges_overlapping_paths(document: NodeRef) {
    // (b, c)/ancestor::* in document order without duplicates
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let var = alloc.local::<Binding>();
    let input = Box::new(LocalVariable::new(&mut alloc, var));
    let ancestors = Box::new(AxisStep::new(
        &mut alloc,
        input,
        Axis::Ancestor,
        NodeTest::Kind(NodeKind::Element),
    ));
    let it = SortDistinctNodes::new(&mut alloc, ancestors);
    let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
    let (b, c) = (find(&document, &[0, 0, 0]), find(&document, &[0, 0, 2]));
    var.set(&mut frame, vec![Item::Node(c), Item::Node(b)]);
    let labels: Vec<String> = drain_items(&it, &mut frame)
        .unwrap()
        .iter()
        .map(|i| label(i.as_node().unwrap(), &ctx))
        .collect();
    assert_eq!(labels, ["root", "a"]);
}

/// Element tree from parent choices: node `i` hangs below `parents[i - 1] % i`.
fn random_tree(parents: &[usize], with_attrs: bool) -> (NodeData, Vec<String>) {
    let n = parents.len() + 1;
    let mut children = vec![Vec::new(); n];
    for (i, p) in parents.iter().enumerate() {
        children[p % (i + 1)].push(i + 1);
    }
    fn build(i: usize, children: &[Vec<usize>], with_attrs: bool, order: &mut Vec<String>) -> NodeData {
        order.push(format!("n{i}"));
        let mut e = elem(&format!("n{i}"));
        if with_attrs && i % 2 == 0 {
            e = e.attr(attr("k", "v"));
        }
        for &c in &children[i] {
            e = e.child(build(c, children, with_attrs, order));
        }
        e.build()
    }
    let mut order = Vec::new();
    let root = build(0, &children, with_attrs, &mut order);
    (doc().child(root).build(), order)
}

proptest! {
    #[test]
    fn descendants_once_each_in_document_order(parents in prop::collection::vec(0usize..64, 0..48), with_attrs in any::<bool>()) {
        let ctx = DynamicContext::default();
        let (tree, order) = random_tree(&parents, with_attrs);
        let document = encode(tree);
        let labels = step(&ctx, &document, Axis::Descendant, NodeTest::AnyKind);
        prop_assert_eq!(labels, order);
    }

    #[test]
    fn document_order_is_a_strict_total_order(
        parents in prop::collection::vec(0usize..16, 0..16),
        other in prop::collection::vec(0usize..16, 0..8),
    ) {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let var = alloc.local::<Binding>();
        let input = Box::new(LocalVariable::new(&mut alloc, var));
        let all = AxisStep::new(&mut alloc, input, Axis::DescendantOrSelf, NodeTest::AnyKind);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let trees = [encode(random_tree(&parents, true).0), encode(random_tree(&other, false).0)];
        var.set(&mut frame, trees.iter().cloned().map(Item::Node).collect());
        let mut nodes: Vec<NodeRef> = Vec::new();
        for item in drain_items(&all, &mut frame).unwrap() {
            let node = item.as_node().unwrap().clone();
            nodes.extend(node.attributes().unwrap_or_default());
            nodes.push(node);
        }

        let mut shuffled = nodes.clone();
        shuffled.reverse();
        shuffled.extend(nodes.iter().cloned());
        let sorted = sort_distinct(shuffled);
        prop_assert_eq!(sorted.len(), nodes.len());

        for (i, a) in sorted.iter().enumerate() {
            prop_assert_eq!(a.compare_document_order(a), Ordering::Equal);
            for b in &sorted[i + 1..] {
                prop_assert_eq!(a.compare_document_order(b), Ordering::Less);
                prop_assert_eq!(b.compare_document_order(a), Ordering::Greater);
                prop_assert!(!a.is_same_node(b));
            }
        }
        // nodes of one tree stay contiguous
        let first_tree: Vec<bool> = sorted.iter().map(|n| n.same_tree(&trees[0])).collect();
        let switches = first_tree.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert!(switches <= 1);
    }
}
