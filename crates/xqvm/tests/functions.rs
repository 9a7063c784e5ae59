mod common;

use common::{atomics, constant, int, ints, range, string};
use rstest::rstest;
use xqvm::datamodel::{AtomicValue, Decimal, Item};
use xqvm::names::QName;
use xqvm::error::ErrorCode;
use xqvm::runtime::functions::{
    Arithmetic, ArithmeticOp, AttributeConstructor, Avg, BooleanFn, CastAs, CastableAs, Concat, Count, Data,
    ElementConstructor, Exists, Extremum, Keys, LocalName, Name, NodeName, ObjectConstructor, StringFn,
    StringJoin, Subsequence, Sum, TextConstructor,
};
use xqvm::runtime::{
    Axis, AxisStep, BoxedIterator, DynamicContext, Eager, EagerEvaluator, NameTest, NodeTest, QueryPlan,
    RegisterAllocator,
};
use xqvm::TaggedValue;
use xqvm::datamodel::ValueTag;

fn eval(alloc: &RegisterAllocator, root: BoxedIterator, ctx: &DynamicContext) -> Vec<Item> {
    QueryPlan::new(root, alloc).collect_values(ctx).unwrap()
}

fn eager<E: EagerEvaluator + 'static>(alloc: &mut RegisterAllocator, e: E) -> BoxedIterator {
    Box::new(Eager::new(alloc, e))
}

/// `element e { attribute id { "x" }, "hello", element f { } , 42 }`
fn constructed(alloc: &mut RegisterAllocator, ctx: &DynamicContext) -> BoxedIterator {
    let id_value = string(alloc, ctx, "x");
    let id = eager(alloc, AttributeConstructor::new(QName::local("id"), id_value));
    let hello = string(alloc, ctx, "hello");
    let nothing = constant(alloc, TaggedValue::empty_sequence());
    let f = eager(alloc, ElementConstructor::new(QName::local("f"), nothing));
    let answer = int(alloc, ctx, 42);
    let content = Box::new(Concat::new(alloc, vec![id, hello, f, answer]));
    eager(alloc, ElementConstructor::new(QName::local("e"), content))
}

#[rstest]
fn constructed_element_can_be_navigated() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let children = Box::new(AxisStep::new(&mut alloc, e, Axis::Child, NodeTest::AnyKind));
    let items = eval(&alloc, children, &ctx);
    assert_eq!(items.len(), 3);
    let kinds: Vec<_> = items.iter().map(|i| i.as_node().unwrap().kind()).collect();
    use xqvm::datamodel::NodeKind::{Element, Text};
    assert_eq!(kinds, [Text, Element, Text]);
    assert_eq!(items[0].as_node().unwrap().string_value().unwrap(), "hello");
    assert_eq!(items[2].as_node().unwrap().string_value().unwrap(), "42");
}

#[rstest]
fn string_and_names_of_constructed_nodes() {
    let ctx = DynamicContext::default();

    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let root = eager(&mut alloc, StringFn::new(e));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::string("hello42")]);

    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let attrs = Box::new(AxisStep::new(&mut alloc, e, Axis::Attribute, NodeTest::Name(NameTest::local("id"))));
    let root = eager(&mut alloc, Name::new(attrs));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::string("id")]);

    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let root = eager(&mut alloc, LocalName::new(e));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::string("e")]);

    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let root = eager(&mut alloc, NodeName::new(e));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::QName(QName::local("e"))]);
}

#[rstest]
fn data_atomizes_attributes_as_untyped() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let e = constructed(&mut alloc, &ctx);
    let attrs = Box::new(AxisStep::new(&mut alloc, e, Axis::Attribute, NodeTest::AnyKind));
    let root = Box::new(Data::new(&mut alloc, attrs));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::untyped("x")]);
}

#[rstest]
fn text_constructor_joins_with_spaces() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let content = range(&mut alloc, &ctx, 1, 3);
    let root = eager(&mut alloc, TextConstructor::new(content));
    let items = eval(&alloc, root, &ctx);
    assert_eq!(items[0].as_node().unwrap().string_value().unwrap(), "1 2 3");
}

#[rstest]
#[case(ArithmeticOp::Add, AtomicValue::integer(3), AtomicValue::Double(2.5), AtomicValue::Double(5.5))]
#[case(ArithmeticOp::Mul, AtomicValue::integer(4), AtomicValue::integer(-3), AtomicValue::integer(-12))]
#[case(ArithmeticOp::Div, AtomicValue::integer(1), AtomicValue::integer(4), AtomicValue::Decimal(Decimal::new(25, 2).unwrap()))]
#[case(ArithmeticOp::IDiv, AtomicValue::integer(-7), AtomicValue::integer(2), AtomicValue::integer(-3))]
#[case(ArithmeticOp::Mod, AtomicValue::integer(-7), AtomicValue::integer(2), AtomicValue::integer(-1))]
fn arithmetic_through_a_plan(
    #[case] op: ArithmeticOp,
    #[case] a: AtomicValue,
    #[case] b: AtomicValue,
    #[case] expected: AtomicValue,
) {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let lhs = constant(&mut alloc, ctx.atomics().create(&a).unwrap());
    let rhs = constant(&mut alloc, ctx.atomics().create(&b).unwrap());
    let root = eager(&mut alloc, Arithmetic::new(op, lhs, rhs));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [expected]);
}

#[rstest]
fn subsequence_of_a_huge_range() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let input = range(&mut alloc, &ctx, 1, 4_000_000_000);
    let (start, len) = (int(&mut alloc, &ctx, 3_000_000_000), int(&mut alloc, &ctx, 3));
    let root = Box::new(Subsequence::new(&mut alloc, input, start, Some(len)));
    assert_eq!(
        atomics(&eval(&alloc, root, &ctx)),
        ints(&[3_000_000_000, 3_000_000_001, 3_000_000_002])
    );
}

#[rstest]
#[case(0, false)]
#[case(5, true)]
fn count_exists_and_boolean(#[case] n: i64, #[case] any: bool) {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let counted = {
        let input = range(&mut alloc, &ctx, 1, n);
        eager(&mut alloc, Count::new(input))
    };
    let exists = {
        let input = range(&mut alloc, &ctx, 1, n);
        eager(&mut alloc, Exists::new(input))
    };
    let boolean = {
        let input = range(&mut alloc, &ctx, 1, n);
        let c = eager(&mut alloc, Count::new(input));
        eager(&mut alloc, BooleanFn::new(c))
    };
    let root = Box::new(Concat::new(&mut alloc, vec![counted, exists, boolean]));
    assert_eq!(
        atomics(&eval(&alloc, root, &ctx)),
        [AtomicValue::integer(n), AtomicValue::Boolean(any), AtomicValue::Boolean(any)]
    );
}

#[rstest]
fn keys_of_a_constructed_object() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let pairs = vec![
        (string(&mut alloc, &ctx, "z"), int(&mut alloc, &ctx, 1)),
        (string(&mut alloc, &ctx, "y"), range(&mut alloc, &ctx, 1, 2)),
    ];
    let object = eager(&mut alloc, ObjectConstructor::new(pairs));
    let root = eager(&mut alloc, Keys::new(object));
    assert_eq!(
        atomics(&eval(&alloc, root, &ctx)),
        [AtomicValue::string("z"), AtomicValue::string("y")]
    );
}

/// `element order { element line { attribute price { p } }* }`
fn order(alloc: &mut RegisterAllocator, ctx: &DynamicContext, prices: &[&str]) -> BoxedIterator {
    let lines: Vec<BoxedIterator> = prices
        .iter()
        .map(|p| {
            let value = string(alloc, ctx, p);
            let price = eager(alloc, AttributeConstructor::new(QName::local("price"), value));
            eager(alloc, ElementConstructor::new(QName::local("line"), price))
        })
        .collect();
    let content = Box::new(Concat::new(alloc, lines));
    eager(alloc, ElementConstructor::new(QName::local("order"), content))
}

/// `$order/line/@price`
fn prices(alloc: &mut RegisterAllocator, ctx: &DynamicContext, values: &[&str]) -> BoxedIterator {
    let order = order(alloc, ctx, values);
    let lines = Box::new(AxisStep::new(alloc, order, Axis::Child, NodeTest::Name(NameTest::local("line"))));
    Box::new(AxisStep::new(alloc, lines, Axis::Attribute, NodeTest::Name(NameTest::local("price"))))
}

#[rstest]
fn aggregates_over_untyped_attributes() {
    let ctx = DynamicContext::default();
    let values = ["1.5", "4", "2.5"];

    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, &values);
    let root = eager(&mut alloc, Sum::new(input, None));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::Double(8.0)]);

    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, &values);
    let root = eager(&mut alloc, Avg::new(input));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::Double(8.0 / 3.0)]);

    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, &values);
    let root = eager(&mut alloc, Extremum::max(input));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::Double(4.0)]);
}

#[rstest]
fn cast_attribute_to_decimal() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, &["12.50"]);
    let root = eager(&mut alloc, CastAs::new(input, ValueTag::Decimal));
    assert_eq!(
        atomics(&eval(&alloc, root, &ctx)),
        [AtomicValue::Decimal(Decimal::new(125, 1).unwrap())]
    );
}

#[rstest]
#[case::one(&["7"], false, Ok(vec![AtomicValue::integer(7)]))]
#[case::none_allowed(&[], true, Ok(vec![]))]
#[case::none(&[], false, Err(ErrorCode::XPTY0004))]
#[case::two(&["1", "2"], true, Err(ErrorCode::XPTY0004))]
#[case::bad_lexical(&["seven"], false, Err(ErrorCode::FORG0001))]
fn cast_cardinality(
    #[case] values: &[&str],
    #[case] optional: bool,
    #[case] expected: Result<Vec<AtomicValue>, ErrorCode>,
) {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, values);
    let cast = CastAs::new(input, ValueTag::Integer);
    let cast = if optional { cast.optional() } else { cast };
    let root = eager(&mut alloc, cast);
    let got = QueryPlan::new(root, &alloc)
        .collect_values(&ctx)
        .map(|items| atomics(&items))
        .map_err(|e| e.code);
    assert_eq!(got, expected);
}

#[rstest]
#[case(&["7"], false, true)]
#[case(&["seven"], false, false)]
#[case(&[], false, false)]
#[case(&[], true, true)]
#[case(&["1", "2"], true, false)]
fn castable_never_raises(#[case] values: &[&str], #[case] optional: bool, #[case] expected: bool) {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, values);
    let castable = CastableAs::new(input, ValueTag::Integer);
    let castable = if optional { castable.optional() } else { castable };
    let root = eager(&mut alloc, castable);
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::Boolean(expected)]);
}

#[rstest]
fn string_join_of_attribute_values() {
    let ctx = DynamicContext::default();
    let mut alloc = RegisterAllocator::new();
    let input = prices(&mut alloc, &ctx, &["a", "b", "c"]);
    let separator = string(&mut alloc, &ctx, "-");
    let root = eager(&mut alloc, StringJoin::new(input, Some(separator)));
    assert_eq!(atomics(&eval(&alloc, root, &ctx)), [AtomicValue::string("a-b-c")]);
}
