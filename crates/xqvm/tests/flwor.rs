mod common;

use common::{atomics, constant, int, ints, range, string};
use rstest::{fixture, rstest};
use xqvm::datamodel::AtomicValue;
use xqvm::runtime::functions::{Arithmetic, ArithmeticOp, ComparisonOp, Concat, IfThenElse, LocalVariable, ValueComparison};
use xqvm::runtime::{
    Binding, BoxedIterator, BoxedTuple, CountTuple, DynamicContext, Eager, FlworIterator, ForTuple, LetTuple,
    LocalRegister, OrderByTuple, OrderSpec, QueryPlan, RegisterAllocator, UnitTuple, WhereTuple,
};

#[fixture]
fn ctx() -> DynamicContext {
    DynamicContext::default()
}

fn var(alloc: &mut RegisterAllocator, reg: LocalRegister<Binding>) -> BoxedIterator {
    Box::new(LocalVariable::new(alloc, reg))
}

fn seq(alloc: &mut RegisterAllocator, parts: Vec<BoxedIterator>) -> BoxedIterator {
    Box::new(Concat::new(alloc, parts))
}

fn run(alloc: &mut RegisterAllocator, tuples: BoxedTuple, ret: BoxedIterator, ctx: &DynamicContext) -> Vec<AtomicValue> {
    let flwor = FlworIterator::new(alloc, tuples, ret);
    let plan = QueryPlan::new(Box::new(flwor), alloc);
    atomics(&plan.collect_values(ctx).unwrap())
}

#[rstest]
fn nested_for_is_a_cross_product(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let (x, y) = (alloc.local::<Binding>(), alloc.local::<Binding>());
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = range(&mut alloc, &ctx, 1, 2);
    let outer: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let ys = {
        let parts = vec![int(&mut alloc, &ctx, 10), int(&mut alloc, &ctx, 20)];
        seq(&mut alloc, parts)
    };
    let inner: BoxedTuple = Box::new(ForTuple::new(&mut alloc, outer, y, ys));
    let ret = {
        let parts = vec![var(&mut alloc, x), var(&mut alloc, y)];
        seq(&mut alloc, parts)
    };
    assert_eq!(run(&mut alloc, inner, ret, &ctx), ints(&[1, 10, 1, 20, 2, 10, 2, 20]));
}

#[rstest]
fn for_over_empty_yields_nothing(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let empty = range(&mut alloc, &ctx, 1, 0);
    let tuples: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, empty));
    let ret = var(&mut alloc, x);
    assert!(run(&mut alloc, tuples, ret, &ctx).is_empty());
}

#[rstest]
fn positional_variable_counts_from_one(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let (x, at) = (alloc.local::<Binding>(), alloc.local::<Binding>());
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let letters = {
        let parts = vec![
            string(&mut alloc, &ctx, "a"),
            string(&mut alloc, &ctx, "b"),
            string(&mut alloc, &ctx, "c"),
        ];
        seq(&mut alloc, parts)
    };
    let tuples: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, letters).with_position(at));
    let ret = var(&mut alloc, at);
    assert_eq!(run(&mut alloc, tuples, ret, &ctx), ints(&[1, 2, 3]));
}

#[rstest]
fn let_binds_the_whole_sequence(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let (s, x) = (alloc.local::<Binding>(), alloc.local::<Binding>());
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let values = range(&mut alloc, &ctx, 1, 3);
    let lets: BoxedTuple = Box::new(LetTuple::new(&mut alloc, unit, s, values));
    let again = var(&mut alloc, s);
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, lets, x, again));
    let ret = {
        let parts = vec![var(&mut alloc, x), var(&mut alloc, s)];
        seq(&mut alloc, parts)
    };
    assert_eq!(
        run(&mut alloc, fors, ret, &ctx),
        ints(&[1, 1, 2, 3, 2, 1, 2, 3, 3, 1, 2, 3])
    );
}

#[rstest]
fn where_filters_tuples(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = range(&mut alloc, &ctx, 1, 10);
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let even = {
        let (lhs, two) = (var(&mut alloc, x), int(&mut alloc, &ctx, 2));
        let rem: BoxedIterator = Box::new(Eager::new(&mut alloc, Arithmetic::new(ArithmeticOp::Mod, lhs, two)));
        let zero = int(&mut alloc, &ctx, 0);
        Box::new(Eager::new(&mut alloc, ValueComparison::new(ComparisonOp::Eq, rem, zero)))
    };
    let filtered: BoxedTuple = Box::new(WhereTuple::new(&mut alloc, fors, even));
    let ret = var(&mut alloc, x);
    assert_eq!(run(&mut alloc, filtered, ret, &ctx), ints(&[2, 4, 6, 8, 10]));
}

#[rstest]
fn count_numbers_surviving_tuples(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let (x, c) = (alloc.local::<Binding>(), alloc.local::<Binding>());
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = range(&mut alloc, &ctx, 5, 7);
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let counted: BoxedTuple = Box::new(CountTuple::new(&mut alloc, fors, c));
    let ret = {
        let parts = vec![var(&mut alloc, c), var(&mut alloc, x)];
        seq(&mut alloc, parts)
    };
    assert_eq!(run(&mut alloc, counted, ret, &ctx), ints(&[1, 5, 2, 6, 3, 7]));
}

#[rstest]
#[case::ascending(false, vec![1, 2, 3, 4])]
#[case::descending(true, vec![4, 3, 2, 1])]
fn order_by_sorts_tuples(ctx: DynamicContext, #[case] descending: bool, #[case] expected: Vec<i64>) {
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = {
        let parts = [3, 1, 4, 2].iter().map(|&v| int(&mut alloc, &ctx, v)).collect();
        seq(&mut alloc, parts)
    };
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let key = var(&mut alloc, x);
    let spec = if descending {
        OrderSpec::new(key).descending()
    } else {
        OrderSpec::new(key)
    };
    let sorted: BoxedTuple = Box::new(OrderByTuple::new(&mut alloc, fors, vec![spec], vec![x]));
    let ret = var(&mut alloc, x);
    assert_eq!(run(&mut alloc, sorted, ret, &ctx), ints(&expected));
}

#[rstest]
#[case::empty_least(false, vec![2, 1, 0])]
#[case::empty_greatest(true, vec![0, 2, 1])]
fn order_by_places_empty_keys(ctx: DynamicContext, #[case] greatest: bool, #[case] expected: Vec<i64>) {
    // for $x in (1, 0, 2) order by (if ($x eq 0) then () else $x) descending
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = {
        let parts = [1, 0, 2].iter().map(|&v| int(&mut alloc, &ctx, v)).collect();
        seq(&mut alloc, parts)
    };
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let key = {
        let (lhs, zero) = (var(&mut alloc, x), int(&mut alloc, &ctx, 0));
        let is_zero: BoxedIterator =
            Box::new(Eager::new(&mut alloc, ValueComparison::new(ComparisonOp::Eq, lhs, zero)));
        let empty = range(&mut alloc, &ctx, 1, 0);
        let value = var(&mut alloc, x);
        Box::new(IfThenElse::new(&mut alloc, is_zero, empty, value))
    };
    let spec = if greatest {
        OrderSpec::new(key).descending().empty_greatest()
    } else {
        OrderSpec::new(key).descending()
    };
    let sorted: BoxedTuple = Box::new(OrderByTuple::new(&mut alloc, fors, vec![spec], vec![x]));
    let ret = var(&mut alloc, x);
    assert_eq!(run(&mut alloc, sorted, ret, &ctx), ints(&expected));
}

#[rstest]
#[case::empty_least(false, vec![0, 3, 1, 2])]
#[case::empty_greatest(true, vec![1, 2, 3, 0])]
fn order_by_ranks_nan_between_empty_and_values(
    ctx: DynamicContext,
    #[case] greatest: bool,
    #[case] expected: Vec<i64>,
) {
    // for $x in (1, 0, 2, 3)
    // order by (if ($x eq 0) then () else if ($x eq 3) then xs:double("NaN") else $x)
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = {
        let parts = [1, 0, 2, 3].iter().map(|&v| int(&mut alloc, &ctx, v)).collect();
        seq(&mut alloc, parts)
    };
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let equals = |alloc: &mut RegisterAllocator, v: i64| -> BoxedIterator {
        let (lhs, rhs) = (var(alloc, x), int(alloc, &ctx, v));
        Box::new(Eager::new(alloc, ValueComparison::new(ComparisonOp::Eq, lhs, rhs)))
    };
    let key = {
        let is_zero = equals(&mut alloc, 0);
        let is_three = equals(&mut alloc, 3);
        let empty = range(&mut alloc, &ctx, 1, 0);
        let nan = constant(&mut alloc, ctx.atomics().create(&AtomicValue::Double(f64::NAN)).unwrap());
        let value = var(&mut alloc, x);
        let inner: BoxedIterator = Box::new(IfThenElse::new(&mut alloc, is_three, nan, value));
        Box::new(IfThenElse::new(&mut alloc, is_zero, empty, inner))
    };
    let spec = if greatest {
        OrderSpec::new(key).empty_greatest()
    } else {
        OrderSpec::new(key)
    };
    let sorted: BoxedTuple = Box::new(OrderByTuple::new(&mut alloc, fors, vec![spec], vec![x]));
    let ret = var(&mut alloc, x);
    assert_eq!(run(&mut alloc, sorted, ret, &ctx), ints(&expected));
}

#[rstest]
fn order_by_is_stable(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let (x, pos) = (alloc.local::<Binding>(), alloc.local::<Binding>());
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = {
        let parts = [2, 1, 2, 1].iter().map(|&v| int(&mut alloc, &ctx, v)).collect();
        seq(&mut alloc, parts)
    };
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs).with_position(pos));
    let key = var(&mut alloc, x);
    let sorted: BoxedTuple = Box::new(OrderByTuple::new(&mut alloc, fors, vec![OrderSpec::new(key)], vec![x, pos]));
    let ret = var(&mut alloc, pos);
    assert_eq!(run(&mut alloc, sorted, ret, &ctx), ints(&[2, 4, 1, 3]));
}

#[rstest]
fn order_by_rejects_incomparable_keys(ctx: DynamicContext) {
    let mut alloc = RegisterAllocator::new();
    let x = alloc.local::<Binding>();
    let unit: BoxedTuple = Box::new(UnitTuple::new(&mut alloc));
    let xs = {
        let parts = vec![int(&mut alloc, &ctx, 1), string(&mut alloc, &ctx, "a")];
        seq(&mut alloc, parts)
    };
    let fors: BoxedTuple = Box::new(ForTuple::new(&mut alloc, unit, x, xs));
    let key = var(&mut alloc, x);
    let sorted: BoxedTuple = Box::new(OrderByTuple::new(&mut alloc, fors, vec![OrderSpec::new(key)], vec![x]));
    let ret = var(&mut alloc, x);
    let flwor = FlworIterator::new(&mut alloc, sorted, ret);
    let plan = QueryPlan::new(Box::new(flwor), &alloc);
    let err = plan.collect_values(&ctx).unwrap_err();
    assert_eq!(err.code, xqvm::ErrorCode::XPTY0004);
}
