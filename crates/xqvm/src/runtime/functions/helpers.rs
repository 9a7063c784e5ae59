//! Atomization, effective boolean value and other argument plumbing.
use crate::datamodel::{AtomicValue, Item, NodePointable, NodeRef, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{RuntimeIterator, with_open};

/// Typed value of one item. Attributes keep their typed value; other nodes
/// become `xs:untypedAtomic` (comments and PIs `xs:string`).
pub fn atomize(item: &Item) -> Result<AtomicValue> {
    match item {
        Item::Value(v) => AtomicValue::decode(&v.pointable()),
        Item::Node(n) => atomize_node(n),
    }
}

pub fn atomize_node(node: &NodeRef) -> Result<AtomicValue> {
    match node.node()? {
        NodePointable::Attribute(a) => AtomicValue::decode(&a.value()?),
        NodePointable::Comment(_) | NodePointable::ProcessingInstruction(_) => {
            Ok(AtomicValue::String(node.string_value()?))
        }
        _ => Ok(AtomicValue::UntypedAtomic(node.string_value()?)),
    }
}

/// Zero or one atomized item; more is `XPTY0004`.
pub fn atomize_optional(it: &dyn RuntimeIterator, frame: &mut Frame<'_>) -> Result<Option<AtomicValue>> {
    with_open(it, frame, |it, frame| {
        let Some(first) = it.next(frame)? else {
            return Ok(None);
        };
        if it.next(frame)?.is_some() {
            return Err(Error::new(
                ErrorCode::XPTY0004,
                "a sequence of more than one item is not allowed here",
            ));
        }
        atomize(&first).map(Some)
    })
}

/// Exactly one atomized item.
pub fn atomize_one(it: &dyn RuntimeIterator, frame: &mut Frame<'_>) -> Result<AtomicValue> {
    atomize_optional(it, frame)?
        .ok_or_else(|| Error::new(ErrorCode::XPTY0004, "empty sequence is not allowed here"))
}

/// Effective boolean value. Pulls at most two items.
pub fn effective_boolean_value(it: &dyn RuntimeIterator, frame: &mut Frame<'_>) -> Result<bool> {
    with_open(it, frame, |it, frame| {
        let Some(first) = it.next(frame)? else {
            return Ok(false);
        };
        if first.is_node() {
            return Ok(true);
        }
        if it.next(frame)?.is_some() {
            return Err(Error::new(
                ErrorCode::FORG0006,
                "effective boolean value of a sequence of two or more atomic values",
            ));
        }
        match first.atomic()? {
            AtomicValue::Boolean(b) => Ok(b),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                Ok(!s.is_empty())
            }
            AtomicValue::Integer(_, i) => Ok(i != 0),
            AtomicValue::Decimal(d) => Ok(!d.is_zero()),
            AtomicValue::Float(f) => Ok(!(f == 0.0 || f.is_nan())),
            AtomicValue::Double(d) => Ok(!(d == 0.0 || d.is_nan())),
            other => Err(Error::new(
                ErrorCode::FORG0006,
                format!("no effective boolean value for {:?}", other.tag()),
            )),
        }
    })
}

/// Atomic value as an item, through the context's factory.
pub fn atomic_item(frame: &Frame<'_>, value: &AtomicValue) -> Result<Item> {
    frame.ctx().atomics().create(value).map(Item::Value)
}

pub fn boolean_item(b: bool) -> Item {
    Item::Value(TaggedValue::boolean(b))
}

/// `XPDY0050` unless the item is a node.
pub fn require_node(item: &Item) -> Result<&NodeRef> {
    item.as_node().ok_or_else(|| {
        Error::new(
            ErrorCode::XPDY0050,
            format!("node required, found {:?}", item.tag()),
        )
    })
}

/// Zero or one node; more is `XPTY0004`, an atomic value `XPDY0050`.
pub fn optional_node(it: &dyn RuntimeIterator, frame: &mut Frame<'_>) -> Result<Option<NodeRef>> {
    with_open(it, frame, |it, frame| {
        let Some(first) = it.next(frame)? else {
            return Ok(None);
        };
        if it.next(frame)?.is_some() {
            return Err(Error::new(ErrorCode::XPTY0004, "more than one node"));
        }
        require_node(&first).cloned().map(Some)
    })
}

/// Lexical `xs:double`, as cast from `xs:untypedAtomic`.
pub fn parse_double(s: &str) -> Result<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ if t.contains(['i', 'I', 'n', 'N']) => Err(cast_error(s, "xs:double")),
        _ => t.parse::<f64>().map_err(|_| cast_error(s, "xs:double")),
    }
}

pub fn cast_error(s: &str, target: &str) -> Error {
    Error::new(ErrorCode::FORG0001, format!("cannot cast {s:?} to {target}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.5", 1.5)]
    #[case(" 2 ", 2.0)]
    #[case("-INF", f64::NEG_INFINITY)]
    #[case("1e3", 1000.0)]
    fn double_lexical(#[case] s: &str, #[case] expected: f64) {
        assert_eq!(parse_double(s).unwrap(), expected);
    }

    #[rstest]
    #[case("inf")]
    #[case("nan")]
    #[case("abc")]
    fn bad_double_lexical(#[case] s: &str) {
        assert_eq!(parse_double(s).unwrap_err().code, ErrorCode::FORG0001);
    }
}
