//! Executable plans and the result stream handed to serializers.
use super::context::DynamicContext;
use super::flwor::Binding;
use super::frame::Frame;
use super::iterator::{BoxedIterator, RuntimeIterator, drain_items};
use super::register::{GlobalRegister, RegisterAllocator};
use crate::datamodel::{Item, TaggedValue};
use crate::error::Result;

/// An iterator tree together with the register layout it was built against.
///
/// Plans are immutable once built and can be executed any number of times,
/// also from several threads at once; every execution gets its own [`Frame`].
#[derive(Debug)]
pub struct QueryPlan {
    root: BoxedIterator,
    prolog: Vec<(GlobalRegister<Binding>, BoxedIterator)>,
    locals: usize,
    globals: usize,
}

impl QueryPlan {
    /// Takes the register counts from `alloc`; every iterator of the plan,
    /// prolog initializers included, must have been built with it.
    pub fn new(root: BoxedIterator, alloc: &RegisterAllocator) -> Self {
        Self {
            root,
            prolog: Vec::new(),
            locals: alloc.local_count(),
            globals: alloc.global_count(),
        }
    }

    /// Adds a global variable initializer. Initializers run in the order
    /// they were added, so later ones may read earlier variables.
    pub fn with_prolog(mut self, var: GlobalRegister<Binding>, init: BoxedIterator) -> Self {
        self.prolog.push((var, init));
        self
    }

    pub fn root(&self) -> &dyn RuntimeIterator {
        self.root.as_ref()
    }

    fn prepare<'ctx>(&self, ctx: &'ctx DynamicContext) -> Result<Frame<'ctx>> {
        tracing::debug!(
            locals = self.locals,
            globals = self.globals,
            prolog = self.prolog.len(),
            "executing query plan"
        );
        let mut frame = Frame::new(ctx, self.locals, self.globals);
        for (var, init) in &self.prolog {
            let items = drain_items(init.as_ref(), &mut frame)?;
            var.set(&mut frame, items);
        }
        Ok(frame)
    }

    /// Runs the prolog and opens the root.
    pub fn execute<'p, 'ctx>(&'p self, ctx: &'ctx DynamicContext) -> Result<ResultStream<'p, 'ctx>> {
        let mut frame = self.prepare(ctx)?;
        if let Err(err) = self.root.open(&mut frame) {
            self.root.close(&mut frame);
            return Err(err);
        }
        Ok(ResultStream {
            root: self.root.as_ref(),
            frame,
            open: true,
        })
    }

    /// All result items, nodes keeping their identity.
    pub fn collect_values(&self, ctx: &DynamicContext) -> Result<Vec<Item>> {
        self.execute(ctx)?.collect()
    }

    /// The whole result as one encoded value.
    pub fn evaluate_eagerly(&self, ctx: &DynamicContext) -> Result<TaggedValue> {
        let mut frame = self.prepare(ctx)?;
        let value = self.root.evaluate_eagerly(&mut frame);
        tracing::debug!(ok = value.is_ok(), "query plan finished");
        value
    }
}

/// Pulls result items from an executing plan.
///
/// The root is closed exactly once: when the stream is exhausted, after the
/// first error, or when the stream is dropped early.
#[derive(Debug)]
pub struct ResultStream<'p, 'ctx> {
    root: &'p dyn RuntimeIterator,
    frame: Frame<'ctx>,
    open: bool,
}

impl ResultStream<'_, '_> {
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Stops pulling and closes the root.
    pub fn cancel(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.open {
            self.open = false;
            self.root.close(&mut self.frame);
            tracing::debug!("query plan finished");
        }
    }
}

impl Iterator for ResultStream<'_, '_> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }
        match self.root.next(&mut self.frame) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl Drop for ResultStream<'_, '_> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("result stream dropped before exhaustion, closing plan root");
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::AtomicValue;
    use crate::runtime::functions::basic::{Constant, GlobalVariable, Range};
    use rstest::rstest;

    fn int(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: i64) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().integer(v).unwrap()))
    }

    #[rstest]
    fn prolog_binds_globals_before_root() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let var = alloc.global::<Binding>();
        let (a, b) = (int(&mut alloc, &ctx, 1), int(&mut alloc, &ctx, 3));
        let init: BoxedIterator = Box::new(Range::new(&mut alloc, a, b));
        let root = Box::new(GlobalVariable::new(&mut alloc, var));
        let plan = QueryPlan::new(root, &alloc).with_prolog(var, init);
        let got: Vec<AtomicValue> = plan
            .collect_values(&ctx)
            .unwrap()
            .iter()
            .map(|i| i.atomic().unwrap())
            .collect();
        assert_eq!(got, (1..=3).map(AtomicValue::integer).collect::<Vec<_>>());
    }

    #[rstest]
    fn stream_stays_exhausted() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let root = int(&mut alloc, &ctx, 7);
        let plan = QueryPlan::new(root, &alloc);
        let mut stream = plan.execute(&ctx).unwrap();
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(!stream.is_open());
        assert!(stream.next().is_none());
    }
}
