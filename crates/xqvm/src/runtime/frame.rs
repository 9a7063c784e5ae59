use super::context::DynamicContext;
use super::register::RegisterSet;
use crate::datamodel::PointablePool;

/// Per-execution state: register sets, the shared context and a scratch pool.
///
/// A frame belongs to one thread. Run the same plan concurrently by giving
/// every thread its own frame.
#[derive(Debug)]
pub struct Frame<'ctx> {
    locals: RegisterSet,
    globals: RegisterSet,
    ctx: &'ctx DynamicContext,
    pool: PointablePool,
}

impl<'ctx> Frame<'ctx> {
    pub fn new(ctx: &'ctx DynamicContext, locals: usize, globals: usize) -> Self {
        tracing::trace!(locals, globals, "sizing frame registers");
        Self {
            locals: RegisterSet::with_len(locals),
            globals: RegisterSet::with_len(globals),
            ctx,
            pool: PointablePool::new(),
        }
    }

    pub fn ctx(&self) -> &'ctx DynamicContext {
        self.ctx
    }

    pub fn pool(&self) -> &PointablePool {
        &self.pool
    }

    pub fn locals(&self) -> &RegisterSet {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut RegisterSet {
        &mut self.locals
    }

    pub fn globals(&self) -> &RegisterSet {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut RegisterSet {
        &mut self.globals
    }
}
