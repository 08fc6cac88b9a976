use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::Cmd;
use crate::context::Context;

/// Interception points around every command and pipeline.
///
/// `before_*` calls run in registration order, `after_*` calls in reverse.
/// The same [`Context`] is passed to both halves of one operation. After
/// hooks fire whether the operation succeeded or failed, and also when the
/// caller drops it midway; the command then carries
/// [`ClientError::Cancelled`](crate::ClientError::Cancelled).
///
/// Hooks run inline on the calling task and must not block.
pub trait Hook: Send + Sync + 'static {
    /// Identifies the hook for [`Client::has_hook`](crate::Client::has_hook).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn before_process(&self, _ctx: &mut Context, _cmd: &Cmd) {}

    fn after_process(&self, _ctx: &Context, _cmd: &Cmd) {}

    fn before_process_pipeline(&self, _ctx: &mut Context, _cmds: &[Cmd]) {}

    fn after_process_pipeline(&self, _ctx: &Context, _cmds: &[Cmd]) {}
}

/// Copy-on-write hook chain. Each operation works from a snapshot so hooks
/// added mid-flight only apply to later operations.
pub(crate) struct Hooks {
    chain: RwLock<Arc<[Arc<dyn Hook>]>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self {
            chain: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn add(&self, hook: Arc<dyn Hook>) {
        let mut chain = self.chain.write();
        let mut hooks = chain.to_vec();
        hooks.push(hook);
        *chain = hooks.into();
    }

    pub fn snapshot(&self) -> Arc<[Arc<dyn Hook>]> {
        self.chain.read().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chain.read().iter().any(|h| h.name() == name)
    }
}
