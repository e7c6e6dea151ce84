//! Lifecycle hooks for mutations.
//!
//! Hooks are registered per action, optionally narrowed to one table, with a
//! numeric priority; lower priorities run first and ties keep registration
//! order.
//!
//! For one call:
//!
//! 1. If any instead-of hook matches, the first one produces the result and
//!    nothing is compiled or executed.
//! 2. Otherwise every matching before hook may rewrite the request, in order.
//! 3. The (rewritten) request is compiled and executed.
//! 4. Every matching after hook may rewrite the result, in order.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GraphResult;
use crate::schema::TableKey;
use crate::sql::mutation::{MutationAction, MutationRequest};

pub type BeforeHook = Arc<dyn Fn(MutationRequest) -> GraphResult<MutationRequest> + Send + Sync>;
pub type InsteadOfHook = Arc<dyn Fn(&MutationRequest) -> GraphResult<Value> + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&MutationRequest, Value) -> GraphResult<Value> + Send + Sync>;

struct Registered<H> {
    action: MutationAction,
    table: Option<TableKey>,
    priority: i32,
    seq: usize,
    hook: H,
}

impl<H> Registered<H> {
    fn matches(&self, request: &MutationRequest) -> bool {
        self.action == request.action && self.table.as_ref().map_or(true, |t| *t == request.table)
    }
}

fn insert_sorted<H>(hooks: &mut Vec<Registered<H>>, entry: Registered<H>) {
    let at = hooks.partition_point(|h| (h.priority, h.seq) <= (entry.priority, entry.seq));
    hooks.insert(at, entry);
}

#[derive(Default)]
pub struct HookRegistry {
    before: Vec<Registered<BeforeHook>>,
    instead_of: Vec<Registered<InsteadOfHook>>,
    after: Vec<Registered<AfterHook>>,
    next_seq: usize,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before", &self.before.len())
            .field("instead_of", &self.instead_of.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn seq(&mut self) -> usize {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn before<F>(&mut self, action: MutationAction, table: Option<TableKey>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(MutationRequest) -> GraphResult<MutationRequest> + Send + Sync + 'static,
    {
        let seq = self.seq();
        insert_sorted(
            &mut self.before,
            Registered { action, table, priority, seq, hook: Arc::new(hook) as BeforeHook },
        );
        self
    }

    pub fn instead_of<F>(&mut self, action: MutationAction, table: Option<TableKey>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&MutationRequest) -> GraphResult<Value> + Send + Sync + 'static,
    {
        let seq = self.seq();
        insert_sorted(
            &mut self.instead_of,
            Registered { action, table, priority, seq, hook: Arc::new(hook) as InsteadOfHook },
        );
        self
    }

    pub fn after<F>(&mut self, action: MutationAction, table: Option<TableKey>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&MutationRequest, Value) -> GraphResult<Value> + Send + Sync + 'static,
    {
        let seq = self.seq();
        insert_sorted(
            &mut self.after,
            Registered { action, table, priority, seq, hook: Arc::new(hook) as AfterHook },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.instead_of.is_empty() && self.after.is_empty()
    }

    /// Run `execute` for `request` wrapped in the matching hooks
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a hook or by `execute`.
    pub fn run<E>(&self, request: MutationRequest, execute: E) -> GraphResult<Value>
    where
        E: FnOnce(&MutationRequest) -> GraphResult<Value>,
    {
        if let Some(replacement) = self.instead_of.iter().find(|h| h.matches(&request)) {
            log::debug!("instead-of hook replaces {:?} on {}", request.action, request.table);
            return (replacement.hook)(&request);
        }

        let mut request = request;
        for entry in &self.before {
            if entry.matches(&request) {
                request = (entry.hook)(request)?;
            }
        }

        let mut result = execute(&request)?;

        for entry in &self.after {
            if entry.matches(&request) {
                result = (entry.hook)(&request, result)?;
            }
        }
        Ok(result)
    }
}
