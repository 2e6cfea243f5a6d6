//! Fake cooperative runtime
//!
//! Stands in for the target runtime's thread context, its `resuming` and
//! `suspending` flags and its blocking intrinsics. Every push and pop is
//! traced so stack discipline can be checked after a run.

use super::value::Value;
use super::{EvalError, EvalResult};
use crate::ir::MethodRef;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum StackEvent {
    Push(Value),
    Pop(Value),
}

/// Save/restore stack of the current thread
#[derive(Debug, Default)]
pub struct ThreadContext {
    stack: Vec<Value>,
    trace: Vec<StackEvent>,
}

impl ThreadContext {
    pub fn push(&mut self, value: Value) {
        self.trace.push(StackEvent::Push(value.clone()));
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> EvalResult<Value> {
        let value = self.stack.pop().ok_or(EvalError::EmptyThreadStack)?;
        self.trace.push(StackEvent::Pop(value.clone()));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.stack
    }

    pub fn trace(&self) -> &[StackEvent] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn pushed(&self) -> Vec<&Value> {
        self.trace
            .iter()
            .filter_map(|e| match e {
                StackEvent::Push(v) => Some(v),
                StackEvent::Pop(_) => None,
            })
            .collect()
    }

    pub fn popped(&self) -> Vec<&Value> {
        self.trace
            .iter()
            .filter_map(|e| match e {
                StackEvent::Pop(v) => Some(v),
                StackEvent::Push(_) => None,
            })
            .collect()
    }
}

/// Behaviour of one blocking intrinsic
#[derive(Debug, Clone)]
pub struct ScriptedIntrinsic {
    /// Result delivered when the call completes
    pub result: Value,
    /// Suspend on the first call instead of completing at once
    pub suspends: bool,
}

impl ScriptedIntrinsic {
    pub fn suspending(result: Value) -> Self {
        Self {
            result,
            suspends: true,
        }
    }

    pub fn immediate(result: Value) -> Self {
        Self {
            result,
            suspends: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Enter,
    Exit,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    thread: ThreadContext,
    resuming: bool,
    suspending: bool,
    intrinsics: FxHashMap<MethodRef, ScriptedIntrinsic>,
    calls: FxHashMap<MethodRef, u32>,
    monitor_log: Vec<MonitorEvent>,
    monitor_suspensions: u32,
    monitor_pending: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&mut self, method: MethodRef, intrinsic: ScriptedIntrinsic) {
        self.intrinsics.insert(method, intrinsic);
    }

    pub fn is_intrinsic(&self, method: &MethodRef) -> bool {
        self.intrinsics.contains_key(method)
    }

    /// Make the next `count` suspend-aware monitor acquisitions suspend once
    pub fn suspend_monitor_enters(&mut self, count: u32) {
        self.monitor_suspensions = count;
    }

    pub fn resuming(&self) -> bool {
        self.resuming
    }

    pub fn suspending(&self) -> bool {
        self.suspending
    }

    pub fn thread(&self) -> &ThreadContext {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut ThreadContext {
        &mut self.thread
    }

    /// Times `method` was entered, resumed calls included
    pub fn calls(&self, method: &MethodRef) -> u32 {
        self.calls.get(method).copied().unwrap_or(0)
    }

    pub fn monitor_log(&self) -> &[MonitorEvent] {
        &self.monitor_log
    }

    /// Switch from a finished suspension to the resumed re-invocation
    pub fn begin_resume(&mut self) {
        self.suspending = false;
        self.resuming = true;
    }

    /// Resume directly from a prepared stack, bottom first
    pub fn resume_from(&mut self, stack: Vec<Value>) {
        for value in stack {
            self.thread.stack.push(value);
        }
        self.suspending = false;
        self.resuming = true;
    }

    pub(super) fn call_intrinsic(&mut self, method: &MethodRef) -> Option<Value> {
        let intrinsic = self.intrinsics.get(method)?.clone();
        *self.calls.entry(method.clone()).or_insert(0) += 1;
        if self.resuming {
            self.resuming = false;
            tracing::trace!(method = %method, "intrinsic resumed");
            return Some(intrinsic.result);
        }
        if intrinsic.suspends {
            self.suspending = true;
            tracing::trace!(method = %method, "intrinsic suspended");
            return Some(Value::Null);
        }
        Some(intrinsic.result)
    }

    /// Suspend-aware acquisition. While resuming, only the acquisition that
    /// suspended completes; a re-executed one is already held.
    pub(super) fn monitor_enter(&mut self) {
        if self.resuming {
            if self.monitor_pending {
                self.monitor_pending = false;
                self.resuming = false;
                self.monitor_log.push(MonitorEvent::Enter);
            }
            return;
        }
        if self.monitor_suspensions > 0 {
            self.monitor_suspensions -= 1;
            self.monitor_pending = true;
            self.suspending = true;
            return;
        }
        self.monitor_log.push(MonitorEvent::Enter);
    }

    /// Blocking acquisition
    pub(super) fn monitor_enter_sync(&mut self) {
        self.monitor_log.push(MonitorEvent::Enter);
    }

    pub(super) fn monitor_exit(&mut self) {
        self.monitor_log.push(MonitorEvent::Exit);
    }
}
