//! CompileContext - operand stack and local slot accounting for one method.
//!
//! Every instruction the [`MethodEmitter`](crate::MethodEmitter) appends
//! reports its stack effect here. The running maxima become the method's
//! `max_stack` and `max_locals`. Imbalances are generator defects and panic.

/// Stack and local bookkeeping for the method being generated.
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    stack: u16,
    max_stack: u16,
    locals: u16,
    max_locals: u16,
    line: Option<u32>,
}

impl CompileContext {
    /// Create a context for a method whose parameters (and receiver) occupy
    /// `param_slots` local slots.
    pub fn new(param_slots: u16) -> Self {
        Self {
            locals: param_slots,
            max_locals: param_slots,
            ..Self::default()
        }
    }

    /// Record `n` slots pushed.
    pub fn push(&mut self, n: u16) {
        self.stack += n;
        if self.stack > self.max_stack {
            self.max_stack = self.stack;
        }
    }

    /// Record `n` slots popped.
    ///
    /// # Panics
    ///
    /// Panics if the stack holds fewer than `n` slots.
    pub fn pop(&mut self, n: u16) {
        assert!(
            n <= self.stack,
            "unexpected stack count: popping {} from depth {}",
            n,
            self.stack
        );
        self.stack -= n;
    }

    /// Assert the stack is empty, as it must be between statements.
    ///
    /// # Panics
    ///
    /// Panics if any slot is still on the stack.
    pub fn assert_balanced(&self) {
        assert!(
            self.stack == 0,
            "unexpected stack count: {} slots left at statement boundary",
            self.stack
        );
    }

    /// Current stack depth in slots.
    pub fn stack_depth(&self) -> u16 {
        self.stack
    }

    /// Reset the depth when entering code reached only by a branch.
    pub(crate) fn set_stack_depth(&mut self, depth: u16) {
        self.stack = depth;
    }

    /// Deepest stack seen.
    pub fn stack_max(&self) -> u16 {
        self.max_stack
    }

    /// Reserve `n` further local slots.
    pub fn add_local_count(&mut self, n: u16) {
        self.locals += n;
        if self.locals > self.max_locals {
            self.max_locals = self.locals;
        }
    }

    /// Allocate a local variable of `width` slots and return its index.
    pub fn alloc_local(&mut self, width: u16) -> u16 {
        let index = self.locals;
        self.add_local_count(width);
        index
    }

    /// Release the most recently allocated `n` slots.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` slots are allocated.
    pub fn release_locals(&mut self, n: u16) {
        assert!(n <= self.locals, "releasing {} of {} locals", n, self.locals);
        self.locals -= n;
    }

    /// Note an access to slots `index..index + width`, which need not have
    /// been allocated through this context (parameters, fixed scratch slots).
    pub fn note_local(&mut self, index: u16, width: u16) {
        let end = index + width;
        if end > self.max_locals {
            self.max_locals = end;
        }
    }

    /// Highest local slot count seen.
    pub fn local_max(&self) -> u16 {
        self.max_locals
    }

    /// Note that code now belongs to `line`.
    ///
    /// Returns `Some(line)` if the line table needs a new entry.
    pub fn notify_source_line(&mut self, line: u32) -> Option<u32> {
        if self.line == Some(line) {
            return None;
        }
        self.line = Some(line);
        Some(line)
    }

    /// Note that the rule's code has ended.
    ///
    /// Returns the marker line (one past the last line seen), or `None` if no
    /// line was ever noted.
    pub fn notify_source_end(&mut self) -> Option<u32> {
        let end = self.line?.checked_add(1)?;
        self.line = Some(end);
        Some(end)
    }

    /// Last line noted.
    pub fn source_line(&self) -> Option<u32> {
        self.line
    }
}
