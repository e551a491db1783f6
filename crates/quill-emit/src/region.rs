//! Structured exception regions
//!
//! A region moves through `Try -> Catch* -> (Finally | Fault)? -> Closed`.
//! [`RegionStack`] enforces the order at runtime for the raw transition
//! calls. [`TryBlock`] wraps the same transitions in a builder that consumes
//! itself on `finally`, so a catch after a finally does not type-check.

use crate::emit::Emit;
use crate::error::{EmitError, EmitResult};
use crate::instruction::HandlerKind;
use crate::metadata::TypeRef;
use crate::symbols::Label;

/// Where a region is in its clause sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionPhase {
    Try,
    Catch,
    Finally,
    Fault,
    Closed,
}

/// One open (or just closed) protected region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    label: Label,
    phase: RegionPhase,
}

impl Region {
    /// End-of-region label; `leave` instructions target it
    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn phase(&self) -> RegionPhase {
        self.phase
    }

    /// Handler the region is closed from, `None` while still in the try body
    pub fn handler(&self) -> Option<HandlerKind> {
        match self.phase {
            RegionPhase::Catch => Some(HandlerKind::Catch),
            RegionPhase::Finally => Some(HandlerKind::Finally),
            RegionPhase::Fault => Some(HandlerKind::Fault),
            RegionPhase::Try | RegionPhase::Closed => None,
        }
    }
}

/// Open regions, innermost last
#[derive(Debug, Clone, Default)]
pub struct RegionStack {
    open: Vec<Region>,
}

impl RegionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Innermost open region
    pub fn current(&self) -> Option<&Region> {
        self.open.last()
    }

    fn innermost(&self, action: &'static str) -> EmitResult<&Region> {
        self.open
            .last()
            .ok_or_else(|| EmitError::sequence(action, "no exception block is open"))
    }

    /// Check that a catch handler may start
    pub fn check_catch(&self) -> EmitResult<&Region> {
        self.check_handler("begin catch block")
    }

    /// Check that a finally handler may start
    pub fn check_finally(&self) -> EmitResult<&Region> {
        self.check_handler("begin finally block")
    }

    /// Check that a fault handler may start
    pub fn check_fault(&self) -> EmitResult<&Region> {
        self.check_handler("begin fault block")
    }

    fn check_handler(&self, action: &'static str) -> EmitResult<&Region> {
        let region = self.innermost(action)?;
        match region.phase {
            RegionPhase::Try | RegionPhase::Catch => Ok(region),
            RegionPhase::Finally => Err(EmitError::sequence(
                action,
                "region already has a finally handler",
            )),
            RegionPhase::Fault => Err(EmitError::sequence(
                action,
                "region already has a fault handler",
            )),
            RegionPhase::Closed => Err(EmitError::sequence(action, "region is closed")),
        }
    }

    /// Check that the innermost region can be closed
    pub fn check_end(&self) -> EmitResult<&Region> {
        const ACTION: &str = "end exception block";
        let region = self.innermost(ACTION)?;
        match region.phase {
            RegionPhase::Catch | RegionPhase::Finally | RegionPhase::Fault => Ok(region),
            RegionPhase::Try => Err(EmitError::sequence(ACTION, "region has no handler")),
            RegionPhase::Closed => Err(EmitError::sequence(ACTION, "region is closed")),
        }
    }

    pub(crate) fn push(&mut self, label: Label) {
        self.open.push(Region {
            label,
            phase: RegionPhase::Try,
        });
    }

    /// Move the innermost region to `phase`; callers check first
    pub(crate) fn enter(&mut self, phase: RegionPhase) {
        if let Some(region) = self.open.last_mut() {
            region.phase = phase;
        }
    }

    pub(crate) fn close(&mut self) -> Option<Region> {
        self.open.pop().map(|mut region| {
            region.phase = RegionPhase::Closed;
            region
        })
    }
}

/// Builder for one protected region
///
/// ```ignore
/// emitter
///     .try_block(|e| { e.ldarg(0)?.call(&parse)?; Ok(()) })?
///     .catch(format_error, |e| { e.pop()?; Ok(()) })?
///     .finally(|e| { e.ldarg(1)?.call(&dispose)?; Ok(()) })?;
/// ```
#[derive(Debug)]
#[must_use = "a try block must be closed with `finally`, `fault`, `end` or `leave_open`"]
pub struct TryBlock<'e, E: Emit> {
    emitter: &'e mut E,
    region: Label,
}

impl<'e, E: Emit> TryBlock<'e, E> {
    pub(crate) fn begin<F>(emitter: &'e mut E, body: F) -> EmitResult<Self>
    where
        F: FnOnce(&mut E) -> EmitResult<()>,
    {
        let region = emitter.begin_exception_block()?;
        body(&mut *emitter)?;
        Ok(Self { emitter, region })
    }

    /// End-of-region label
    pub fn region(&self) -> &Label {
        &self.region
    }

    /// Fails while a region opened inside one of this block's bodies is still open
    fn ensure_innermost(&self, action: &'static str) -> EmitResult<()> {
        match self.emitter.regions().current() {
            Some(region) if *region.label() == self.region => Ok(()),
            Some(_) => Err(EmitError::sequence(action, "a nested exception block is still open")),
            None => Err(EmitError::sequence(action, "no exception block is open")),
        }
    }

    /// Add a catch clause for `exception_type`
    pub fn catch<F>(self, exception_type: TypeRef, handler: F) -> EmitResult<Self>
    where
        F: FnOnce(&mut E) -> EmitResult<()>,
    {
        self.ensure_innermost("begin catch block")?;
        self.emitter.begin_catch_block(exception_type)?;
        handler(&mut *self.emitter)?;
        Ok(self)
    }

    /// Add a finally clause and close the region
    pub fn finally<F>(self, handler: F) -> EmitResult<&'e mut E>
    where
        F: FnOnce(&mut E) -> EmitResult<()>,
    {
        self.ensure_innermost("begin finally block")?;
        self.emitter.begin_finally_block()?;
        handler(&mut *self.emitter)?;
        self.emitter.end_exception_block()?;
        Ok(self.emitter)
    }

    /// Add a fault clause and close the region
    pub fn fault<F>(self, handler: F) -> EmitResult<&'e mut E>
    where
        F: FnOnce(&mut E) -> EmitResult<()>,
    {
        self.ensure_innermost("begin fault block")?;
        self.emitter.begin_fault_block()?;
        handler(&mut *self.emitter)?;
        self.emitter.end_exception_block()?;
        Ok(self.emitter)
    }

    /// Close the region after its catch clauses
    pub fn end(self) -> EmitResult<&'e mut E> {
        self.ensure_innermost("end exception block")?;
        self.emitter.end_exception_block()?;
        Ok(self.emitter)
    }

    /// Hand the emitter back with the region still open.
    ///
    /// The caller closes it later with the raw region calls.
    pub fn leave_open(self) -> &'e mut E {
        self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(ordinal: usize) -> Label {
        Label::new(ordinal, format!("Label{ordinal}"))
    }

    #[test]
    fn test_catch_needs_open_region() {
        let stack = RegionStack::new();
        let err = stack.check_catch().unwrap_err();
        assert!(err.is_sequencing());
        assert!(stack.check_end().is_err());
    }

    #[test]
    fn test_legal_sequence() {
        let mut stack = RegionStack::new();
        stack.push(label(0));
        assert!(stack.check_end().is_err());

        stack.check_catch().unwrap();
        stack.enter(RegionPhase::Catch);
        stack.check_catch().unwrap();
        stack.enter(RegionPhase::Catch);
        stack.check_finally().unwrap();
        stack.enter(RegionPhase::Finally);
        assert_eq!(stack.check_end().unwrap().handler(), Some(HandlerKind::Finally));

        let closed = stack.close().unwrap();
        assert_eq!(closed.phase(), RegionPhase::Closed);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_catch_after_finally_fails() {
        let mut stack = RegionStack::new();
        stack.push(label(0));
        stack.enter(RegionPhase::Finally);
        assert!(stack.check_catch().unwrap_err().is_sequencing());
        assert!(stack.check_finally().unwrap_err().is_sequencing());
        assert!(stack.check_fault().is_err());
    }

    #[test]
    fn test_nested_regions() {
        let mut stack = RegionStack::new();
        stack.push(label(0));
        stack.push(label(1));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current().unwrap().label(), &label(1));
        stack.enter(RegionPhase::Fault);
        stack.close();
        assert_eq!(stack.current().unwrap().phase(), RegionPhase::Try);
    }
}
