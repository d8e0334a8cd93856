use tracing::debug;

use super::Selection;
use crate::error::SelectionError;
use crate::topology::EntityKind;

/// One frame of the context stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    depth: usize,
    selection: Option<Selection>,
}

impl Context {
    /// Returns the stack depth of this frame; the root is at depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the depth of the parent frame, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.depth.checked_sub(1)
    }

    /// Returns the focused selection, or `None` for the root.
    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Returns the kind of the focused selection, or `None` for the root.
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        self.selection.as_ref().map(Selection::kind)
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.selection.is_none()
    }
}

/// Stack of selection contexts for chained "drill down, then end" querying.
///
/// Frames are only ever removed by an explicit pop; the stack never
/// corrects an unbalanced push/pop sequence on its own.
#[derive(Debug, Clone)]
pub struct ContextStack {
    frames: Vec<Context>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self {
            frames: vec![Context {
                depth: 0,
                selection: None,
            }],
        }
    }
}

impl ContextStack {
    /// Creates a stack holding only the root context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Focuses `selection` in a new frame on top of the stack.
    pub fn push(&mut self, selection: Selection) -> &Context {
        let depth = self.frames.len();
        debug!(
            depth,
            kind = %selection.kind(),
            count = selection.len(),
            "Pushed selection context"
        );
        self.frames.push(Context {
            depth,
            selection: Some(selection),
        });
        self.current()
    }

    /// Returns the frame on top of the stack.
    #[must_use]
    pub fn current(&self) -> &Context {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    /// Removes the top frame and returns it, restoring its parent.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyContext`] if only the root remains.
    pub fn pop(&mut self) -> Result<Context, SelectionError> {
        if self.frames.len() <= 1 {
            return Err(SelectionError::EmptyContext);
        }
        let popped = self.frames.pop().ok_or(SelectionError::EmptyContext)?;
        debug!(depth = popped.depth, "Popped selection context");
        Ok(popped)
    }

    /// Pops exactly `count` frames.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyContext`] without popping anything if
    /// fewer than `count` frames sit above the root.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Context>, SelectionError> {
        if count > self.depth() {
            return Err(SelectionError::EmptyContext);
        }
        (0..count).map(|_| self.pop()).collect()
    }

    /// Pops every frame above the root.
    pub fn reset(&mut self) {
        if self.frames.len() > 1 {
            debug!(from = self.depth(), "Reset selection contexts");
            self.frames.truncate(1);
        }
    }

    /// Returns the depth of the top frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }
}
