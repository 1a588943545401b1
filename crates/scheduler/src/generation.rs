//! Session generations
//!
//! A [`Generation`] counter advances whenever the document handle is replaced,
//! the zoom changes, or the session ends. Work issued under an older
//! generation holds a [`GenerationToken`] that reports itself stale, and its
//! results are discarded without touching the cache.

use std::cell::Cell;
use std::rc::Rc;

/// Generation counter owned by one viewer
///
/// Clones share the same counter.
///
/// # Example
///
/// ```
/// use folio_scheduler::Generation;
///
/// let generation = Generation::new();
/// let token = generation.token();
/// assert!(token.is_current());
///
/// generation.advance();
/// assert!(token.is_stale());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Rc<Cell<u64>>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.get()
    }

    /// Invalidate every outstanding token. Returns the new generation.
    pub fn advance(&self) -> u64 {
        let next = self.current.get() + 1;
        self.current.set(next);
        next
    }

    /// Issue a token bound to the current generation
    pub fn token(&self) -> GenerationToken {
        GenerationToken { issued: self.current.get(), current: Rc::clone(&self.current) }
    }
}

/// Handle to the generation work was issued under
#[derive(Debug, Clone)]
pub struct GenerationToken {
    issued: u64,
    current: Rc<Cell<u64>>,
}

impl GenerationToken {
    /// Generation this token was issued under
    pub fn generation(&self) -> u64 {
        self.issued
    }

    pub fn is_current(&self) -> bool {
        self.current.get() == self.issued
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}
