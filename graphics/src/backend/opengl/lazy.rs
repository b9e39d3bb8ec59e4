//! Deferred creation of GL objects.
//!
//! Factories may run on any thread but GL objects can only be created on the
//! context thread, so every OpenGL native starts out declared and is
//! materialized the first time replay needs it.

use parking_lot::Mutex;

use crate::error::GraphicsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LazyState {
    Declared,
    Materializing,
    Ready(u32),
}

/// A GL object name that is created on first use.
#[derive(Debug)]
pub(crate) struct LazyGlObject {
    state: Mutex<LazyState>,
}

impl Default for LazyGlObject {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyGlObject {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LazyState::Declared),
        }
    }

    /// Return the object's name, running `create` if it does not exist yet.
    ///
    /// A failed `create` leaves the object declared so a later replay can try
    /// again. Re-entering while `create` runs is an error.
    pub fn ensure_created(
        &self,
        create: impl FnOnce() -> Result<u32, GraphicsError>,
    ) -> Result<u32, GraphicsError> {
        {
            let mut state = self.state.lock();
            match *state {
                LazyState::Ready(name) => return Ok(name),
                LazyState::Materializing => {
                    return Err(GraphicsError::state("GL object is already being created"));
                }
                LazyState::Declared => *state = LazyState::Materializing,
            }
        }

        let result = create();
        let mut state = self.state.lock();
        match result {
            Ok(name) => {
                *state = LazyState::Ready(name);
                Ok(name)
            }
            Err(err) => {
                *state = LazyState::Declared;
                Err(err)
            }
        }
    }

    /// The name, if the object has been created.
    pub fn name(&self) -> Option<u32> {
        match *self.state.lock() {
            LazyState::Ready(name) => Some(name),
            _ => None,
        }
    }

    /// Take the name out for destruction, leaving the object declared.
    pub fn take(&self) -> Option<u32> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, LazyState::Declared) {
            LazyState::Ready(name) => Some(name),
            other => {
                *state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_once() {
        let object = LazyGlObject::new();
        let mut calls = 0;
        assert_eq!(
            object.ensure_created(|| {
                calls += 1;
                Ok(7)
            }),
            Ok(7)
        );
        assert_eq!(object.ensure_created(|| Ok(8)), Ok(7));
        assert_eq!(calls, 1);
        assert_eq!(object.name(), Some(7));
    }

    #[test]
    fn test_failed_create_can_retry() {
        let object = LazyGlObject::new();
        assert!(
            object
                .ensure_created(|| Err(GraphicsError::state("no")))
                .is_err()
        );
        assert_eq!(object.name(), None);
        assert_eq!(object.ensure_created(|| Ok(3)), Ok(3));
    }

    #[test]
    fn test_reentrant_create_fails() {
        let object = LazyGlObject::new();
        let result = object.ensure_created(|| {
            assert!(object.ensure_created(|| Ok(1)).is_err());
            Ok(2)
        });
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_take() {
        let object = LazyGlObject::new();
        assert_eq!(object.take(), None);
        object.ensure_created(|| Ok(5)).unwrap();
        assert_eq!(object.take(), Some(5));
        assert_eq!(object.name(), None);
    }
}
