//! Fences and queue progress for the Vulkan driver.
//!
//! The queue worker signals fences as it retires submissions; host threads
//! block on them with a condition variable. Waits have no timeout.

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use parking_lot::{Condvar, Mutex};

use crate::driver::{ObjectCounts, ObjectTable};

#[derive(Debug, Default)]
struct FenceState {
    /// Signaled flag per fence.
    fences: ObjectTable<bool>,
    submitted: u64,
    completed: u64,
}

/// Every fence of one device plus the submitted/completed submission
/// counters of its queue.
#[derive(Debug, Default)]
pub(super) struct FenceTable {
    state: Mutex<FenceState>,
    signaled: Condvar,
}

impl FenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, signaled: bool) -> vk::Fence {
        vk::Fence::from_raw(self.state.lock().fences.insert(signaled))
    }

    pub fn destroy(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences.remove(fence.as_raw()).is_some()
    }

    /// `vkGetFenceStatus`: `SUCCESS` when signaled, `NOT_READY` otherwise.
    pub fn status(&self, fence: vk::Fence) -> VkResult<()> {
        match self.state.lock().fences.get(fence.as_raw()) {
            Some(true) => Ok(()),
            Some(false) => Err(vk::Result::NOT_READY),
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    pub fn reset(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(fence.as_raw())
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        *signaled = false;
        Ok(())
    }

    /// Block until `fence` is signaled.
    pub fn wait(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        loop {
            match state.fences.get(fence.as_raw()) {
                Some(true) => return Ok(()),
                Some(false) => self.signaled.wait(&mut state),
                None => return Err(vk::Result::ERROR_UNKNOWN),
            }
        }
    }

    /// Signal a fence outside of queue submission (image acquisition).
    pub fn signal(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if let Some(signaled) = state.fences.get_mut(fence.as_raw()) {
            *signaled = true;
        }
        self.signaled.notify_all();
    }

    /// Fails when the fence is unknown or already signaled.
    pub fn mark_submitted(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        match state.fences.get(fence.as_raw()) {
            Some(false) => {
                state.submitted += 1;
                Ok(())
            }
            Some(true) => Err(vk::Result::ERROR_VALIDATION_FAILED_EXT),
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    /// Called by the queue worker once a submission has executed.
    pub fn complete_submission(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.completed += 1;
        if let Some(signaled) = state.fences.get_mut(fence.as_raw()) {
            *signaled = true;
        }
        self.signaled.notify_all();
    }

    /// Undo `mark_submitted` for a submission the queue never received.
    pub fn abandon_submission(&self) {
        let mut state = self.state.lock();
        state.submitted = state.submitted.saturating_sub(1);
        self.signaled.notify_all();
    }

    /// `vkQueueWaitIdle`.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.completed < state.submitted {
            self.signaled.wait(&mut state);
        }
    }

    pub fn counts(&self) -> ObjectCounts {
        self.state.lock().fences.counts()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fence_lifecycle() {
        let fences = FenceTable::new();
        let fence = fences.create(false);
        assert_eq!(fences.status(fence), Err(vk::Result::NOT_READY));

        fences.signal(fence);
        assert_eq!(fences.status(fence), Ok(()));
        assert_eq!(fences.wait(fence), Ok(()));

        fences.reset(fence).unwrap();
        assert_eq!(fences.status(fence), Err(vk::Result::NOT_READY));

        assert!(fences.destroy(fence));
        assert!(!fences.destroy(fence));
        assert_eq!(fences.status(fence), Err(vk::Result::ERROR_UNKNOWN));
    }

    #[test]
    fn test_signaled_fence_cannot_be_submitted() {
        let fences = FenceTable::new();
        let fence = fences.create(true);
        assert_eq!(
            fences.mark_submitted(fence),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
    }

    #[test]
    fn test_wait_blocks_until_completion() {
        let fences = Arc::new(FenceTable::new());
        let fence = fences.create(false);
        fences.mark_submitted(fence).unwrap();

        let worker = {
            let fences = Arc::clone(&fences);
            std::thread::spawn(move || fences.complete_submission(fence))
        };
        fences.wait(fence).unwrap();
        fences.wait_idle();
        worker.join().unwrap();
        assert_eq!(fences.status(fence), Ok(()));
    }
}
