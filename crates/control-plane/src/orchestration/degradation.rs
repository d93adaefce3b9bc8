use std::sync::atomic::{AtomicBool, Ordering};

use contracts::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationMode {
    None,
    ReadOnly,
}

/// Process-wide write gate. Every state-mutating handler calls
/// `require_write_allowed` before touching storage.
pub struct DegradationController {
    read_only: AtomicBool,
}

impl DegradationController {
    pub fn new(mode: DegradationMode) -> Self {
        Self {
            read_only: AtomicBool::new(mode == DegradationMode::ReadOnly),
        }
    }

    pub fn mode(&self) -> DegradationMode {
        if self.read_only.load(Ordering::SeqCst) {
            DegradationMode::ReadOnly
        } else {
            DegradationMode::None
        }
    }

    pub fn set_mode(&self, mode: DegradationMode) {
        self.read_only
            .store(mode == DegradationMode::ReadOnly, Ordering::SeqCst);
    }

    pub fn require_write_allowed(&self) -> Result<(), ApiError> {
        if self.mode() == DegradationMode::ReadOnly {
            return Err(ApiError::new(
                contracts::ApiErrorKind::Internal,
                "service is in read-only mode",
            ));
        }
        Ok(())
    }
}

impl Default for DegradationController {
    fn default() -> Self {
        Self::new(DegradationMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_blocks_writes() {
        let controller = DegradationController::new(DegradationMode::ReadOnly);
        assert!(controller.require_write_allowed().is_err());
        controller.set_mode(DegradationMode::None);
        assert!(controller.require_write_allowed().is_ok());
    }
}
