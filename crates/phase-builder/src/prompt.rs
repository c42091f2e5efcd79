//! Operator prompt seam: blocking confirmations and alerts.

use parking_lot::Mutex;

pub const CONFIRM_DELETE_PHASE: &str = "Are you sure you want to delete this phase?";
pub const CONFIRM_DELETE_ACTIVITY: &str = "Are you sure you want to delete this activity?";
pub const DUPLICATE_ACTIVITY_ALERT: &str = "Duplicate activities are not allowed in one phase.";

pub trait UserPrompt: Send + Sync {
    /// Ask a yes/no question. `false` aborts the pending action.
    fn confirm(&self, message: &str) -> bool;

    /// Show a blocking notice.
    fn alert(&self, message: &str);
}

/// Prompt that answers every confirmation the same way and remembers what
/// it was shown.
#[derive(Debug)]
pub struct AutoConfirm {
    answer: bool,
    confirms: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl AutoConfirm {
    pub fn yes() -> Self {
        Self::answering(true)
    }

    pub fn no() -> Self {
        Self::answering(false)
    }

    fn answering(answer: bool) -> Self {
        Self {
            answer,
            confirms: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn confirms(&self) -> Vec<String> {
        self.confirms.lock().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }
}

impl UserPrompt for AutoConfirm {
    fn confirm(&self, message: &str) -> bool {
        self.confirms.lock().push(message.to_string());
        self.answer
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }
}
