use std::fmt::Display;

/// Operations guarded by an idempotency key. The key string is derived from the
/// operation name and its target so that every trigger for the same target collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotentOperation {
    CreatePaymentLink,
}

impl IdempotentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotentOperation::CreatePaymentLink => "create-link",
        }
    }

    pub fn key_for(&self, target: &str) -> String {
        format!("{}:{}", self.as_str(), target.trim())
    }
}

impl Display for IdempotentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    AlreadyHeld,
}
