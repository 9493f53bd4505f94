use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::errors::CatalogError;

/// Shared flag a caller flips to abandon an in-flight catalog flow.
///
/// Flows check it before every provider call and every store mutation.
/// Steps that already completed are not rolled back.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), CatalogError> {
        if self.is_cancelled() {
            log::warn!("catalog operation cancelled");
            return Err(CatalogError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = Cancellation::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(CatalogError::Cancelled)));
    }
}
