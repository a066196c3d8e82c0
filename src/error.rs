use thiserror::Error;

/// Domain errors for wallet management and trade execution.
///
/// Per-wallet errors (`NoRoute`, `SwapBuildFailed`, `InsufficientBalance`,
/// `SubmitFailed`, `ConfirmTimeout`) are captured into that wallet's outcome
/// and never abort a run. Run-level errors (`EmptySelection`,
/// `InsufficientFunds`, `InvalidRequest`) abort before any transaction is
/// issued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TradeError {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("no wallets selected")]
    EmptySelection,

    #[error("invalid operation request: {0}")]
    InvalidRequest(String),

    #[error("insufficient master funds: required {required} lamports, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("insufficient wallet balance: {available} lamports after rent and buffer")]
    InsufficientBalance { available: u64 },

    #[error("no route: {0}")]
    NoRoute(String),

    #[error("swap build failed: {0}")]
    SwapBuildFailed(String),

    #[error("transaction submit failed: {0}")]
    SubmitFailed(String),

    #[error("confirmation timeout for {signature}")]
    ConfirmTimeout { signature: String },

    #[error("balance unavailable: {0}")]
    Unavailable(String),
}

impl TradeError {
    /// Short stable classification label, suitable for aggregating failure
    /// reasons across a run.
    pub fn classification(&self) -> &'static str {
        match self {
            TradeError::InvalidKeyFormat(_) => "InvalidKeyFormat",
            TradeError::EmptySelection => "EmptySelection",
            TradeError::InvalidRequest(_) => "InvalidRequest",
            TradeError::InsufficientFunds { .. } => "InsufficientFunds",
            TradeError::InsufficientBalance { .. } => "InsufficientBalance",
            TradeError::NoRoute(_) => "NoRoute",
            TradeError::SwapBuildFailed(_) => "SwapBuildFailed",
            TradeError::SubmitFailed(_) => "SubmitFailed",
            TradeError::ConfirmTimeout { .. } => "ConfirmTimeout",
            TradeError::Unavailable(_) => "Unavailable",
        }
    }

    /// Whether this error aborts a run before any wallet task starts.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            TradeError::EmptySelection
                | TradeError::InvalidRequest(_)
                | TradeError::InsufficientFunds { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_labels() {
        let err = TradeError::NoRoute("no path SOL->X".to_string());
        assert_eq!(err.classification(), "NoRoute");

        let err = TradeError::InsufficientBalance { available: 0 };
        assert_eq!(err.classification(), "InsufficientBalance");
    }

    #[test]
    fn test_preflight_detection() {
        assert!(TradeError::EmptySelection.is_preflight());
        assert!(TradeError::InsufficientFunds {
            required: 2_000_000_000,
            available: 1_000_000_000
        }
        .is_preflight());
        assert!(!TradeError::SubmitFailed("rpc down".to_string()).is_preflight());
    }
}
