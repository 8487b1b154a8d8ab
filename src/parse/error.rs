use thiserror::Error;

/// Errors produced while tokenizing raw prompt text.
///
/// Both are fatal to the single transformation request that carried the
/// prompt; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("unbalanced emphasis parenthesis at offset {offset}")]
    UnbalancedParens { offset: usize },

    #[error("malformed weight ':{token}' at offset {offset}")]
    MalformedWeight { token: String, offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PromptError::UnbalancedParens { offset: 4 };
        assert_eq!(err.to_string(), "unbalanced emphasis parenthesis at offset 4");

        let err = PromptError::MalformedWeight {
            token: "1.2.3".into(),
            offset: 7,
        };
        assert_eq!(err.to_string(), "malformed weight ':1.2.3' at offset 7");
    }
}
