pub type LyrvidResult<T> = Result<T, LyrvidError>;

#[derive(thiserror::Error, Debug)]
pub enum LyrvidError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LyrvidError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(LyrvidError::parse("x").to_string().contains("parse error:"));
        assert!(
            LyrvidError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            LyrvidError::render("x")
                .to_string()
                .contains("render error:")
        );
        assert!(
            LyrvidError::encode("x")
                .to_string()
                .contains("encode error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = LyrvidError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
