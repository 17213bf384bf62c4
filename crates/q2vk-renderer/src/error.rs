// error.rs — renderer error kinds
//
// Subsystems never kill the process; they return one of these and the
// driver decides between retry, fallback, and abort.

use q2vk_common::qfiles::FormatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdError {
    /// Device lost at startup or an incompatible mode; fatal.
    InitializationFailure(String),
    /// Bad asset header or contents. Non-fatal for non-essential assets
    /// (a placeholder is substituted); fatal for the worldmodel.
    MalformedAsset(String),
    /// Recognized format, unsupported revision.
    UnsupportedVersion(String),
    /// The device was lost at runtime; triggers a swapchain rebuild.
    DeviceLost,
    /// A GPU allocation failed after eviction and one retry.
    OutOfMemory(String),
    /// Scrap_AllocBlock found no room; the pic falls back to its own image.
    AtlasFull,
}

impl std::fmt::Display for RdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RdError::InitializationFailure(msg) => write!(f, "initialization failure: {}", msg),
            RdError::MalformedAsset(name) => write!(f, "malformed asset: {}", name),
            RdError::UnsupportedVersion(name) => write!(f, "unsupported version: {}", name),
            RdError::DeviceLost => write!(f, "device lost"),
            RdError::OutOfMemory(what) => write!(f, "out of memory: {}", what),
            RdError::AtlasFull => write!(f, "scrap atlas full"),
        }
    }
}

impl std::error::Error for RdError {}

impl RdError {
    /// Tag a format-level failure with the asset it came from.
    pub fn from_format(err: FormatError, name: &str) -> Self {
        match err {
            FormatError::BadVersion => RdError::UnsupportedVersion(name.to_string()),
            _ => RdError::MalformedAsset(format!("{}: {}", name, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_mapping() {
        let e = RdError::from_format(FormatError::BadVersion, "maps/base1.bsp");
        assert_eq!(e, RdError::UnsupportedVersion("maps/base1.bsp".to_string()));
        let e = RdError::from_format(FormatError::Truncated, "maps/base1.bsp");
        assert!(matches!(e, RdError::MalformedAsset(_)));
    }
}
