use serde::{Deserialize, Serialize};

/// Reserved return codes of `LoadAndCallMethod`.
///
/// They sit at the very bottom of the `i32` range; any other value is the
/// managed method's own result, passed through unchanged. Managed entry
/// points must not return these values.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// The block pointer, or one of its string pointers, was null, or a
    /// string was not valid UTF-16.
    InvalidParams = i32::MIN,
    /// `hostfxr` could not be located or loaded. Is .NET installed?
    HostfxrNotFound = i32::MIN + 1,
    /// The runtime could not be initialised from the runtime config
    /// (missing file, malformed config, runtime version not installed, or
    /// incompatible with a runtime already running in the process).
    RuntimeConfig = i32::MIN + 2,
    /// The runtime did not hand out a delegate loader for the assembly.
    DelegateLoader = i32::MIN + 3,
    /// Assembly, type or method not found, or the method is not an
    /// `[UnmanagedCallersOnly]` entry point of the expected shape.
    /// Type paths look like `Namespace.Type, Assembly`.
    MethodNotFound = i32::MIN + 4,
    /// The entry point was resolved but calling it failed on this side.
    Invocation = i32::MIN + 5,
}

impl StatusCode {
    pub const ALL: [StatusCode; 6] = [
        Self::InvalidParams,
        Self::HostfxrNotFound,
        Self::RuntimeConfig,
        Self::DelegateLoader,
        Self::MethodNotFound,
        Self::Invocation,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_raw(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// True for failures that happen before any assembly is touched.
    pub fn is_runtime_resolution(self) -> bool {
        matches!(self, Self::HostfxrNotFound | Self::RuntimeConfig)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidParams => "parameter block or one of its strings is null or not valid UTF-16",
            Self::HostfxrNotFound => "hostfxr was not found, is .NET installed?",
            Self::RuntimeConfig => "runtime could not be initialised from the runtimeconfig.json",
            Self::DelegateLoader => "runtime did not provide a delegate loader for the assembly",
            Self::MethodNotFound => {
                "class or method not found, use \"Namespace.Type, Assembly\" and an [UnmanagedCallersOnly] method"
            }
            Self::Invocation => "resolved entry point could not be invoked",
        }
    }
}

/// What a caller learns from a `LoadAndCallMethod` return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The managed method ran and returned this value.
    Completed(i32),
    /// The managed method was never reached.
    Failed(StatusCode),
}

impl Outcome {
    pub fn from_raw(code: i32) -> Self {
        match StatusCode::from_raw(code) {
            Some(status) => Self::Failed(status),
            None => Self::Completed(code),
        }
    }

    pub fn into_raw(self) -> i32 {
        match self {
            Self::Completed(value) => value,
            Self::Failed(status) => status.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reserved_codes_decode() {
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::from_raw(status.code()), Some(status));
            assert_eq!(Outcome::from_raw(status.code()), Outcome::Failed(status));
        }
    }

    #[test]
    fn test_reserved_codes_are_distinct() {
        let codes: HashSet<i32> = StatusCode::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), StatusCode::ALL.len());
    }

    #[test]
    fn test_managed_results_pass_through() {
        for value in [0, 1, 3, 42, -1, -3, i32::MAX, i32::MIN + 6] {
            assert_eq!(Outcome::from_raw(value), Outcome::Completed(value));
            assert_eq!(Outcome::from_raw(value).into_raw(), value);
        }
    }

    #[test]
    fn test_runtime_resolution_class() {
        assert!(StatusCode::HostfxrNotFound.is_runtime_resolution());
        assert!(StatusCode::RuntimeConfig.is_runtime_resolution());
        assert!(!StatusCode::MethodNotFound.is_runtime_resolution());
        assert!(!StatusCode::InvalidParams.is_runtime_resolution());
    }
}
