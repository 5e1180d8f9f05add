//! .NET CoreCLR hosting for the injectable bootstrap

mod bootstrap;
mod hosting;

pub use bootstrap::{call_guarded, call_with_block, load_and_call, Stage};
pub use hosting::{init_dotnet_host, EntryPointFn, ManagedEntryPoint, ManagedHost, NetCoreHost, UnmanagedEntryPoint};

use abi::{ParamsError, StatusCode};

/// Errors raised between reading the block and calling the managed method
#[derive(Debug, thiserror::Error)]
pub enum NetClrError {
    #[error("Invalid parameter block: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("Failed to load hostfxr: {0}")]
    HostfxrNotFound(String),
    #[error("Failed to initialize .NET runtime: {0}")]
    RuntimeInit(String),
    #[error("Failed to get delegate loader: {0}")]
    DelegateLoader(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Failed to invoke managed method: {0}")]
    Invocation(String),
}

impl NetClrError {
    /// The reserved code returned across the export boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_) => StatusCode::InvalidParams,
            Self::HostfxrNotFound(_) => StatusCode::HostfxrNotFound,
            Self::RuntimeInit(_) => StatusCode::RuntimeConfig,
            Self::DelegateLoader(_) => StatusCode::DelegateLoader,
            Self::MethodNotFound(_) => StatusCode::MethodNotFound,
            Self::Invocation(_) => StatusCode::Invocation,
        }
    }

    /// The stage that was running when this error ended the call.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidParams(_) => Stage::Idle,
            Self::HostfxrNotFound(_) | Self::RuntimeInit(_) => Stage::RuntimeResolving,
            Self::DelegateLoader(_) | Self::MethodNotFound(_) => Stage::TypeResolving,
            Self::Invocation(_) => Stage::Invoking,
        }
    }
}
