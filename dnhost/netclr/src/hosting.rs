use abi::{ParamsError, UserData};
use log::{debug, info};
use netcorehost::hostfxr::{AssemblyDelegateLoader, HostfxrContext, InitializedForRuntimeConfig};
use netcorehost::{hostfxr, nethost, pdcstring::PdCString};
use once_cell::sync::OnceCell;
use widestring::U16CStr;
use crate::NetClrError;

static HOSTFXR: OnceCell<hostfxr::Hostfxr> = OnceCell::new();

/// Shape every entry point must have: `[UnmanagedCallersOnly] static int M(nint data)`.
pub type EntryPointFn = extern "system" fn(*mut u8) -> i32;

/// What a hosting API has to offer for the bootstrap sequence to run.
///
/// Each step owns one failure class; implementations report it through the
/// matching `NetClrError` variant.
pub trait ManagedHost {
    type Runtime;
    type Resolver;
    type EntryPoint: ManagedEntryPoint;

    /// Load and initialize the runtime described by a runtimeconfig.json.
    fn resolve_runtime(&self, runtime_config_path: &U16CStr) -> Result<Self::Runtime, NetClrError>;

    /// Get something that can turn type and method names into callables.
    fn resolver(&self, runtime: &Self::Runtime, library_path: &U16CStr) -> Result<Self::Resolver, NetClrError>;

    /// Resolve `type_path::method_name` with the fixed entry point shape.
    fn resolve_method(
        &self,
        resolver: &Self::Resolver,
        type_path: &U16CStr,
        method_name: &U16CStr,
    ) -> Result<Self::EntryPoint, NetClrError>;
}

/// One opaque pointer in, one integer out.
pub trait ManagedEntryPoint {
    /// # Safety
    ///
    /// Runs foreign code. `user_data` must be whatever the managed method
    /// expects and stay valid until this returns.
    unsafe fn invoke(&self, user_data: UserData<'_>) -> Result<i32, NetClrError>;
}

pub struct UnmanagedEntryPoint(EntryPointFn);

impl UnmanagedEntryPoint {
    pub fn new(function: EntryPointFn) -> Self {
        Self(function)
    }
}

impl ManagedEntryPoint for UnmanagedEntryPoint {
    unsafe fn invoke(&self, user_data: UserData<'_>) -> Result<i32, NetClrError> {
        Ok((self.0)(user_data.as_ptr()))
    }
}

/// Load hostfxr through nethost, once per process.
///
/// Later calls reuse the handle loaded by the first one.
pub fn init_dotnet_host() -> Result<&'static hostfxr::Hostfxr, NetClrError> {
    HOSTFXR.get_or_try_init(|| {
        info!("Loading hostfxr");
        nethost::load_hostfxr().map_err(|e| NetClrError::HostfxrNotFound(e.to_string()))
    })
}

fn pd_string(value: &U16CStr, field: &'static str) -> Result<PdCString, NetClrError> {
    let value = value
        .to_string()
        .map_err(|_| NetClrError::InvalidParams(ParamsError::NotUtf16(field)))?;
    PdCString::from_os_str(value).map_err(|_| NetClrError::InvalidParams(ParamsError::InteriorNul(field)))
}

/// hostfxr-backed host.
///
/// A second call in the same process reuses the loaded hostfxr and gets a
/// secondary context on the runtime that is already running; hostfxr rejects
/// it if the runtime config is not compatible with that runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetCoreHost;

impl ManagedHost for NetCoreHost {
    type Runtime = HostfxrContext<InitializedForRuntimeConfig>;
    type Resolver = AssemblyDelegateLoader;
    type EntryPoint = UnmanagedEntryPoint;

    fn resolve_runtime(&self, runtime_config_path: &U16CStr) -> Result<Self::Runtime, NetClrError> {
        let hostfxr = init_dotnet_host()?;
        let config = pd_string(runtime_config_path, "runtime_config_path")?;
        debug!("Initializing runtime from {}", runtime_config_path.display());

        hostfxr
            .initialize_for_runtime_config(config)
            .map_err(|e| NetClrError::RuntimeInit(e.to_string()))
    }

    fn resolver(&self, runtime: &Self::Runtime, library_path: &U16CStr) -> Result<Self::Resolver, NetClrError> {
        let assembly = pd_string(library_path, "library_path")?;
        runtime
            .get_delegate_loader_for_assembly(assembly)
            .map_err(|e| NetClrError::DelegateLoader(e.to_string()))
    }

    fn resolve_method(
        &self,
        resolver: &Self::Resolver,
        type_path: &U16CStr,
        method_name: &U16CStr,
    ) -> Result<Self::EntryPoint, NetClrError> {
        let type_name = pd_string(type_path, "type_path")?;
        let method = pd_string(method_name, "method_name")?;

        // hostfxr loads the assembly here, so a missing assembly, type or
        // method all surface from this call.
        let function = resolver
            .get_function_with_unmanaged_callers_only::<EntryPointFn>(&type_name, &method)
            .map_err(|e| {
                NetClrError::MethodNotFound(format!(
                    "{}::{}: {}",
                    type_path.display(),
                    method_name.display(),
                    e
                ))
            })?;

        Ok(UnmanagedEntryPoint::new(*function))
    }
}
