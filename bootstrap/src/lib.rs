// Injectable bootstrap: once loaded into a process, starts the .NET runtime
// and calls one [UnmanagedCallersOnly] method described by a LoadParams block.

use netclr::NetCoreHost;

pub use abi::{LoadParams, LoadRequest, Outcome, StatusCode};

#[cfg(feature = "xtralog")]
fn init_logging() {
    let _ = env_logger::builder().format_timestamp_millis().try_init();
}

#[cfg(not(feature = "xtralog"))]
fn init_logging() {}

/// Starts the runtime from `params.runtime_config_path`, resolves
/// `params.type_path::params.method_name` in `params.library_path` and calls
/// it with `params.user_data`.
///
/// Returns the managed method's result unchanged, or one of the reserved
/// [`StatusCode`] values if the method was never reached.
///
/// # Safety
///
/// `params` must be null or point to a block whose strings are valid
/// nul-terminated UTF-16 for the whole call, and whose user data is whatever
/// the managed method expects.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn LoadAndCallMethod(params: *const LoadParams) -> i32 {
    init_logging();

    unsafe { netclr::call_guarded(&NetCoreHost, params) }
}
