use crate::hosting::{ManagedEntryPoint, ManagedHost};
use crate::NetClrError;
use abi::{LoadParams, LoadTarget};
use log::{debug, error, trace};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Where a single `LoadAndCallMethod` call is. Stages only move forward and a
/// failure in any of them ends the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    RuntimeResolving,
    TypeResolving,
    Invoking,
}

/// Runs the bootstrap sequence against a validated block and returns the
/// managed method's result.
///
/// # Safety
///
/// Calls the resolved managed method with `target.user_data`. The caller
/// guarantees the payload is valid for the whole call.
pub unsafe fn load_and_call<H: ManagedHost>(host: &H, target: &LoadTarget<'_>) -> Result<i32, NetClrError> {
    trace!("{:?} -> {:?}", Stage::Idle, Stage::RuntimeResolving);
    let runtime = host.resolve_runtime(target.runtime_config_path)?;

    trace!("{:?} -> {:?}", Stage::RuntimeResolving, Stage::TypeResolving);
    let resolver = host.resolver(&runtime, target.library_path)?;
    let entry_point = host.resolve_method(&resolver, target.type_path, target.method_name)?;

    trace!("{:?} -> {:?}", Stage::TypeResolving, Stage::Invoking);
    debug!(
        "Calling {}::{} with {:?}",
        target.type_path.display(),
        target.method_name.display(),
        target.user_data
    );
    let result = unsafe { entry_point.invoke(target.user_data)? };

    // The runtime stays resident; only our handle on it goes away.
    drop(resolver);
    drop(runtime);

    debug!("Managed method returned {}", result);
    Ok(result)
}

/// Reads the block, runs the sequence and collapses the outcome into the
/// single integer handed back across the export boundary.
///
/// # Safety
///
/// `params` must be null or satisfy the contract of [`LoadParams::read`], and
/// its user data must stay valid for the whole call.
pub unsafe fn call_with_block<H: ManagedHost>(host: &H, params: *const LoadParams) -> i32 {
    let outcome = unsafe { LoadParams::read(params) }
        .map_err(NetClrError::from)
        .and_then(|target| unsafe { load_and_call(host, &target) });

    match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Bootstrap failed while {:?}: {}", e.stage(), e);
            e.status().code()
        }
    }
}

/// [`call_with_block`] behind `catch_unwind`, so a panic anywhere in the
/// sequence comes back as [`StatusCode::Invocation`](abi::StatusCode) instead
/// of unwinding into the caller.
///
/// # Safety
///
/// Same contract as [`call_with_block`].
pub unsafe fn call_guarded<H: ManagedHost>(host: &H, params: *const LoadParams) -> i32 {
    catch_unwind(AssertUnwindSafe(|| unsafe { call_with_block(host, params) })).unwrap_or_else(|payload| {
        let e = NetClrError::Invocation(format!("panicked: {}", panic_message(payload.as_ref())));
        error!("Bootstrap failed while {:?}: {}", e.stage(), e);
        e.status().code()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
