//! Cross-process parameter block shared by the bootstrap library and whoever
//! writes the block (an injector in another process, or a local loader).

mod layout;
mod request;
mod status;

pub use layout::{LayoutError, PointerWidth, RawLoadParams, FIELDS, LAYOUT_VERSION};
pub use request::{runtime_config_for, BorrowedBlock, LoadRequest};
pub use status::{Outcome, StatusCode};

use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use widestring::U16CStr;

/// Errors raised while building or reading a parameter block
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Parameter block pointer is null")]
    NullBlock,
    #[error("Field `{0}` is a null pointer")]
    NullField(&'static str),
    #[error("Field `{0}` contains an interior nul")]
    InteriorNul(&'static str),
    #[error("Field `{0}` is not valid UTF-16")]
    NotUtf16(&'static str),
    #[error("File not found: {0}")]
    NotFound(String),
}

/// The block an external writer places in memory before calling
/// `LoadAndCallMethod`.
///
/// Layout is packed with 1-byte alignment: five native pointers, in this
/// order, with no padding. A writer that cannot share this type (another
/// process, another language) can rebuild it byte-for-byte from
/// [`RawLoadParams`] and [`FIELDS`].
///
/// Strings are nul-terminated UTF-16. `user_data` is carried, never read.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct LoadParams {
    pub library_path: *const u16,
    pub runtime_config_path: *const u16,
    pub type_path: *const u16,
    pub method_name: *const u16,
    pub user_data: *mut u8,
}

const _: () = assert!(size_of::<LoadParams>() == 5 * size_of::<usize>());
const _: () = assert!(align_of::<LoadParams>() == 1);

impl fmt::Debug for LoadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Copy out of the packed struct before formatting.
        let (library_path, runtime_config_path, type_path, method_name, user_data) = (
            self.library_path,
            self.runtime_config_path,
            self.type_path,
            self.method_name,
            self.user_data,
        );
        f.debug_struct("LoadParams")
            .field("library_path", &library_path)
            .field("runtime_config_path", &runtime_config_path)
            .field("type_path", &type_path)
            .field("method_name", &method_name)
            .field("user_data", &user_data)
            .finish()
    }
}

impl LoadParams {
    /// Raw bytes of the block as it sits in memory.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: LoadParams is packed plain data with no padding bytes.
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), size_of::<Self>()) }
    }

    /// Addresses of the block's fields, for comparison against the wire layout.
    pub fn to_raw(&self) -> RawLoadParams {
        RawLoadParams {
            library_path: self.library_path as usize as u64,
            runtime_config_path: self.runtime_config_path as usize as u64,
            type_path: self.type_path as usize as u64,
            method_name: self.method_name as usize as u64,
            user_data: self.user_data as usize as u64,
        }
    }

    /// Reads a block written by the caller.
    ///
    /// The block is copied with an unaligned read and never written back.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a readable block whose non-null string
    /// fields are nul-terminated UTF-16 that stays valid and unmodified for
    /// `'a`.
    pub unsafe fn read<'a>(ptr: *const LoadParams) -> Result<LoadTarget<'a>, ParamsError> {
        if ptr.is_null() {
            return Err(ParamsError::NullBlock);
        }
        let block = unsafe { ptr.read_unaligned() };

        let library_path = unsafe { wide_field(block.library_path, "library_path")? };
        let runtime_config_path =
            unsafe { wide_field(block.runtime_config_path, "runtime_config_path")? };
        let type_path = unsafe { wide_field(block.type_path, "type_path")? };
        let method_name = unsafe { wide_field(block.method_name, "method_name")? };

        Ok(LoadTarget {
            library_path,
            runtime_config_path,
            type_path,
            method_name,
            user_data: UserData::from_raw(block.user_data),
        })
    }
}

unsafe fn wide_field<'a>(ptr: *const u16, name: &'static str) -> Result<&'a U16CStr, ParamsError> {
    if ptr.is_null() {
        return Err(ParamsError::NullField(name));
    }
    let value = unsafe { U16CStr::from_ptr_str(ptr) };
    // Unpaired surrogates would be replaced on the way to hostfxr, which
    // would then look up a different path or name than the caller wrote.
    if value.to_string().is_err() {
        return Err(ParamsError::NotUtf16(name));
    }
    Ok(value)
}

/// A validated view of a parameter block, borrowing the caller's strings.
#[derive(Debug, Clone, Copy)]
pub struct LoadTarget<'a> {
    pub library_path: &'a U16CStr,
    pub runtime_config_path: &'a U16CStr,
    pub type_path: &'a U16CStr,
    pub method_name: &'a U16CStr,
    pub user_data: UserData<'a>,
}

/// Opaque user payload address.
///
/// Ownership never transfers: the caller keeps the memory valid for `'a`
/// and this side only forwards the address.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserData<'a> {
    ptr: *mut u8,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> UserData<'a> {
    pub fn from_raw(ptr: *mut u8) -> Self {
        Self {
            ptr,
            _borrow: PhantomData,
        }
    }

    pub fn from_slice(data: &'a mut [u8]) -> Self {
        Self::from_raw(data.as_mut_ptr())
    }

    pub fn null() -> Self {
        Self::from_raw(std::ptr::null_mut())
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }
}

impl fmt::Debug for UserData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserData({:p})", self.ptr)
    }
}
