use crate::{LoadParams, ParamsError, UserData};
use log::debug;
use std::ffi::OsStr;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use widestring::U16CString;

/// Owned strings for one `LoadAndCallMethod` call, built in the caller's
/// process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    library_path: U16CString,
    runtime_config_path: U16CString,
    type_path: U16CString,
    method_name: U16CString,
}

fn wide(value: impl AsRef<OsStr>, field: &'static str) -> Result<U16CString, ParamsError> {
    U16CString::from_os_str(value).map_err(|_| ParamsError::InteriorNul(field))
}

impl LoadRequest {
    pub fn new(
        library_path: impl AsRef<OsStr>,
        runtime_config_path: impl AsRef<OsStr>,
        type_path: &str,
        method_name: &str,
    ) -> Result<Self, ParamsError> {
        Ok(Self {
            library_path: wide(library_path, "library_path")?,
            runtime_config_path: wide(runtime_config_path, "runtime_config_path")?,
            type_path: wide(type_path, "type_path")?,
            method_name: wide(method_name, "method_name")?,
        })
    }

    /// Builds a request for an assembly whose `<name>.runtimeconfig.json`
    /// sits next to it. Both files must exist.
    pub fn for_assembly(assembly: &Path, type_path: &str, method_name: &str) -> Result<Self, ParamsError> {
        let assembly = std::path::absolute(assembly)
            .map_err(|_| ParamsError::NotFound(assembly.display().to_string()))?;
        if !assembly.is_file() {
            return Err(ParamsError::NotFound(assembly.display().to_string()));
        }

        let runtime_config = runtime_config_for(&assembly);
        if !runtime_config.is_file() {
            return Err(ParamsError::NotFound(runtime_config.display().to_string()));
        }

        debug!("Using runtime config {:?} for {:?}", runtime_config, assembly);
        Self::new(&assembly, &runtime_config, type_path, method_name)
    }

    pub fn library_path(&self) -> &U16CString {
        &self.library_path
    }

    pub fn runtime_config_path(&self) -> &U16CString {
        &self.runtime_config_path
    }

    pub fn type_path(&self) -> &U16CString {
        &self.type_path
    }

    pub fn method_name(&self) -> &U16CString {
        &self.method_name
    }

    /// A parameter block pointing into this request and `user_data`.
    pub fn block<'a>(&'a self, user_data: Option<&'a mut [u8]>) -> BorrowedBlock<'a> {
        let user_data = user_data.map_or_else(UserData::null, UserData::from_slice);
        BorrowedBlock {
            params: LoadParams {
                library_path: self.library_path.as_ptr(),
                runtime_config_path: self.runtime_config_path.as_ptr(),
                type_path: self.type_path.as_ptr(),
                method_name: self.method_name.as_ptr(),
                user_data: user_data.as_ptr(),
            },
            _borrow: PhantomData,
        }
    }
}

/// `<dir>/<stem>.runtimeconfig.json` for an assembly path.
pub fn runtime_config_for(assembly: &Path) -> PathBuf {
    let stem = assembly.file_stem().unwrap_or_default();
    let mut name = stem.to_os_string();
    name.push(".runtimeconfig.json");
    assembly.with_file_name(name)
}

/// A parameter block whose pointers stay valid as long as the borrow lives.
#[derive(Debug)]
pub struct BorrowedBlock<'a> {
    params: LoadParams,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl BorrowedBlock<'_> {
    pub fn params(&self) -> &LoadParams {
        &self.params
    }

    /// Pointer to hand to `LoadAndCallMethod`.
    pub fn as_ptr(&self) -> *const LoadParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("abi_request_{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_runtime_config_next_to_assembly() {
        let config = runtime_config_for(Path::new("/opt/mods/Implant.dll"));
        assert_eq!(config, Path::new("/opt/mods/Implant.runtimeconfig.json"));
    }

    #[test]
    fn test_rejects_interior_nul() {
        let err = LoadRequest::new("a.dll", "a.runtimeconfig.json", "Bad\0Type", "Main").unwrap_err();
        assert!(matches!(err, ParamsError::InteriorNul("type_path")));
    }

    #[test]
    fn test_for_assembly_requires_runtime_config() {
        let dir = scratch_dir("missing_config");
        let dll = dir.join("Implant.dll");
        fs::write(&dll, b"MZ").unwrap();

        let err = LoadRequest::for_assembly(&dll, "Implant.DllMain, Implant", "Main").unwrap_err();
        match err {
            ParamsError::NotFound(path) => assert!(path.ends_with("Implant.runtimeconfig.json")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_for_assembly_requires_assembly() {
        let dir = scratch_dir("missing_dll");
        let err = LoadRequest::for_assembly(&dir.join("Nope.dll"), "Nope.Main, Nope", "Main").unwrap_err();
        assert!(matches!(err, ParamsError::NotFound(_)));
    }

    #[test]
    fn test_block_points_into_request() {
        let dir = scratch_dir("block");
        let dll = dir.join("Implant.dll");
        fs::write(&dll, b"MZ").unwrap();
        fs::write(dir.join("Implant.runtimeconfig.json"), b"{}").unwrap();

        let request = LoadRequest::for_assembly(&dll, "Implant.DllMain, Implant", "Main").unwrap();
        let mut payload = vec![9u8; 16];
        let payload_ptr = payload.as_mut_ptr();
        let block = request.block(Some(payload.as_mut_slice()));

        let target = unsafe { LoadParams::read(block.as_ptr()) }.unwrap();
        assert_eq!(target.library_path, request.library_path().as_ucstr());
        assert!(target
            .runtime_config_path
            .to_string_lossy()
            .ends_with("Implant.runtimeconfig.json"));
        assert_eq!(target.type_path.to_string_lossy(), "Implant.DllMain, Implant");
        assert_eq!(target.user_data.as_ptr(), payload_ptr);
    }

    #[test]
    fn test_block_without_user_data() {
        let request = LoadRequest::new("a.dll", "a.runtimeconfig.json", "A.B, A", "Main").unwrap();
        let block = request.block(None);
        let user_data = block.params().user_data;
        assert!(user_data.is_null());
    }
}
