// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Enumerates the objects mapped into the current process together with their load bias.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadedModule {
    pub path: PathBuf,
    pub bias: usize,
    pub is_main: bool,
}

fn main_executable() -> Option<PathBuf> {
    std::env::current_exe().ok()
}

#[cfg(target_os = "linux")]
pub(crate) fn loaded_modules() -> Vec<LoadedModule> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    unsafe extern "C" fn callback(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int {
        let modules = &mut *(data as *mut Vec<LoadedModule>);
        let info = &*info;
        let bias = info.dlpi_addr as usize;
        let name = if info.dlpi_name.is_null() {
            &[][..]
        } else {
            CStr::from_ptr(info.dlpi_name).to_bytes()
        };
        // The executable is always reported first, without a name.
        if modules.is_empty() {
            if let Some(path) = main_executable() {
                modules.push(LoadedModule {
                    path,
                    bias,
                    is_main: true,
                });
                return 0;
            }
        }
        if !name.is_empty() {
            modules.push(LoadedModule {
                path: PathBuf::from(OsStr::from_bytes(name)),
                bias,
                is_main: false,
            });
        }
        0
    }

    let mut modules: Vec<LoadedModule> = Vec::new();
    // SAFETY: the callback only touches the Vec passed through `data`, which outlives the call.
    unsafe {
        libc::dl_iterate_phdr(
            Some(callback),
            &mut modules as *mut Vec<LoadedModule> as *mut libc::c_void,
        );
    }
    modules
}

#[cfg(target_os = "macos")]
pub(crate) fn loaded_modules() -> Vec<LoadedModule> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let mut modules = Vec::new();
    // SAFETY: dyld image queries are valid for any index below the reported count.
    let count = unsafe { libc::_dyld_image_count() };
    for index in 0..count {
        let bias = unsafe { libc::_dyld_get_image_vmaddr_slide(index) } as usize;
        let is_main = index == 0;
        let path = if is_main {
            main_executable()
        } else {
            let name = unsafe { libc::_dyld_get_image_name(index) };
            (!name.is_null()).then(|| {
                let bytes = unsafe { CStr::from_ptr(name) }.to_bytes();
                PathBuf::from(OsStr::from_bytes(bytes))
            })
        };
        if let Some(path) = path {
            modules.push(LoadedModule {
                path,
                bias,
                is_main,
            });
        }
    }
    modules
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub(crate) fn loaded_modules() -> Vec<LoadedModule> {
    main_executable()
        .map(|path| LoadedModule {
            path,
            bias: 0,
            is_main: true,
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_main_module_first() {
        let modules = loaded_modules();
        assert!(!modules.is_empty());
        assert!(modules[0].is_main);
        assert_eq!(modules[0].path, std::env::current_exe().unwrap());
        assert_eq!(modules.iter().filter(|m| m.is_main).count(), 1);
    }
}
