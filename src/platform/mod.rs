//! Scoped acquisition of a shared object.
//!
//! Mirrors the RAII `LoadedLibraryHandle` of the reference implementation:
//! a library is loaded once, symbols are resolved against it by name, and
//! the library is unloaded on drop regardless of how the handle's owner
//! exits.

use libloading::Library;

use crate::error::Error;

/// An owned, loaded shared object. Unloaded automatically on drop.
#[derive(Debug)]
pub struct LoadedLibrary {
    path: String,
    library: Library,
}

impl LoadedLibrary {
    /// Load the shared object at `path`.
    pub fn load(path: &str) -> Result<Self, Error> {
        // SAFETY: the caller is responsible for only pointing this at a
        // well-formed vendor shared object; arbitrary code in the library's
        // init routines runs as a consequence of loading it, same as for
        // any `dlopen`/`LoadLibrary` call.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::LibraryLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        log::info!("loaded vendor library {path}");
        Ok(Self { path: path.to_string(), library })
    }

    /// Resolve `symbol_name` to a typed function pointer.
    ///
    /// # Safety
    /// The caller must ensure `T` matches the true signature of the symbol.
    pub unsafe fn resolve<T>(&self, symbol_name: &str) -> Result<libloading::Symbol<'_, T>, Error> {
        self.library
            .get::<T>(symbol_name.as_bytes())
            .map_err(|e| Error::SymbolMissing {
                symbol: symbol_name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        log::debug!("unloading vendor library {}", self.path);
        // `Library`'s own `Drop` performs the actual dlclose/FreeLibrary.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_library_reports_path_and_reason() {
        let err = LoadedLibrary::load("/nonexistent/path/to/lib.so").unwrap_err();
        match err {
            Error::LibraryLoad { path, reason } => {
                assert_eq!(path, "/nonexistent/path/to/lib.so");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
