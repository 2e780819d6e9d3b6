//! PDFium binding.
//!
//! `pdfium-render` loads the pdfium shared library at runtime. Discovery order:
//!
//! 1. the explicit path from [`crate::ConversionConfig::pdfium_library_path`]
//! 2. `PDFIUM_LIB_PATH`
//! 3. the directory of the running executable
//! 4. the system library search path
//!
//! A path may point at the library file itself or at the directory holding it.

use crate::error::ConvertError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library, following the discovery order above.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, ConvertError> {
    if let Some(path) = explicit {
        return bind_at(path);
    }

    if let Ok(env_path) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !env_path.is_empty() {
            return bind_at(Path::new(&env_path));
        }
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let dir = exe_dir.to_string_lossy();
        let candidate = PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&*dir));
        if candidate.exists() {
            if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
                debug!("Bound pdfium next to executable: {}", candidate.display());
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("system library: {:?}", e)))
}

fn bind_at(path: &Path) -> Result<Pdfium, ConvertError> {
    let lib: PathBuf = if path.is_dir() {
        let dir = path.to_string_lossy();
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&*dir))
    } else {
        path.to_path_buf()
    };

    debug!("Binding pdfium from {}", lib.display());
    Pdfium::bind_to_library(&lib)
        .map(Pdfium::new)
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)))
}

/// Map a pdfium load error onto the parse-failure taxonomy.
pub(crate) fn map_load_error(err: PdfiumError, password: Option<&str>) -> ConvertError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            ConvertError::WrongPassword
        } else {
            ConvertError::PasswordRequired
        }
    } else {
        ConvertError::CorruptPdf { detail: err_str }
    }
}
