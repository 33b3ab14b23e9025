use std::path::Path;

use anyhow::{Result, bail};

pub(crate) fn existing_dir(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("The {what} {} does not exist", path.display());
    }
    if !path.is_dir() {
        bail!("The {what} {} is not a directory", path.display());
    }
    Ok(())
}

pub(crate) fn existing_file(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("The {what} {} does not exist", path.display());
    }
    if !path.is_file() {
        bail!("The {what} {} is not a file", path.display());
    }
    Ok(())
}

pub(crate) fn new_file(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        bail!("The {what} {} already exists", path.display());
    }
    Ok(())
}
