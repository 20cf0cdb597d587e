//! `safeharbor unwrap` command implementation.

use anyhow::Result;
use std::path::PathBuf;

use super::read_input;

pub fn run(file: Option<PathBuf>) -> Result<bool> {
    let wrapped = read_input(None, file.as_ref())?;
    println!("{}", safeharbor_runtime::unwrap(&wrapped));
    Ok(true)
}
