//! Hash-password command: produces the `password` value for `users.json`.

use std::io::BufRead;

use consultrelay_core::hash_password;

use crate::error::{CliError, CliResult};

/// Prints the bcrypt hash of `password`, reading it from stdin when absent.
pub fn run(password: Option<String>, cost: u32) -> CliResult<()> {
    let password = match password {
        Some(password) => password,
        None => read_password(std::io::stdin().lock())?,
    };
    println!("{}", hash(&password, cost)?);
    Ok(())
}

/// Hashes a non-empty password.
pub fn hash(password: &str, cost: u32) -> CliResult<String> {
    if password.is_empty() {
        return Err(CliError::Input("password must not be empty".into()));
    }
    Ok(hash_password(password, cost)?)
}

/// Reads the first line of `reader`, without its line ending.
pub fn read_password(mut reader: impl BufRead) -> CliResult<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
