//! `.env` support: `--env-file <path>` on the command line, else `./.env` if present.
//!
//! Values already present in the process environment always win over the file.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("`--env-file` provided more than once")]
    Duplicate,
    #[error("`--env-file` requires a path argument")]
    MissingPath,
    #[error("unrecognised argument: {0}")]
    UnknownArgument(String),
    #[error("argument contains invalid UTF-8")]
    InvalidUtf8,
    #[error("env file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Syntax { path: PathBuf, line: usize, message: String },
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    /// True when the path came from `--env-file` rather than the working directory.
    pub explicit: bool,
}

/// Parse the binary's arguments and apply the selected env file, if any.
pub fn load_from_args<I>(args: I) -> Result<Option<LoadedEnvFile>, EnvFileError>
where
    I: IntoIterator<Item = OsString>,
{
    match env_file_argument(args)? {
        Some(path) => {
            if !path.is_file() {
                return Err(EnvFileError::NotFound(path));
            }
            apply(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => {
            let path = std::env::current_dir()
                .map_err(|source| EnvFileError::Io {
                    path: PathBuf::from("."),
                    source,
                })?
                .join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            apply(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: false }))
        }
    }
}

fn env_file_argument<I>(args: I) -> Result<Option<PathBuf>, EnvFileError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().skip(1); // program name
    let mut found: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let value = match arg.to_str() {
            Some("--") => break,
            Some("--env-file") => args.next().map(PathBuf::from).ok_or(EnvFileError::MissingPath)?,
            Some(s) if s.starts_with("--env-file=") => {
                let rest = &s["--env-file=".len()..];
                if rest.is_empty() {
                    return Err(EnvFileError::MissingPath);
                }
                PathBuf::from(rest)
            }
            Some(other) => return Err(EnvFileError::UnknownArgument(other.to_string())),
            None => return Err(EnvFileError::InvalidUtf8),
        };
        if found.replace(value).is_some() {
            return Err(EnvFileError::Duplicate);
        }
    }

    Ok(found)
}

fn apply(path: &Path) -> Result<(), EnvFileError> {
    let file = File::open(path).map_err(|source| EnvFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| EnvFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let assignment = parse_line(&line).map_err(|message| EnvFileError::Syntax {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        })?;
        if let Some((key, value)) = assignment
            && std::env::var_os(&key).is_none()
        {
            // Updating process-level environment variables is unsafe on some targets;
            // this runs before the runtime or any other thread starts.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    Ok(())
}

/// One `KEY=value` line; comments, blanks and an `export ` prefix are accepted.
fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let body = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw_value) = body.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_value(raw_value.trim())?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    if let Some(rest) = raw.strip_prefix('"') {
        return parse_quoted(rest, '"', true);
    }
    if let Some(rest) = raw.strip_prefix('\'') {
        return parse_quoted(rest, '\'', false);
    }
    let unquoted = raw.split('#').next().unwrap_or_default().trim_end();
    Ok(unquoted.to_string())
}

fn parse_quoted(input: &str, quote: char, escapes: bool) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if escapes && ch == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in quoted value".to_string())?;
            value.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            continue;
        }
        if ch == quote {
            let trailing = chars.as_str().trim();
            return if trailing.is_empty() || trailing.starts_with('#') {
                Ok(value)
            } else {
                Err("unexpected characters after closing quote".to_string())
            };
        }
        value.push(ch);
    }

    Err("unterminated quoted value".to_string())
}
