//! `.env` support: `KEY=value` lines, optional `export ` prefix, `#` comments,
//! single- and double-quoted values. Variables already present in the process
//! environment are left untouched.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {reason}", path.display())]
    Syntax { path: PathBuf, line: usize, reason: String },
}

/// Parse `path` and export every assignment not already set. Returns how many were applied.
pub fn load(path: &Path) -> Result<usize, EnvFileError> {
    let text = fs::read_to_string(path).map_err(|source| EnvFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut applied = 0;
    for (key, value) in parse(&text).map_err(|(line, reason)| EnvFileError::Syntax {
        path: path.to_path_buf(),
        line,
        reason,
    })? {
        if std::env::var_os(&key).is_none() {
            // Process-wide env mutation; only done at startup before any threads exist.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// All assignments in file order; errors carry the 1-based line number.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_line(line).map_err(|e| (idx + 1, e)).transpose())
        .collect()
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw_value) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_value(raw_value.trim())?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let (quote, body) = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => (q, &raw[1..]),
        _ => {
            // unquoted: an inline comment ends the value
            let value = raw.split('#').next().unwrap_or_default().trim_end();
            return Ok(value.to_string());
        }
    };

    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => {
                let escaped = chars.next().ok_or("unterminated escape sequence")?;
                out.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(out)
                } else {
                    Err(format!("unexpected characters after closing {} quote", quote))
                };
            }
            c => out.push(c),
        }
    }
    Err(format!("unterminated {} quoted value", quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(text: &str) -> Vec<(String, String)> {
        parse(text).expect("valid env text")
    }

    #[test]
    fn plain_and_exported_assignments() {
        let got = pairs("# comment\n\nMODEL_PATH=models/solar.bin\nexport  DEFAULT_CITY = Jaipur # home\n");
        assert_eq!(
            got,
            vec![
                ("MODEL_PATH".to_string(), "models/solar.bin".to_string()),
                ("DEFAULT_CITY".to_string(), "Jaipur".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_values() {
        let got = pairs("A=\"New Delhi # not a comment\"\nB='C:\\data'\nC=\"tab\\there\"\nD=\n");
        assert_eq!(got[0].1, "New Delhi # not a comment");
        assert_eq!(got[1].1, "C:\\data");
        assert_eq!(got[2].1, "tab\there");
        assert_eq!(got[3].1, "");
    }

    #[test]
    fn errors_report_line_numbers() {
        assert_eq!(parse("OK=1\nbroken line\n").unwrap_err().0, 2);
        assert_eq!(parse("A=\"open\n").unwrap_err().0, 1);
        assert_eq!(parse("A='x' y\n").unwrap_err().0, 1);
        assert_eq!(parse("MY VAR=1\n").unwrap_err().0, 1);
    }

    #[test]
    fn load_reports_io_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(load(&dir.path().join("missing.env")), Err(EnvFileError::Io { .. })));
    }
}
