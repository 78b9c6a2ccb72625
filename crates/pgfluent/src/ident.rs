//! SQL identifiers supplied as data.
//!
//! Column names that arrive as row keys and table/key names used by the relation
//! composer are rendered through [`Ident`], which accepts dotted paths and
//! `"quoted"` parts and rejects everything else.
//!
//! - Unquoted parts must match `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts may contain anything but NUL; `"` is escaped as `""`

use crate::error::{DbError, DbResult};

/// One dot-separated segment of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    Unquoted(String),
    Quoted(String),
}

/// A validated SQL identifier such as `users`, `public.users` or `"Order"."id"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

impl Ident {
    /// Wrap a single name in quotes, whatever it contains.
    pub fn quoted(name: &str) -> DbResult<Self> {
        if name.is_empty() || name.contains('\0') {
            return Err(DbError::validation(format!(
                "invalid quoted identifier {name:?}"
            )));
        }
        Ok(Self {
            parts: vec![IdentPart::Quoted(name.to_string())],
        })
    }

    /// Parse a possibly dotted, possibly quoted identifier.
    pub fn parse(s: &str) -> DbResult<Self> {
        if s.is_empty() {
            return Err(DbError::validation("identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(DbError::validation(
                "identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut rest = s;
        loop {
            let (part, tail) = if let Some(quoted) = rest.strip_prefix('"') {
                take_quoted(quoted)?
            } else {
                take_unquoted(rest)?
            };
            parts.push(part);

            match tail.strip_prefix('.') {
                Some("") => return Err(DbError::validation(format!("trailing '.' in {s:?}"))),
                Some(next) => rest = next,
                None if tail.is_empty() => break,
                None => {
                    return Err(DbError::validation(format!(
                        "unexpected {tail:?} after identifier part in {s:?}"
                    )));
                }
            }
        }

        Ok(Self { parts })
    }

    /// Render `table.column` from two separately validated names.
    pub fn qualified(table: &str, column: &str) -> DbResult<String> {
        let table = Self::parse(table)?;
        let column = Self::parse(column)?;
        let mut out = table.to_sql();
        out.push('.');
        column.write_sql(&mut out);
        Ok(out)
    }

    /// The last segment, unquoted (`public.users` → `users`).
    pub fn name(&self) -> &str {
        match self.parts.last() {
            Some(IdentPart::Unquoted(s)) | Some(IdentPart::Quoted(s)) => s,
            None => "",
        }
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) => out.push_str(s),
                IdentPart::Quoted(s) => {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                }
            }
        }
    }
}

fn take_quoted(input: &str) -> DbResult<(IdentPart, &str)> {
    let mut name = String::new();
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            name.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, '"'))) {
            chars.next();
            name.push('"');
            continue;
        }
        if name.is_empty() {
            return Err(DbError::validation("empty quoted identifier"));
        }
        return Ok((IdentPart::Quoted(name), &input[i + 1..]));
    }
    Err(DbError::validation("unclosed quoted identifier"))
}

fn take_unquoted(input: &str) -> DbResult<(IdentPart, &str)> {
    let end = input.find('.').unwrap_or(input.len());
    let name = &input[..end];
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(DbError::validation("empty identifier segment")),
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(DbError::validation(format!(
                "invalid identifier start character '{c}'"
            )));
        }
    }
    if let Some(c) = chars.find(|c| !(*c == '_' || *c == '$' || c.is_ascii_alphanumeric())) {
        return Err(DbError::validation(format!(
            "invalid character '{c}' in identifier {name:?}"
        )));
    }
    Ok((IdentPart::Unquoted(name.to_string()), &input[end..]))
}
