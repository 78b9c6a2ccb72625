//! Ordered binding list shared by every clause of one statement.

use crate::value::Value;
use tokio_postgres::types::ToSql;

/// Values bound to `$n` placeholders, in the order the placeholders appear.
///
/// Every clause renders into the same list, so the textual order of the SQL
/// and the binding order can never diverge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: Vec<Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add a value and return its 1-based placeholder index.
    pub fn push(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Add a value and return its `$n` placeholder text.
    pub fn placeholder(&mut self, value: Value) -> String {
        format!("${}", self.push(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

/// Borrow a value slice as driver parameters.
pub fn params_ref(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Where a scanner is relative to SQL quoting.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Quoting {
    None,
    /// Inside `'...'`.
    Literal,
    /// Inside `"..."`.
    Identifier,
}

impl Quoting {
    /// State after reading `ch`. Doubled quotes toggle twice and cancel out.
    fn step(self, ch: char) -> Self {
        match (self, ch) {
            (Quoting::None, '\'') => Quoting::Literal,
            (Quoting::None, '"') => Quoting::Identifier,
            (Quoting::Literal, '\'') | (Quoting::Identifier, '"') => Quoting::None,
            (state, _) => state,
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Replace each unquoted `?` with the next `$n` placeholder.
///
/// `?` inside single-quoted literals or double-quoted identifiers is left
/// alone. Extra `?` beyond the supplied values are emitted unchanged and
/// caught by the placeholder count check at compile time.
pub(crate) fn number_template(sql: &str, values: &[Value], out: &mut Bindings) -> String {
    let mut result = String::with_capacity(sql.len() + values.len() * 2);
    let mut values = values.iter();
    let mut quoting = Quoting::None;
    for ch in sql.chars() {
        if ch == '?' && quoting == Quoting::None {
            match values.next() {
                Some(v) => result.push_str(&out.placeholder(v.clone())),
                None => result.push(ch),
            }
            continue;
        }
        quoting = quoting.step(ch);
        result.push(ch);
    }
    result
}

/// Count `$n` placeholders in SQL text.
///
/// Skips quoted literals and identifiers, and a `$` that continues an
/// identifier such as `a$1`.
pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut quoting = Quoting::None;
    let mut prev: Option<char> = None;
    let mut count = 0;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$'
            && quoting == Quoting::None
            && !prev.is_some_and(is_ident_char)
            && chars.peek().is_some_and(char::is_ascii_digit)
        {
            count += 1;
        }
        quoting = quoting.step(ch);
        prev = Some(ch);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_one_based_index() {
        let mut b = Bindings::new();
        assert_eq!(b.push(Value::Int(1)), 1);
        assert_eq!(b.placeholder(Value::from("x")), "$2");
        assert_eq!(b.as_slice(), &[Value::Int(1), Value::from("x")]);
    }

    #[test]
    fn template_numbers_after_existing_bindings() {
        let mut b = Bindings::new();
        b.push(Value::Int(9));
        let sql = number_template("a = ? OR b = ?", &[Value::Int(1), Value::Int(2)], &mut b);
        assert_eq!(sql, "a = $2 OR b = $3");
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn template_skips_question_marks_in_literals() {
        let mut b = Bindings::new();
        let sql = number_template("note = '?' AND id = ?", &[Value::Int(4)], &mut b);
        assert_eq!(sql, "note = '?' AND id = $1");
        assert_eq!(count_placeholders(&sql), 1);
    }

    #[test]
    fn count_ignores_dollar_in_literals() {
        assert_eq!(count_placeholders("a = $1 AND b = '$2' AND c = $10"), 2);
    }

    #[test]
    fn count_ignores_dollar_inside_identifiers() {
        assert_eq!(count_placeholders("UPDATE t SET a$1 = $1 WHERE b$2x = $2"), 2);
        assert_eq!(count_placeholders("a=$1"), 1);
        assert_eq!(count_placeholders("($1, $2)"), 2);
    }

    #[test]
    fn apostrophe_in_quoted_identifier_is_not_a_literal() {
        let sql = r#"SELECT "o'clock" FROM t WHERE id = $1 AND "say ""$2""" = $2"#;
        assert_eq!(count_placeholders(sql), 2);

        let mut b = Bindings::new();
        let sql = number_template(r#""it's?" = ? AND x = 'a?'"#, &[Value::Int(1)], &mut b);
        assert_eq!(sql, r#""it's?" = $1 AND x = 'a?'"#);
        assert_eq!(b.len(), 1);
    }
}
