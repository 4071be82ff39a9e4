//! Sql string operation.
use std::borrow::Cow;

/// Type that represent sql string.
pub trait Sql {
    /// Returns sql string.
    fn sql(&self) -> &str;

    /// Return `true` if current statement should be cached.
    fn persistent(&self) -> bool;
}

impl Sql for &str {
    fn sql(&self) -> &str {
        self
    }

    fn persistent(&self) -> bool {
        true
    }
}

impl Sql for &String {
    fn sql(&self) -> &str {
        self
    }

    fn persistent(&self) -> bool {
        true
    }
}

/// Non persistent query string.
///
/// The statement is closed once its last handle is dropped instead of
/// staying in the statement cache.
#[derive(Debug)]
pub struct SqlOnce<'sql>(&'sql str);

impl Sql for SqlOnce<'_> {
    fn sql(&self) -> &str {
        self.0
    }

    fn persistent(&self) -> bool {
        false
    }
}

/// Extension trait for easier query persistence config.
pub trait SqlExt<'a> {
    /// Disable statement caching.
    fn once(self) -> SqlOnce<'a>;
}

impl<'a> SqlExt<'a> for &'a str {
    fn once(self) -> SqlOnce<'a> {
        SqlOnce(self)
    }
}

impl<'a> SqlExt<'a> for SqlOnce<'a> {
    fn once(self) -> SqlOnce<'a> {
        self
    }
}

/// Placeholder syntax of queries given to a connection.
///
/// Everything other than [`ParamStyle::Dollar`] is rewritten to `$n` before
/// `Parse`. Placeholders inside string literals, quoted identifiers,
/// dollar quoted bodies and comments are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamStyle {
    /// `$1`, native postgres syntax.
    #[default]
    Dollar,
    /// `?`
    Qmark,
    /// `%s`, with `%%` for a literal `%`.
    Format,
    /// `:1`
    Numeric,
}

/// Rewrite placeholders of `style` into `$n`.
///
/// ```
/// use pglink::sql::{ParamStyle, translate};
///
/// assert_eq!(
///     translate("SELECT ?, '?' FROM t WHERE id = ?", ParamStyle::Qmark),
///     "SELECT $1, '?' FROM t WHERE id = $2",
/// );
/// assert_eq!(translate("SELECT :1::int", ParamStyle::Numeric), "SELECT $1::int");
/// ```
pub fn translate(sql: &str, style: ParamStyle) -> Cow<'_, str> {
    if style == ParamStyle::Dollar {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut param = itoa::Buffer::new();
    let mut count = 0u32;
    let mut start = 0;
    let mut i = 0;

    macro_rules! placeholder {
        ($len:expr) => {{
            out.push_str(&sql[start..i]);
            count += 1;
            out.push('$');
            out.push_str(param.format(count));
            i += $len;
            start = i;
        }};
    }

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                let escape = i > 0
                    && matches!(bytes[i - 1], b'E' | b'e')
                    && (i < 2 || !is_ident(bytes[i - 2]));
                i = skip_quoted(bytes, i + 1, b'\'', escape);
            }
            b'"' => i = skip_quoted(bytes, i + 1, b'"', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = match bytes[i..].iter().position(|&b| b == b'\n') {
                    Some(nl) => i + nl + 1,
                    None => bytes.len(),
                };
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i + 2),
            b'$' => match dollar_tag(bytes, i) {
                Some(end) => {
                    let tag = &sql[i..end];
                    i = match sql[end..].find(tag) {
                        Some(close) => end + close + tag.len(),
                        None => bytes.len(),
                    };
                }
                None => i += 1,
            },
            b'?' if style == ParamStyle::Qmark => placeholder!(1),
            b'%' if style == ParamStyle::Format => match bytes.get(i + 1) {
                Some(b's') => placeholder!(2),
                Some(b'%') => {
                    out.push_str(&sql[start..=i]);
                    i += 2;
                    start = i;
                }
                _ => i += 1,
            },
            b':' if style == ParamStyle::Numeric => match bytes.get(i + 1) {
                Some(b':') => i += 2,
                Some(d) if d.is_ascii_digit() => {
                    out.push_str(&sql[start..i]);
                    out.push('$');
                    let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                    out.push_str(&sql[i + 1..i + 1 + digits]);
                    i += 1 + digits;
                    start = i;
                }
                _ => i += 1,
            },
            _ => i += 1,
        }
    }

    out.push_str(&sql[start..]);
    Cow::Owned(out)
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Returns the index after the closing quote.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8, backslash: bool) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash => i += 2,
            b if b == quote && bytes.get(i + 1) == Some(&quote) => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Block comments nest.
fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    let mut depth = 1;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'/', Some(b'*')) => {
                depth += 1;
                i += 2;
            }
            (b'*', Some(b'/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of a `$tag$` opening at `i`, if it is one.
fn dollar_tag(bytes: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 1;
    match bytes.get(j) {
        Some(b'$') => return Some(j + 1),
        Some(&b) if b.is_ascii_alphabetic() || b == b'_' => j += 1,
        _ => return None,
    }
    while bytes.get(j).is_some_and(|&b| is_ident(b)) {
        j += 1;
    }
    (bytes.get(j) == Some(&b'$')).then_some(j + 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dollar_is_untouched() {
        assert!(matches!(translate("SELECT $1", ParamStyle::Dollar), Cow::Borrowed("SELECT $1")));
    }

    #[test]
    fn qmark() {
        assert_eq!(
            translate(r#"SELECT ? AS "a?", E'\'?', $$ ? $$, $x$?$x$ -- ?
                /* ? /* ? */ ? */ FROM t WHERE b = ?"#, ParamStyle::Qmark),
            r#"SELECT $1 AS "a?", E'\'?', $$ ? $$, $x$?$x$ -- ?
                /* ? /* ? */ ? */ FROM t WHERE b = $2"#,
        );
    }

    #[test]
    fn doubled_quote() {
        assert_eq!(translate("SELECT 'it''s ?', ?", ParamStyle::Qmark), "SELECT 'it''s ?', $1");
    }

    #[test]
    fn format() {
        assert_eq!(
            translate("SELECT %s, 100%%, '%s' WHERE a LIKE %s", ParamStyle::Format),
            "SELECT $1, 100%, '%s' WHERE a LIKE $2",
        );
    }

    #[test]
    fn numeric() {
        assert_eq!(
            translate("SELECT :2, :1::text, ':3', a:=1", ParamStyle::Numeric),
            "SELECT $2, $1::text, ':3', a:=1",
        );
    }

    #[test]
    fn multibyte() {
        assert_eq!(translate("SELECT 'ñ', ? -- é", ParamStyle::Qmark), "SELECT 'ñ', $1 -- é");
    }
}
