use crate::errors::StoreError;

/// Separator between the namespace, table and id parts of a row key.
pub const KEY_SEPARATOR: char = ':';

/// Key-construction helpers for rows stored in Redis.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub namespace: &'a str,
    pub table: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(namespace: &'a str, table: &'a str) -> Self {
        Self { namespace, table }
    }

    /// Like [`KeyContext::new`], but refuses names a table SCAN could reach across.
    pub fn try_new(namespace: &'a str, table: &'a str) -> Result<Self, StoreError> {
        check_segment("namespace", namespace)?;
        check_segment("table name", table)?;
        Ok(Self::new(namespace, table))
    }

    pub fn row(&self, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, self.table, id)
    }

    /// `SCAN MATCH` pattern covering every row of the table.
    pub fn table_pattern(&self) -> String {
        format!("{}:{}:*", escape_glob(self.namespace), escape_glob(self.table))
    }
}

/// A namespace or table name must not contain the key separator, otherwise
/// `ns:a:*` would also match the rows of table `a:b`.
pub fn check_segment(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.contains(KEY_SEPARATOR) {
        return Err(StoreError::InvalidRequest {
            message: format!("{kind} `{value}` must not contain `{KEY_SEPARATOR}`"),
        });
    }
    Ok(())
}

fn escape_glob(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_row_keys() {
        let ctx = KeyContext::new("us-east-1", "datamigrations");
        assert_eq!(ctx.row("abc"), "us-east-1:datamigrations:abc");
        assert_eq!(ctx.table_pattern(), "us-east-1:datamigrations:*");
    }

    #[test]
    fn escapes_glob_characters_in_pattern() {
        let ctx = KeyContext::new("ns", "t*[1]");
        assert_eq!(ctx.table_pattern(), "ns:t\\*\\[1\\]:*");
    }

    #[test]
    fn separator_in_table_or_namespace_is_rejected() {
        // `ns:a:*` would otherwise also cover every row of table `a:b`.
        let err = KeyContext::try_new("ns", "a:b").unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest { .. }));
        assert!(KeyContext::try_new("eu:west", "a").is_err());

        let ctx = KeyContext::try_new("ns", "a").unwrap();
        assert_eq!(ctx.table_pattern(), "ns:a:*");
    }
}
