//! Identity resolution for declared DDL.
//!
//! Declarations are otherwise opaque: they go to PostgreSQL verbatim. This is
//! the one place that looks at their structure, and it only reads the
//! `CREATE ... name` preamble (plus the `ON table` clause for triggers).
//!
//! The lexer understands just enough SQL to not be fooled: comments, string
//! literals, dollar-quoted bodies and quoted identifiers are all recognized,
//! so a `CREATE FUNCTION` inside a function body is never mistaken for the
//! real preamble.
//!
//! Unquoted identifiers fold to lower case the way PostgreSQL folds them;
//! quoted identifiers keep case, spaces and embedded (doubled) quotes.

use std::borrow::Cow;

use thiserror::Error;

use crate::catalog::{RoutineKind, TriggerKey};
use crate::ops::quote_ident;

/// A declaration that is not a recognizable creation statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve {expected} identity from declaration: {ddl:?}")]
pub struct Unresolvable {
    /// What kind of statement was expected.
    pub expected: &'static str,
    /// The offending declaration text.
    pub ddl: String,
}

/// Identity of a declared routine, as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineIdentity {
    pub kind: RoutineKind,
    /// `None` when the declaration is unqualified.
    pub schema: Option<String>,
    pub name: String,
}

/// A routine name without its overload signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineName {
    pub schema: String,
    pub name: String,
}

impl RoutineIdentity {
    /// Fill in the schema for an unqualified declaration.
    pub fn qualify(&self, default_schema: &str) -> RoutineName {
        RoutineName {
            schema: self
                .schema
                .clone()
                .unwrap_or_else(|| default_schema.to_owned()),
            name: self.name.clone(),
        }
    }
}

/// Identity of a declared trigger, as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerIdentity {
    /// Schema of the table, `None` when the table is unqualified.
    pub schema: Option<String>,
    pub table: String,
    pub trigger: String,
    /// `CREATE CONSTRAINT TRIGGER`, which PostgreSQL can't `OR REPLACE`.
    pub constraint: bool,
}

impl TriggerIdentity {
    /// Fill in the schema for an unqualified table reference.
    pub fn qualify(&self, default_schema: &str) -> TriggerKey {
        TriggerKey {
            schema: self
                .schema
                .clone()
                .unwrap_or_else(|| default_schema.to_owned()),
            table_name: self.table.clone(),
            trigger_name: self.trigger.clone(),
        }
    }

    /// `DROP TRIGGER IF EXISTS` for this trigger, with the table written as declared.
    pub fn drop_if_exists_sql(&self) -> String {
        let table = match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.table)),
            None => quote_ident(&self.table),
        };
        format!("DROP TRIGGER IF EXISTS {} ON {}", quote_ident(&self.trigger), table)
    }
}

const ROUTINE: &str = "function or procedure";
const TRIGGER: &str = "trigger";

/// Extract `(schema, name)` from a `CREATE [OR REPLACE] FUNCTION|PROCEDURE` statement.
pub fn resolve_routine_identity(ddl: &str) -> Result<RoutineIdentity, Unresolvable> {
    let unresolvable = || Unresolvable {
        expected: ROUTINE,
        ddl: ddl.to_owned(),
    };

    let mut tokens = Cursor::new(ddl);
    tokens.create_preamble().ok_or_else(unresolvable)?;

    let kind = if tokens.eat_keyword("FUNCTION") {
        RoutineKind::Function
    } else if tokens.eat_keyword("PROCEDURE") {
        RoutineKind::Procedure
    } else {
        return Err(unresolvable());
    };

    let (schema, name) = tokens.qualified_name().ok_or_else(unresolvable)?;
    if !tokens.eat_punct('(') {
        return Err(unresolvable());
    }

    Ok(RoutineIdentity { kind, schema, name })
}

/// Extract `(schema, table, trigger)` from a `CREATE [OR REPLACE] [CONSTRAINT] TRIGGER` statement.
pub fn resolve_trigger_identity(ddl: &str) -> Result<TriggerIdentity, Unresolvable> {
    let unresolvable = || Unresolvable {
        expected: TRIGGER,
        ddl: ddl.to_owned(),
    };

    let mut tokens = Cursor::new(ddl);
    tokens.create_preamble().ok_or_else(unresolvable)?;
    let constraint = tokens.eat_keyword("CONSTRAINT");
    if !tokens.eat_keyword("TRIGGER") {
        return Err(unresolvable());
    }

    // Trigger names are never schema-qualified.
    let trigger = tokens.identifier().ok_or_else(unresolvable)?;
    if tokens.eat_punct('.') {
        return Err(unresolvable());
    }

    // Skip the timing and event clauses up to the table reference.
    loop {
        match tokens.next() {
            Some(token) if token.is_keyword("ON") => break,
            Some(Token {
                kind: TokenKind::Unterminated,
                ..
            })
            | None => return Err(unresolvable()),
            Some(_) => {}
        }
    }

    let (schema, table) = tokens.qualified_name().ok_or_else(unresolvable)?;
    Ok(TriggerIdentity {
        schema,
        table,
        trigger,
        constraint,
    })
}

/// Rewrite a leading `CREATE` to `CREATE OR REPLACE` for routines and triggers.
///
/// Declarations that already say `OR REPLACE`, or that create some other kind of
/// object, come back untouched. So do constraint triggers, which have no
/// `OR REPLACE` form.
pub fn ensure_or_replace(ddl: &str) -> Cow<'_, str> {
    let mut tokens = Cursor::new(ddl);
    let Some(create) = tokens.next() else {
        return Cow::Borrowed(ddl);
    };
    if !create.is_keyword("CREATE") {
        return Cow::Borrowed(ddl);
    }

    let rewrite = match tokens.next() {
        Some(next) => ["FUNCTION", "PROCEDURE", "TRIGGER"]
            .iter()
            .any(|kw| next.is_keyword(kw)),
        None => false,
    };
    if !rewrite {
        return Cow::Borrowed(ddl);
    }

    let mut out = String::with_capacity(ddl.len() + " OR REPLACE".len());
    out.push_str(&ddl[..create.end]);
    out.push_str(" OR REPLACE");
    out.push_str(&ddl[create.end..]);
    Cow::Owned(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind<'a> {
    /// Bare word: keyword or unquoted identifier.
    Word(&'a str),
    /// Double-quoted identifier, unescaped.
    QuotedIdent(String),
    /// String literal, dollar-quoted body or number.
    Literal,
    Punct(char),
    /// A string, quoted identifier or comment that never ends.
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind<'a>,
    end: usize,
}

impl Token<'_> {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn identifier(&self) -> Option<String> {
        match &self.kind {
            TokenKind::Word(w) => Some(w.to_ascii_lowercase()),
            TokenKind::QuotedIdent(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Splits SQL text into tokens, skipping whitespace and comments.
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            done: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace and comments. Returns false on an unterminated block comment.
    fn skip_trivia(&mut self) -> bool {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('-'), Some('-')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    let mut depth = 1usize;
                    while depth > 0 {
                        match (self.peek(), self.peek_second()) {
                            (Some('*'), Some('/')) => {
                                self.pos += 2;
                                depth -= 1;
                            }
                            (Some('/'), Some('*')) => {
                                self.pos += 2;
                                depth += 1;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return false,
                        }
                    }
                }
                _ => return true,
            }
        }
    }

    /// Consume a quoted run closed by `quote`, where a doubled quote is an escape.
    fn quoted(&mut self, quote: char, backslash_escapes: bool) -> Option<String> {
        let mut value = String::new();
        loop {
            let c = self.bump()?;
            if backslash_escapes && c == '\\' {
                value.push(self.bump()?);
            } else if c == quote {
                if self.peek() == Some(quote) {
                    self.bump();
                    value.push(quote);
                } else {
                    return Some(value);
                }
            } else {
                value.push(c);
            }
        }
    }

    /// Consume a dollar-quoted body if one starts here.
    ///
    /// Returns `Some(false)` when the closing delimiter is missing.
    fn dollar_quoted(&mut self) -> Option<bool> {
        let rest = self.rest();
        let after = &rest[1..];
        let tag_len = after
            .char_indices()
            .take_while(|&(i, c)| {
                c == '_' || c.is_alphabetic() || (i > 0 && c.is_ascii_digit())
            })
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        if !after[tag_len..].starts_with('$') {
            return None;
        }

        let delimiter = &rest[..tag_len + 2];
        let body_start = self.pos + delimiter.len();
        match self.src[body_start..].find(delimiter) {
            Some(offset) => {
                self.pos = body_start + offset + delimiter.len();
                Some(true)
            }
            None => {
                self.pos = self.src.len();
                Some(false)
            }
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c == '$' || c.is_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.done {
            return None;
        }
        if !self.skip_trivia() {
            self.done = true;
            return Some(Token {
                kind: TokenKind::Unterminated,
                end: self.src.len(),
            });
        }

        let c = self.peek()?;
        let kind = match c {
            '"' => {
                self.bump();
                match self.quoted('"', false) {
                    Some(ident) => TokenKind::QuotedIdent(ident),
                    None => TokenKind::Unterminated,
                }
            }
            '\'' => {
                self.bump();
                match self.quoted('\'', false) {
                    Some(_) => TokenKind::Literal,
                    None => TokenKind::Unterminated,
                }
            }
            'e' | 'E' if self.peek_second() == Some('\'') => {
                self.pos += 2;
                match self.quoted('\'', true) {
                    Some(_) => TokenKind::Literal,
                    None => TokenKind::Unterminated,
                }
            }
            '$' => match self.dollar_quoted() {
                Some(true) => TokenKind::Literal,
                Some(false) => TokenKind::Unterminated,
                None => {
                    // Positional parameter like $1.
                    self.bump();
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.bump();
                    }
                    TokenKind::Literal
                }
            },
            c if c.is_ascii_digit() => {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
                {
                    self.bump();
                }
                TokenKind::Literal
            }
            c if c == '_' || c.is_alphabetic() => TokenKind::Word(self.word()),
            c => {
                self.bump();
                TokenKind::Punct(c)
            }
        };

        if kind == TokenKind::Unterminated {
            self.done = true;
        }
        Some(Token {
            kind,
            end: self.pos,
        })
    }
}

/// A lexer with one token of lookahead and the small grammar helpers used above.
struct Cursor<'a> {
    lexer: std::iter::Peekable<Lexer<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src).peekable(),
        }
    }

    fn next(&mut self) -> Option<Token<'a>> {
        self.lexer.next()
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.lexer.next_if(|t| t.is_keyword(keyword)).is_some()
    }

    fn eat_punct(&mut self, punct: char) -> bool {
        self.lexer
            .next_if(|t| t.kind == TokenKind::Punct(punct))
            .is_some()
    }

    /// `CREATE [OR REPLACE]`
    fn create_preamble(&mut self) -> Option<()> {
        if !self.eat_keyword("CREATE") {
            return None;
        }
        if self.eat_keyword("OR") && !self.eat_keyword("REPLACE") {
            return None;
        }
        Some(())
    }

    fn identifier(&mut self) -> Option<String> {
        let ident = self.lexer.peek()?.identifier()?;
        self.lexer.next();
        Some(ident)
    }

    /// `name`, `schema.name` or `database.schema.name`.
    fn qualified_name(&mut self) -> Option<(Option<String>, String)> {
        let mut parts = vec![self.identifier()?];
        while self.eat_punct('.') {
            parts.push(self.identifier()?);
        }
        let name = parts.pop()?;
        match parts.len() {
            0 => Some((None, name)),
            1 | 2 => Some((parts.pop(), name)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_schema_qualified() {
        let id = resolve_routine_identity(
            "CREATE FUNCTION public.add(a int, b int) RETURNS int LANGUAGE sql AS $$ SELECT a+b $$",
        )
        .unwrap();
        assert_eq!(id.kind, RoutineKind::Function);
        assert_eq!(id.schema.as_deref(), Some("public"));
        assert_eq!(id.name, "add");
    }

    #[test]
    fn test_routine_unqualified() {
        let id = resolve_routine_identity(
            "CREATE FUNCTION my_func() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$",
        )
        .unwrap();
        assert_eq!(id.schema, None);
        assert_eq!(id.name, "my_func");
        assert_eq!(
            id.qualify("app"),
            RoutineName {
                schema: "app".into(),
                name: "my_func".into()
            }
        );
    }

    #[test]
    fn test_routine_or_replace_and_procedure() {
        let id = resolve_routine_identity(
            "create or replace procedure audit.log_event() language sql as $$ select 1 $$",
        )
        .unwrap();
        assert_eq!(id.kind, RoutineKind::Procedure);
        assert_eq!(id.schema.as_deref(), Some("audit"));
        assert_eq!(id.name, "log_event");
    }

    #[test]
    fn test_routine_quoted_identifiers() {
        let id = resolve_routine_identity(
            r#"CREATE FUNCTION "My Schema"."My ""Func"""() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$"#,
        )
        .unwrap();
        assert_eq!(id.schema.as_deref(), Some("My Schema"));
        assert_eq!(id.name, r#"My "Func""#);
    }

    #[test]
    fn test_routine_unquoted_folds_to_lower_case() {
        let id = resolve_routine_identity(
            "CREATE FUNCTION Audit.LogEvent() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$",
        )
        .unwrap();
        assert_eq!(id.schema.as_deref(), Some("audit"));
        assert_eq!(id.name, "logevent");
    }

    #[test]
    fn test_routine_leading_comments_and_newlines() {
        let ddl = "-- keeps the audit trail\n/* block /* nested */ comment */\nCREATE\n  FUNCTION\n  public.f\n  ()\nRETURNS void LANGUAGE sql AS $$ SELECT 1 $$";
        let id = resolve_routine_identity(ddl).unwrap();
        assert_eq!(id.schema.as_deref(), Some("public"));
        assert_eq!(id.name, "f");
    }

    #[test]
    fn test_routine_rejects_other_statements() {
        for ddl in [
            "SELECT 1",
            "CREATE TABLE public.t (id int)",
            "CREATE TRIGGER t AFTER INSERT ON x FOR EACH ROW EXECUTE FUNCTION f()",
            "CREATE OR FUNCTION f() RETURNS int",
            "CREATE FUNCTION f RETURNS int",
            "CREATE FUNCTION a.b.c.d() RETURNS int",
            "",
        ] {
            let err = resolve_routine_identity(ddl).unwrap_err();
            assert_eq!(err.expected, "function or procedure");
            assert_eq!(err.ddl, ddl);
        }
    }

    #[test]
    fn test_trigger_schema_qualified() {
        let id = resolve_trigger_identity(
            "CREATE TRIGGER audit_trg AFTER INSERT ON public.orders FOR EACH ROW EXECUTE FUNCTION audit_fn()",
        )
        .unwrap();
        assert_eq!(id.schema.as_deref(), Some("public"));
        assert_eq!(id.table, "orders");
        assert_eq!(id.trigger, "audit_trg");
    }

    #[test]
    fn test_trigger_unqualified() {
        let id = resolve_trigger_identity(
            "CREATE TRIGGER trg BEFORE UPDATE ON t FOR EACH ROW EXECUTE FUNCTION fn()",
        )
        .unwrap();
        assert_eq!(id.schema, None);
        assert_eq!(
            id.qualify("public"),
            TriggerKey {
                schema: "public".into(),
                table_name: "t".into(),
                trigger_name: "trg".into(),
            }
        );
    }

    #[test]
    fn test_trigger_multiline() {
        let ddl = "CREATE TRIGGER trg\nAFTER INSERT\nON public.orders\nFOR EACH ROW\nEXECUTE FUNCTION notify()";
        let id = resolve_trigger_identity(ddl).unwrap();
        assert_eq!(id.schema.as_deref(), Some("public"));
        assert_eq!(id.table, "orders");
        assert_eq!(id.trigger, "trg");
    }

    #[test]
    fn test_trigger_update_of_columns_and_quotes() {
        let ddl = r#"CREATE OR REPLACE CONSTRAINT TRIGGER "Check Total"
            AFTER UPDATE OF "on", total OR DELETE
            ON "Sales"."Order Lines"
            DEFERRABLE INITIALLY DEFERRED
            FOR EACH ROW EXECUTE FUNCTION check_total()"#;
        let id = resolve_trigger_identity(ddl).unwrap();
        assert_eq!(id.trigger, "Check Total");
        assert_eq!(id.schema.as_deref(), Some("Sales"));
        assert_eq!(id.table, "Order Lines");
        assert!(id.constraint);
    }

    #[test]
    fn test_trigger_drop_if_exists_sql() {
        let id = resolve_trigger_identity(
            "CREATE CONSTRAINT TRIGGER chk AFTER INSERT ON orders DEFERRABLE FOR EACH ROW EXECUTE FUNCTION f()",
        )
        .unwrap();
        assert!(id.constraint);
        assert_eq!(id.drop_if_exists_sql(), r#"DROP TRIGGER IF EXISTS "chk" ON "orders""#);

        let id = resolve_trigger_identity(
            "CREATE TRIGGER t AFTER INSERT ON app.orders FOR EACH ROW EXECUTE FUNCTION f()",
        )
        .unwrap();
        assert!(!id.constraint);
        assert_eq!(id.drop_if_exists_sql(), r#"DROP TRIGGER IF EXISTS "t" ON "app"."orders""#);
    }

    #[test]
    fn test_trigger_rejects_other_statements() {
        for ddl in [
            "CREATE FUNCTION f() RETURNS trigger",
            "CREATE TRIGGER public.trg AFTER INSERT ON t FOR EACH ROW EXECUTE FUNCTION f()",
            "CREATE TRIGGER trg AFTER INSERT",
            "CREATE TRIGGER trg AFTER INSERT ON",
            "CREATE TRIGGER 'trg' AFTER INSERT ON t",
        ] {
            let err = resolve_trigger_identity(ddl).unwrap_err();
            assert_eq!(err.expected, "trigger");
        }
    }

    #[test]
    fn test_unterminated_text_is_unresolvable() {
        assert!(resolve_trigger_identity("CREATE TRIGGER trg AFTER INSERT /* ON t").is_err());
        assert!(resolve_trigger_identity("CREATE TRIGGER trg AFTER 'INSERT ON t").is_err());
        assert!(resolve_routine_identity(r#"CREATE FUNCTION "unterminated() RETURNS int"#).is_err());
    }

    #[test]
    fn test_dollar_quoted_bodies_are_skipped() {
        let ddl = "CREATE TRIGGER trg AFTER INSERT $x$ ON decoy $x$ ON real_table FOR EACH ROW EXECUTE FUNCTION f()";
        let id = resolve_trigger_identity(ddl).unwrap();
        assert_eq!(id.table, "real_table");
    }

    #[test]
    fn test_ensure_or_replace_function() {
        let out = ensure_or_replace("CREATE FUNCTION public.f() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$");
        assert_eq!(
            out,
            "CREATE OR REPLACE FUNCTION public.f() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$"
        );
    }

    #[test]
    fn test_ensure_or_replace_trigger_lower_case() {
        let out = ensure_or_replace("create trigger t after insert on tbl for each row execute function fn()");
        assert_eq!(
            out,
            "create OR REPLACE trigger t after insert on tbl for each row execute function fn()"
        );
    }

    #[test]
    fn test_ensure_or_replace_already_present() {
        let ddl = "CREATE OR REPLACE FUNCTION public.f() RETURNS void LANGUAGE sql AS $$ SELECT 1 $$";
        assert!(matches!(ensure_or_replace(ddl), Cow::Borrowed(_)));
    }

    #[test]
    fn test_ensure_or_replace_leaves_body_alone() {
        let ddl = "-- header\nCREATE FUNCTION public.tricky() RETURNS text LANGUAGE sql AS $body$\n  SELECT 'CREATE FUNCTION inside_body'\n$body$";
        let out = ensure_or_replace(ddl);
        assert_eq!(
            out,
            "-- header\nCREATE OR REPLACE FUNCTION public.tricky() RETURNS text LANGUAGE sql AS $body$\n  SELECT 'CREATE FUNCTION inside_body'\n$body$"
        );
    }

    #[test]
    fn test_ensure_or_replace_ignores_other_objects() {
        let ddl = "CREATE TABLE t (id int)";
        assert_eq!(ensure_or_replace(ddl), ddl);
    }

    #[test]
    fn test_ensure_or_replace_skips_constraint_triggers() {
        let ddl = "CREATE CONSTRAINT TRIGGER chk AFTER INSERT ON t FOR EACH ROW EXECUTE FUNCTION f()";
        assert!(matches!(ensure_or_replace(ddl), Cow::Borrowed(_)));
    }
}
