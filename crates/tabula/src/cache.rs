//! Cache records.
//!
//! The engine never inspects the live catalog. What it believes the database
//! looks like is whatever the cache record says, and a record is only
//! rewritten after the statements that changed it succeeded.
//!
//! A record is one brace-delimited line:
//!
//! ```text
//! [1.4] tcache app.users {
//!   id integer notnull identity;
//!   email varchar(200) notnull;
//! } {
//!   pk pk_0a1b2c3d_4e5f6a7b { id; };
//! } {
//! } {
//! ;
//! seed-admin ;
//! };
//! ```
//!
//! Words are separated by whitespace, `;` ends a line, `{ }` nest lines and
//! `[...]` is a literal in which `[` escapes the next character. `#` starts a
//! comment.

use tabula_schema::{Field, ForeignKey, ForeignKeyField, Key, KeyKind, Proc, Table, Thing};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Word(String),
    Block(Vec<Vec<Item>>),
}

struct Tokenizer<'a> {
    name: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(name: &'a str, text: &'a str) -> Self {
        Self {
            name,
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::CacheParse {
            name: self.name.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                for c in self.chars.by_ref() {
                    if c == '\n' {
                        self.line += 1;
                        break;
                    }
                }
            } else if c.is_whitespace() {
                if c == '\n' {
                    self.line += 1;
                }
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn lines(&mut self, nested: bool) -> Result<Vec<Vec<Item>>, Error> {
        let mut lines = Vec::new();
        let mut current = Vec::new();
        loop {
            self.skip_blank();
            match self.chars.peek().copied() {
                None if nested => return Err(self.error("unclosed '{'")),
                None if !current.is_empty() => return Err(self.error("missing ';'")),
                None => return Ok(lines),
                Some(';') => {
                    self.chars.next();
                    lines.push(std::mem::take(&mut current));
                }
                Some('{') => {
                    self.chars.next();
                    let block = self.lines(true)?;
                    current.push(Item::Block(block));
                }
                Some('}') if !nested => return Err(self.error("unexpected '}'")),
                Some('}') => {
                    self.chars.next();
                    // A block may close a line without its ';'.
                    if !current.is_empty() {
                        lines.push(current);
                    }
                    return Ok(lines);
                }
                Some('[') => {
                    self.chars.next();
                    let word = self.literal()?;
                    current.push(Item::Word(word));
                }
                Some(_) => current.push(Item::Word(self.bare())),
            }
        }
    }

    fn literal(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        loop {
            let c = match self.chars.next() {
                None => return Err(self.error("unterminated '['")),
                Some(']') => return Ok(out),
                Some('[') => match self.chars.next() {
                    Some(c) => c,
                    None => return Err(self.error("unterminated '['")),
                },
                Some(c) => c,
            };
            if c == '\n' {
                self.line += 1;
            }
            out.push(c);
        }
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || ";{}[#".contains(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }
}

fn needs_literal(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || ";{}[]#".contains(c))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if c == '[' || c == ']' {
            out.push('[');
        }
        out.push(c);
    }
    out
}

/// A word as written in a record: bare when possible, literal otherwise.
fn word(s: &str) -> String {
    if needs_literal(s) {
        format!("[{}]", escape(s))
    } else {
        s.to_string()
    }
}

const TABLE: &str = "tcache";
const PROC: &str = "spcache";
const FUNCTION: &str = "sfcache";
const PRE_UPGRADE: &str = "spcache-preupgrade";
/// Stands in for an absent sequence field, sequence or trigger name.
const ABSENT: &str = "-";

/// Serialize a table's current state.
pub fn write_table(table: &Table) -> String {
    let mut out = format!("[{}] {} {}", escape(&table.revision), TABLE, word(&table.name));
    if table.existing {
        out.push_str(" existing {\n");
        push_befores(&mut out, table.befores.iter());
        out.push_str(";\n};\n");
        return out;
    }

    out.push_str(" {\n");
    for f in &table.fields {
        out.push_str(&format!(
            "  {} {} {}{};\n",
            word(&f.name),
            word(&f.db_type),
            if f.nullable { "nullable" } else { "notnull" },
            if f.identity { " identity" } else { "" }
        ));
    }
    out.push_str("} {\n");
    for k in &table.keys {
        out.push_str(&format!("  {} {} {{ ", k.kind.tag(), word(&k.name)));
        for f in &k.fields {
            out.push_str(&word(f));
            out.push_str("; ");
        }
        out.push_str("};\n");
    }
    out.push_str("} {\n");
    for fk in &table.foreign_keys {
        out.push_str(&format!("  {} {} {{ ", word(&fk.name), word(&fk.target)));
        for pair in &fk.fields {
            out.push_str(&format!("{} {}; ", word(&pair.local), word(&pair.remote)));
        }
        out.push('}');
        if fk.cascade {
            out.push_str(" cascade");
        }
        out.push_str(";\n");
    }
    out.push_str("} {\n");
    let seq = [&table.seq_field, &table.seq_name, &table.trigger_name];
    if seq.iter().any(|part| part.is_some()) {
        for part in seq {
            out.push_str(&part.as_deref().map_or_else(|| ABSENT.to_string(), word));
            out.push(' ');
        }
    }
    out.push_str(";\n");
    push_befores(&mut out, table.befores.iter());
    out.push_str(";\n};\n");
    out
}

/// Serialize a routine's current state.
pub fn write_proc(proc: &Proc) -> String {
    let kind = if proc.is_function {
        FUNCTION
    } else if proc.pre_upgrade_hook {
        PRE_UPGRADE
    } else {
        PROC
    };
    let mut out = format!(
        "[{}] {} {} [{}] {{\n",
        escape(&proc.revision),
        kind,
        word(&proc.name),
        escape(proc.body.as_deref().unwrap_or(""))
    );
    push_befores(&mut out, proc.befores.iter());
    out.push_str("\n;};\n");
    out
}

pub fn write_thing(thing: &Thing) -> String {
    match thing {
        Thing::Table(t) => write_table(t),
        Thing::Proc(p) => write_proc(p),
    }
}

fn push_befores<'a>(out: &mut String, befores: impl Iterator<Item = &'a String>) {
    for b in befores {
        out.push_str(&word(b));
        out.push(' ');
    }
}

/// The revision a record was written for, read from its `[...]` prefix
/// without parsing the rest.
pub fn record_revision(text: &str) -> String {
    match text.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or_default().to_string(),
        None => String::new(),
    }
}

/// Whether a record describes a table tabula manages (as opposed to a
/// routine or an `existing` table).
pub fn is_managed_table(thing: &Thing) -> bool {
    matches!(thing, Thing::Table(t) if !t.existing)
}

struct Record<'a> {
    name: &'a str,
    items: std::slice::Iter<'a, Item>,
}

impl<'a> Record<'a> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::CacheParse {
            name: self.name.to_string(),
            line: 1,
            message: message.into(),
        }
    }

    fn word(&mut self, what: &str) -> Result<&'a str, Error> {
        match self.items.next() {
            Some(Item::Word(w)) => Ok(w),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn block(&mut self, what: &str) -> Result<&'a [Vec<Item>], Error> {
        match self.items.next() {
            Some(Item::Block(b)) => Ok(b),
            _ => Err(self.error(format!("expected {{ {what} }}"))),
        }
    }
}

fn words<'a>(line: &'a [Item]) -> impl Iterator<Item = &'a str> {
    line.iter().filter_map(|i| match i {
        Item::Word(w) => Some(w.as_str()),
        Item::Block(_) => None,
    })
}

/// Parse a record. `name` is only used in error messages.
pub fn parse_record(name: &str, text: &str) -> Result<Thing, Error> {
    let mut tokenizer = Tokenizer::new(name, text);
    let lines = tokenizer.lines(false)?;
    let line = match lines.as_slice() {
        [line] => line,
        _ => {
            return Err(Error::CacheParse {
                name: name.to_string(),
                line: 1,
                message: format!("expected exactly one record, found {}", lines.len()),
            });
        }
    };

    let mut rec = Record {
        name,
        items: line.iter(),
    };
    let first = rec.word("revision")?;
    let (revision, kind) = if first == TABLE {
        (String::new(), first)
    } else {
        (first.to_string(), rec.word("record kind")?)
    };

    match kind {
        TABLE => parse_table(&mut rec, revision).map(Thing::Table),
        PROC | FUNCTION | PRE_UPGRADE => {
            let mut proc = Proc::new(rec.word("routine name")?);
            proc.revision = revision;
            proc.is_function = kind == FUNCTION;
            proc.pre_upgrade_hook = kind == PRE_UPGRADE;
            let body = rec.word("routine body")?;
            proc.body = (!body.is_empty()).then(|| body.to_string());
            let befores = rec.block("before-hooks")?;
            if let Some(line) = befores.first() {
                proc.befores.extend(words(line).map(str::to_string));
            }
            Ok(Thing::Proc(proc))
        }
        other => Err(rec.error(format!("unknown record kind {other:?}"))),
    }
}

fn parse_table(rec: &mut Record<'_>, revision: String) -> Result<Table, Error> {
    let mut table = Table::new(rec.word("table name")?);
    table.revision = revision;

    let peeked = rec.items.clone().next();
    if let Some(Item::Word(w)) = peeked {
        if w != "existing" {
            return Err(rec.error(format!("unexpected {w:?}")));
        }
        rec.items.next();
        table.existing = true;
        if let Some(Item::Block(block)) = rec.items.next()
            && let Some(line) = block.first()
        {
            table.befores.extend(words(line).map(str::to_string));
        }
        return Ok(table);
    }

    for line in rec.block("fields")? {
        let mut w = words(line);
        let (Some(name), Some(db_type), Some(null)) = (w.next(), w.next(), w.next()) else {
            return Err(rec.error("field needs a name, a type and nullability"));
        };
        let mut field = Field::new(name, db_type, null == "nullable");
        field.identity = w.next() == Some("identity");
        table.fields.push(field);
    }

    for line in rec.block("indexes")? {
        let (Some(Item::Word(tag)), Some(Item::Word(name)), Some(Item::Block(cols))) =
            (line.first(), line.get(1), line.get(2))
        else {
            return Err(rec.error("index needs a kind, a name and fields"));
        };
        table.keys.push(Key {
            name: name.clone(),
            kind: KeyKind::from_tag(tag),
            fields: cols.iter().filter_map(|l| words(l).next()).map(str::to_string).collect(),
        });
    }

    for line in rec.block("foreign keys")? {
        let (Some(Item::Word(name)), Some(Item::Word(target)), Some(Item::Block(pairs))) =
            (line.first(), line.get(1), line.get(2))
        else {
            return Err(rec.error("foreign key needs a name, a target and fields"));
        };
        if table.foreign_key(name).is_some() {
            continue;
        }
        let mut fields = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let mut w = words(pair);
            let (Some(local), Some(remote)) = (w.next(), w.next()) else {
                return Err(rec.error("foreign key field needs two names"));
            };
            fields.push(ForeignKeyField {
                local: local.to_string(),
                remote: remote.to_string(),
            });
        }
        table.foreign_keys.push(ForeignKey {
            name: name.clone(),
            target: target.clone(),
            fields,
            cascade: matches!(line.get(3), Some(Item::Word(w)) if w == "cascade"),
        });
    }

    if let Some(Item::Block(block)) = rec.items.next() {
        if let Some(seq) = block.first() {
            let mut w = words(seq).map(|w| (w != ABSENT).then(|| w.to_string()));
            table.seq_field = w.next().flatten();
            table.seq_name = w.next().flatten();
            table.trigger_name = w.next().flatten();
        }
        if let Some(befores) = block.get(1) {
            table.befores.extend(words(befores).map(str::to_string));
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        let mut t = Table::new("app.users");
        t.revision = "1.4".into();
        t.fields.push(Field::new("id", "integer", false).identity());
        t.fields.push(Field::new("email", "varchar(200)", false));
        t.fields.push(Field::new("score", "double precision", true));
        t.keys.push(Key {
            name: "pk_1_2".into(),
            kind: KeyKind::Primary,
            fields: vec!["id".into()],
        });
        t.keys.push(Key {
            name: "ix_1_3".into(),
            kind: KeyKind::Plain,
            fields: vec!["email".into(), "score".into()],
        });
        t.foreign_keys.push(ForeignKey {
            name: "fk_1_4".into(),
            target: "app.orgs".into(),
            fields: vec![ForeignKeyField {
                local: "id".into(),
                remote: "owner_id".into(),
            }],
            cascade: true,
        });
        t.befores.insert("seed-admin".into());
        t
    }

    #[test]
    fn test_table_record_layout() {
        insta::assert_snapshot!(write_table(&users()), @r"
        [1.4] tcache app.users {
          id integer notnull identity;
          email varchar(200) notnull;
          score [double precision] nullable;
        } {
          pk pk_1_2 { id; };
          ix ix_1_3 { email; score; };
        } {
          fk_1_4 app.orgs { id owner_id; } cascade;
        } {
        ;
        seed-admin ;
        };
        ");
    }

    #[test]
    fn test_table_record_is_stable() {
        let mut table = users();
        table.seq_field = Some("id".into());
        table.seq_name = Some("app.sq_1_id".into());
        let text = write_table(&table);
        let parsed = parse_record("app.users", &text).unwrap();
        assert_eq!(parsed, Thing::Table(table));
        assert_eq!(write_thing(&parsed), text);
    }

    #[test]
    fn test_sequence_names_keep_their_slots() {
        let mut table = users();
        table.seq_name = Some("app.sq_1_id".into());
        table.trigger_name = Some("app.sqt_1_id".into());
        let text = write_table(&table);
        assert!(text.contains("} {\n- app.sq_1_id app.sqt_1_id ;\n"));
        let Thing::Table(parsed) = parse_record("app.users", &text).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(parsed.seq_field, None);
        assert_eq!(parsed.seq_name.as_deref(), Some("app.sq_1_id"));
        assert_eq!(parsed.trigger_name.as_deref(), Some("app.sqt_1_id"));

        table.seq_name = None;
        let Thing::Table(parsed) = parse_record("app.users", &write_table(&table)).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(parsed.seq_name, None);
        assert_eq!(parsed.trigger_name.as_deref(), Some("app.sqt_1_id"));
    }

    #[test]
    fn test_existing_table() {
        let mut table = Table::existing("legacy.accounts");
        table.befores.insert("grant-read".into());
        let text = write_table(&table);
        assert_eq!(text, "[] tcache legacy.accounts existing {\ngrant-read ;\n};\n");
        assert_eq!(parse_record("legacy.accounts", &text).unwrap(), Thing::Table(table));
    }

    #[test]
    fn test_proc_record_escapes_body() {
        let mut proc = Proc::new("app.touch");
        proc.revision = "1.1".into();
        proc.pre_upgrade_hook = true;
        proc.body = Some("() AS $$ SELECT a[1] FROM t; $$".into());
        let text = write_proc(&proc);
        assert!(text.starts_with("[1.1] spcache-preupgrade app.touch [() AS $$ SELECT a[[1[] FROM t; $$] {\n"));
        let parsed = parse_record("app.touch", &text).unwrap();
        assert_eq!(parsed, Thing::Proc(proc));
        assert_eq!(write_thing(&parsed), text);
    }

    #[test]
    fn test_absent_proc_body() {
        let proc = Proc::new("app.gone");
        let text = write_proc(&proc);
        assert_eq!(text, "[] spcache app.gone [] {\n\n;};\n");
        let Thing::Proc(parsed) = parse_record("app.gone", &text).unwrap() else {
            panic!("expected a routine");
        };
        assert_eq!(parsed.body, None);
    }

    #[test]
    fn test_record_revision() {
        assert_eq!(record_revision("[1.12] tcache x {"), "1.12");
        assert_eq!(record_revision("tcache x {"), "");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_record("x", "[1] tcache x {\n"),
            Err(Error::CacheParse { .. })
        ));
        assert!(matches!(
            parse_record("x", "[1] nonsense x;"),
            Err(Error::CacheParse { .. })
        ));
    }

    #[test]
    fn test_comments_and_missing_revision() {
        let text = "# written by hand\ntcache app.t {\n  a int nullable;\n} {\n} {\n};\n";
        let Thing::Table(t) = parse_record("app.t", text).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(t.revision, "");
        assert_eq!(t.fields.len(), 1);
        assert!(t.befores.is_empty());
    }
}
