//! Symbolic target expressions: `[file ::] symbol`.

/// What a target names inside a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// `Name` — top-level function.
    Function(String),
    /// `Class.Name` — method in a top-level class's direct body.
    Method { class: String, name: String },
    /// `Class.*` — the whole class.
    Class(String),
    /// `@Name` — module-level assignment (plain or annotated).
    ModuleAssign(String),
    /// `Class.@Name` — class-level assignment.
    ClassAssign { class: String, name: String },
}

impl Symbol {
    pub fn describe(&self) -> String {
        match self {
            Symbol::Function(name) => name.clone(),
            Symbol::Method { class, name } => format!("{class}.{name}"),
            Symbol::Class(class) => format!("{class}.*"),
            Symbol::ModuleAssign(name) => format!("@{name}"),
            Symbol::ClassAssign { class, name } => format!("{class}.@{name}"),
        }
    }
}

/// A parsed target expression with the file reference already folded with the
/// bundle's inherited `DEFAULT_FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub file: Option<String>,
    pub symbol: Symbol,
    /// Raw text as written in the bundle, for result records.
    pub raw: String,
}

pub(crate) fn parse_target(
    raw: &str,
    default_file: Option<&str>,
) -> Result<Target, String> {
    let (file, symbol_text) = match raw.split_once("::") {
        Some((file, rest)) => {
            let file = file.trim();
            if file.is_empty() {
                return Err("empty file reference before '::'".into());
            }
            (Some(file.to_string()), rest.trim())
        }
        None => (None, raw.trim()),
    };
    let symbol = parse_symbol(symbol_text)?;
    Ok(Target {
        file: file.or_else(|| default_file.map(String::from)),
        symbol,
        raw: raw.to_string(),
    })
}

fn parse_symbol(text: &str) -> Result<Symbol, String> {
    if text.is_empty() {
        return Err("empty symbol".into());
    }
    if let Some(name) = text.strip_prefix('@') {
        check_ident(name)?;
        return Ok(Symbol::ModuleAssign(name.to_string()));
    }
    if let Some((class, rest)) = text.split_once('.') {
        check_ident(class)?;
        if rest == "*" {
            return Ok(Symbol::Class(class.to_string()));
        }
        if let Some(name) = rest.strip_prefix('@') {
            check_ident(name)?;
            return Ok(Symbol::ClassAssign {
                class: class.to_string(),
                name: name.to_string(),
            });
        }
        check_ident(rest)?;
        return Ok(Symbol::Method {
            class: class.to_string(),
            name: rest.to_string(),
        });
    }
    check_ident(text)?;
    Ok(Symbol::Function(text.to_string()))
}

fn check_ident(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("'{name}' is not a valid identifier"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(raw: &str) -> Symbol {
        parse_target(raw, None).unwrap().symbol
    }

    #[test]
    fn parses_function() {
        assert_eq!(sym("handler"), Symbol::Function("handler".into()));
    }

    #[test]
    fn parses_method_and_class() {
        assert_eq!(
            sym("Widget.draw"),
            Symbol::Method {
                class: "Widget".into(),
                name: "draw".into()
            }
        );
        assert_eq!(sym("Widget.*"), Symbol::Class("Widget".into()));
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(sym("@LIMIT"), Symbol::ModuleAssign("LIMIT".into()));
        assert_eq!(
            sym("Widget.@cache"),
            Symbol::ClassAssign {
                class: "Widget".into(),
                name: "cache".into()
            }
        );
    }

    #[test]
    fn file_prefix_beats_default_file() {
        let t = parse_target("pkg/mod.py::run", Some("other.py")).unwrap();
        assert_eq!(t.file.as_deref(), Some("pkg/mod.py"));
    }

    #[test]
    fn default_file_inherited_when_bare() {
        let t = parse_target("run", Some("other.py")).unwrap();
        assert_eq!(t.file.as_deref(), Some("other.py"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_target("1bad", None).is_err());
        assert!(parse_target("C.", None).is_err());
        assert!(parse_target("::f", None).is_err());
        assert!(parse_target("a b", None).is_err());
    }
}
