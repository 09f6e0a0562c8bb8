//! Layout token patterns
//!
//! A pattern such as
//! `[orgPath]/[module]/[baseRev](-[folderItegRev])/[module]-[baseRev](-[fileItegRev])(-[classifier]).[ext]`
//! is split into a folder part and a file part. The folder regex is compiled
//! once; the file regex is built per path with the folder captures inlined as
//! literals, since tokens such as `[module]` repeat across both parts and the
//! regex engine has no backreferences.

use crate::error::{DepotError, DepotResult};
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Layout tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Org,
    OrgPath,
    Module,
    BaseRev,
    FolderItegRev,
    FileItegRev,
    Classifier,
    Ext,
    Type,
}

impl Token {
    fn all() -> &'static [Self] {
        &[
            Self::Org,
            Self::OrgPath,
            Self::Module,
            Self::BaseRev,
            Self::FolderItegRev,
            Self::FileItegRev,
            Self::Classifier,
            Self::Ext,
            Self::Type,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::OrgPath => "orgPath",
            Self::Module => "module",
            Self::BaseRev => "baseRev",
            Self::FolderItegRev => "folderItegRev",
            Self::FileItegRev => "fileItegRev",
            Self::Classifier => "classifier",
            Self::Ext => "ext",
            Self::Type => "type",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.name() == name)
    }
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Token(Token),
    Optional(Vec<Piece>),
}

/// Regexes substituted for the integration revision tokens
#[derive(Debug, Clone)]
pub struct IntegrationRegexes {
    pub folder: String,
    pub file: String,
}

impl IntegrationRegexes {
    fn for_token(&self, token: Token) -> String {
        match token {
            Token::Org | Token::Module | Token::BaseRev | Token::Classifier | Token::Ext
            | Token::Type => "[^/]+?".to_string(),
            Token::OrgPath => ".+?".to_string(),
            Token::FolderItegRev => format!("(?:{})", self.folder),
            Token::FileItegRev => format!("(?:{})", self.file),
        }
    }
}

/// Token values captured from a path
pub type TokenValues = HashMap<Token, String>;

/// A parsed and validated layout pattern
#[derive(Debug, Clone)]
pub struct LayoutPattern {
    raw: String,
    folder: Vec<Piece>,
    file: Vec<Piece>,
    folder_regex: Option<Regex>,
    integration: IntegrationRegexes,
}

impl LayoutPattern {
    pub fn new(raw: &str, integration: IntegrationRegexes) -> DepotResult<Self> {
        let invalid = |reason: String| DepotError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };

        let pieces = parse_pieces(raw).map_err(invalid)?;
        for required in [Token::Module, Token::BaseRev] {
            if !contains_token(&pieces, required) {
                return Err(invalid(format!("missing required token [{}]", required.name())));
            }
        }
        for (token, regex) in [
            (Token::FolderItegRev, &integration.folder),
            (Token::FileItegRev, &integration.file),
        ] {
            if contains_token(&pieces, token) {
                if regex.is_empty() {
                    return Err(invalid(format!(
                        "[{}] used but no integration revision regexp configured",
                        token.name()
                    )));
                }
                Regex::new(regex).map_err(|e| invalid(e.to_string()))?;
            }
        }

        let (folder, file) = split_folder_file(pieces);
        let folder_regex = if folder.is_empty() {
            None
        } else {
            let source = build_regex(&folder, &TokenValues::new(), &integration);
            Some(Regex::new(&source).map_err(|e| invalid(e.to_string()))?)
        };

        // The file part must compile on its own too
        Regex::new(&build_regex(&file, &TokenValues::new(), &integration))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            folder,
            file,
            folder_regex,
            integration,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match the folder part of the pattern alone
    pub fn match_folder(&self, dir: &str) -> Option<TokenValues> {
        let regex = self.folder_regex.as_ref()?;
        let caps = regex.captures(dir)?;
        let mut values = TokenValues::new();
        collect(regex, &caps, &mut values).then_some(values)
    }

    /// Match a full relative path, returning the captured token values
    pub fn match_path(&self, path: &str) -> Option<TokenValues> {
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", path),
        };

        let mut values = match &self.folder_regex {
            Some(_) if dir.is_empty() => return None,
            Some(_) => self.match_folder(dir)?,
            None if !dir.is_empty() => return None,
            None => TokenValues::new(),
        };

        let file_regex = Regex::new(&build_regex(&self.file, &values, &self.integration)).ok()?;
        let caps = file_regex.captures(file)?;
        collect(&file_regex, &caps, &mut values).then_some(values)
    }
}

fn parse_pieces(pattern: &str) -> Result<Vec<Piece>, String> {
    let mut stack: Vec<Vec<Piece>> = vec![Vec::new()];
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let name: String = chars.by_ref().take_while(|&c| c != ']').collect();
                let token =
                    Token::from_name(&name).ok_or_else(|| format!("unknown token [{}]", name))?;
                current(&mut stack).push(Piece::Token(token));
            }
            '(' => stack.push(Vec::new()),
            ')' => {
                if stack.len() < 2 {
                    return Err("unbalanced ')'".to_string());
                }
                let inner = stack.pop().unwrap_or_default();
                current(&mut stack).push(Piece::Optional(inner));
            }
            c => match current(&mut stack).last_mut() {
                Some(Piece::Literal(lit)) => lit.push(c),
                _ => current(&mut stack).push(Piece::Literal(c.to_string())),
            },
        }
    }

    if stack.len() != 1 {
        return Err("unbalanced '('".to_string());
    }
    Ok(stack.pop().unwrap_or_default())
}

fn current(stack: &mut [Vec<Piece>]) -> &mut Vec<Piece> {
    let last = stack.len() - 1;
    &mut stack[last]
}

fn contains_token(pieces: &[Piece], token: Token) -> bool {
    pieces.iter().any(|p| match p {
        Piece::Token(t) => *t == token,
        Piece::Optional(inner) => contains_token(inner, token),
        Piece::Literal(_) => false,
    })
}

/// Split at the last top-level `/`
fn split_folder_file(pieces: Vec<Piece>) -> (Vec<Piece>, Vec<Piece>) {
    let split_at = pieces
        .iter()
        .rposition(|p| matches!(p, Piece::Literal(lit) if lit.contains('/')));
    let Some(idx) = split_at else {
        return (Vec::new(), pieces);
    };

    let mut folder = pieces;
    let mut file = folder.split_off(idx + 1);
    if let Some(Piece::Literal(lit)) = folder.pop() {
        if let Some((before, after)) = lit.rsplit_once('/') {
            if !before.is_empty() {
                folder.push(Piece::Literal(before.to_string()));
            }
            if !after.is_empty() {
                file.insert(0, Piece::Literal(after.to_string()));
            }
        }
    }
    (folder, file)
}

fn build_regex(pieces: &[Piece], known: &TokenValues, integration: &IntegrationRegexes) -> String {
    let mut counts = HashMap::new();
    let mut out = String::from("^");
    emit(pieces, known, integration, &mut counts, &mut out);
    out.push('$');
    out
}

fn emit(
    pieces: &[Piece],
    known: &TokenValues,
    integration: &IntegrationRegexes,
    counts: &mut HashMap<Token, usize>,
    out: &mut String,
) {
    for piece in pieces {
        match piece {
            Piece::Literal(lit) => out.push_str(&regex::escape(lit)),
            Piece::Token(token) => match known.get(token) {
                Some(value) => out.push_str(&regex::escape(value)),
                None => {
                    let n = counts.entry(*token).or_insert(0);
                    out.push_str(&format!(
                        "(?P<{}_{}>{})",
                        token.name(),
                        n,
                        integration.for_token(*token)
                    ));
                    *n += 1;
                }
            },
            Piece::Optional(inner) => {
                out.push_str("(?:");
                emit(inner, known, integration, counts, out);
                out.push_str(")?");
            }
        }
    }
}

/// Merge captures into `values`; false if a repeated token disagrees
fn collect(regex: &Regex, caps: &Captures<'_>, values: &mut TokenValues) -> bool {
    for name in regex.capture_names().flatten() {
        let Some(value) = caps.name(name) else { continue };
        let Some(token) = name.rsplit_once('_').and_then(|(t, _)| Token::from_name(t)) else {
            continue;
        };
        match values.get(&token) {
            Some(existing) if existing != value.as_str() => return false,
            Some(_) => {}
            None => {
                values.insert(token, value.as_str().to_string());
            }
        }
    }
    true
}
