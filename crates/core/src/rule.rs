use crate::error::RuleError;
use crate::metadata::{resolve_timestamp, DateSource, Timestamps};
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    Numbers,
    Letters,
    Whitespace,
    Symbols,
}

impl CharClass {
    fn contains(self, ch: char) -> bool {
        match self {
            CharClass::Numbers => ch.is_numeric(),
            CharClass::Letters => ch.is_alphabetic(),
            CharClass::Whitespace => ch.is_whitespace(),
            CharClass::Symbols => !ch.is_alphanumeric() && !ch.is_whitespace(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStyle {
    #[serde(alias = "lower")]
    Lowercase,
    #[serde(alias = "upper")]
    Uppercase,
    #[serde(alias = "title")]
    Titlecase,
    #[serde(alias = "camel")]
    Camelcase,
    #[serde(alias = "snake")]
    Snakecase,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Start,
    #[default]
    End,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Start,
    End,
    Index(usize),
}

fn default_one() -> i64 {
    1
}

fn is_default_position(kind: &PositionKind) -> bool {
    *kind == PositionKind::End
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDefinition {
    StripPrefix {
        prefix: String,
    },
    StripSuffix {
        suffix: String,
    },
    FilterContent {
        filter: CharClass,
    },
    RegexReplace {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
    Literal {
        text: String,
        #[serde(default, skip_serializing_if = "is_default_position")]
        position: PositionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<i64>,
    },
    Counter {
        #[serde(default = "default_one")]
        start: i64,
        #[serde(default = "default_one")]
        step: i64,
        #[serde(default)]
        padding: i64,
        #[serde(default)]
        separator: String,
    },
    CaseTransform {
        transform: CaseStyle,
    },
    DateInsertion {
        format: String,
        #[serde(default)]
        source: DateSource,
        #[serde(default, skip_serializing_if = "is_default_position")]
        position: PositionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub enum Rule {
    StripPrefix(String),
    StripSuffix(String),
    FilterContent(CharClass),
    RegexReplace {
        regex: Regex,
        replacement: String,
    },
    Literal {
        text: String,
        position: Position,
    },
    Counter {
        start: i64,
        step: i64,
        padding: usize,
        separator: String,
    },
    CaseTransform(CaseStyle),
    DateInsertion {
        format: String,
        source: DateSource,
        position: Position,
    },
}

pub(crate) struct RuleContext<'a> {
    pub ordinal: usize,
    pub timestamps: &'a dyn Timestamps,
}

impl Rule {
    pub fn from_definition(definition: RuleDefinition, position: usize) -> Result<Rule, RuleError> {
        let rule = match definition {
            RuleDefinition::StripPrefix { prefix } => Rule::StripPrefix(prefix),
            RuleDefinition::StripSuffix { suffix } => Rule::StripSuffix(suffix),
            RuleDefinition::FilterContent { filter } => Rule::FilterContent(filter),
            RuleDefinition::RegexReplace {
                pattern,
                replacement,
            } => {
                let regex = Regex::new(&pattern).map_err(|err| RuleError::InvalidRegex {
                    position,
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
                Rule::RegexReplace { regex, replacement }
            }
            RuleDefinition::Literal {
                text,
                position: kind,
                index,
            } => Rule::Literal {
                text,
                position: build_position(kind, index, position)?,
            },
            RuleDefinition::Counter {
                start,
                step,
                padding,
                separator,
            } => Rule::Counter {
                start,
                step,
                padding: non_negative("padding", padding, position)?,
                separator,
            },
            RuleDefinition::CaseTransform { transform } => Rule::CaseTransform(transform),
            RuleDefinition::DateInsertion {
                format,
                source,
                position: kind,
                index,
            } => {
                if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
                    return Err(RuleError::InvalidDateFormat { position, format });
                }
                Rule::DateInsertion {
                    format,
                    source,
                    position: build_position(kind, index, position)?,
                }
            }
        };
        Ok(rule)
    }

    pub fn to_definition(&self) -> RuleDefinition {
        match self {
            Rule::StripPrefix(prefix) => RuleDefinition::StripPrefix {
                prefix: prefix.clone(),
            },
            Rule::StripSuffix(suffix) => RuleDefinition::StripSuffix {
                suffix: suffix.clone(),
            },
            Rule::FilterContent(filter) => RuleDefinition::FilterContent { filter: *filter },
            Rule::RegexReplace { regex, replacement } => RuleDefinition::RegexReplace {
                pattern: regex.as_str().to_string(),
                replacement: replacement.clone(),
            },
            Rule::Literal { text, position } => {
                let (position, index) = split_position(*position);
                RuleDefinition::Literal {
                    text: text.clone(),
                    position,
                    index,
                }
            }
            Rule::Counter {
                start,
                step,
                padding,
                separator,
            } => RuleDefinition::Counter {
                start: *start,
                step: *step,
                padding: i64::try_from(*padding).unwrap_or(i64::MAX),
                separator: separator.clone(),
            },
            Rule::CaseTransform(transform) => RuleDefinition::CaseTransform {
                transform: *transform,
            },
            Rule::DateInsertion {
                format,
                source,
                position,
            } => {
                let (position, index) = split_position(*position);
                RuleDefinition::DateInsertion {
                    format: format.clone(),
                    source: *source,
                    position,
                    index,
                }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::StripPrefix(_) => "strip_prefix",
            Rule::StripSuffix(_) => "strip_suffix",
            Rule::FilterContent(_) => "filter_content",
            Rule::RegexReplace { .. } => "regex_replace",
            Rule::Literal { .. } => "literal",
            Rule::Counter { .. } => "counter",
            Rule::CaseTransform(_) => "case_transform",
            Rule::DateInsertion { .. } => "date_insertion",
        }
    }

    pub(crate) fn apply(&self, name: &str, ctx: &RuleContext, warnings: &mut Vec<String>) -> String {
        match self {
            Rule::StripPrefix(prefix) => match name.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.to_string(),
                None => {
                    warnings.push(format!("prefix {prefix:?} not present"));
                    name.to_string()
                }
            },
            Rule::StripSuffix(suffix) => match name.strip_suffix(suffix.as_str()) {
                Some(rest) => rest.to_string(),
                None => {
                    warnings.push(format!("suffix {suffix:?} not present"));
                    name.to_string()
                }
            },
            Rule::FilterContent(class) => name.chars().filter(|ch| !class.contains(*ch)).collect(),
            Rule::RegexReplace { regex, replacement } => {
                if regex.is_match(name) {
                    regex.replace_all(name, replacement.as_str()).into_owned()
                } else {
                    warnings.push(format!("pattern {:?} matched zero times", regex.as_str()));
                    name.to_string()
                }
            }
            Rule::Literal { text, position } => insert_at(name, text, *position, warnings),
            Rule::Counter {
                start,
                step,
                padding,
                separator,
            } => {
                let value = i64::try_from(ctx.ordinal)
                    .ok()
                    .and_then(|ordinal| ordinal.checked_mul(*step))
                    .and_then(|offset| offset.checked_add(*start));
                let Some(value) = value else {
                    warnings.push(format!("counter overflow at ordinal {}", ctx.ordinal));
                    return name.to_string();
                };
                let counter = format!("{value:0width$}", width = *padding);
                if name.is_empty() {
                    counter
                } else {
                    format!("{name}{separator}{counter}")
                }
            }
            Rule::CaseTransform(style) => transform_case(name, *style),
            Rule::DateInsertion {
                format,
                source,
                position,
            } => {
                let Some(timestamp) = resolve_timestamp(*source, ctx.timestamps, warnings) else {
                    warnings.push("no timestamp available; date not inserted".to_string());
                    return name.to_string();
                };
                let mut rendered = String::new();
                if write!(rendered, "{}", timestamp.format(format)).is_err() {
                    warnings.push(format!("date format {format:?} could not be rendered"));
                    return name.to_string();
                }
                insert_at(name, &rendered, *position, warnings)
            }
        }
    }
}

fn build_position(
    kind: PositionKind,
    index: Option<i64>,
    position: usize,
) -> Result<Position, RuleError> {
    match kind {
        PositionKind::Start => Ok(Position::Start),
        PositionKind::End => Ok(Position::End),
        PositionKind::Index => {
            let index = index.ok_or(RuleError::MissingIndex { position })?;
            Ok(Position::Index(non_negative("index", index, position)?))
        }
    }
}

fn split_position(position: Position) -> (PositionKind, Option<i64>) {
    match position {
        Position::Start => (PositionKind::Start, None),
        Position::End => (PositionKind::End, None),
        Position::Index(i) => (
            PositionKind::Index,
            Some(i64::try_from(i).unwrap_or(i64::MAX)),
        ),
    }
}

fn non_negative(name: &'static str, value: i64, position: usize) -> Result<usize, RuleError> {
    usize::try_from(value).map_err(|_| RuleError::NegativeParameter {
        position,
        name,
        value,
    })
}

fn insert_at(name: &str, text: &str, position: Position, warnings: &mut Vec<String>) -> String {
    match position {
        Position::Start => format!("{text}{name}"),
        Position::End => format!("{name}{text}"),
        Position::Index(index) => {
            let len = name.chars().count();
            if index > len {
                warnings.push(format!("index {index} beyond name length {len}; appended"));
            }
            let byte = name
                .char_indices()
                .nth(index)
                .map(|(byte, _)| byte)
                .unwrap_or(name.len());
            let mut out = String::with_capacity(name.len() + text.len());
            out.push_str(&name[..byte]);
            out.push_str(text);
            out.push_str(&name[byte..]);
            out
        }
    }
}

fn is_word_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '_' | '-' | '.')
}

fn transform_case(name: &str, style: CaseStyle) -> String {
    match style {
        CaseStyle::Lowercase => name.to_lowercase(),
        CaseStyle::Uppercase => name.to_uppercase(),
        CaseStyle::Titlecase => {
            let mut out = String::with_capacity(name.len());
            let mut word_start = true;
            for ch in name.chars() {
                if is_word_separator(ch) {
                    word_start = true;
                    out.push(ch);
                } else if word_start {
                    out.extend(ch.to_uppercase());
                    word_start = false;
                } else {
                    out.extend(ch.to_lowercase());
                }
            }
            out
        }
        CaseStyle::Camelcase => {
            let mut out = String::with_capacity(name.len());
            for (i, word) in split_words(name).iter().enumerate() {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    if i == 0 {
                        out.extend(first.to_lowercase());
                    } else {
                        out.extend(first.to_uppercase());
                    }
                    out.push_str(&chars.as_str().to_lowercase());
                }
            }
            out
        }
        CaseStyle::Snakecase => split_words(name)
            .iter()
            .map(|word| word.to_lowercase())
            .collect::<Vec<_>>()
            .join("_"),
    }
}

fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if is_word_separator(ch) {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
