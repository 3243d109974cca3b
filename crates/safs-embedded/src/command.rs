//! Option grammar for service request strings
//!
//! Requests are whitespace-separated tokens. Option names match
//! case-insensitively. Values that contain spaces are written either in
//! double quotes (with `\"` and `\\` escapes) or length-prefixed as
//! `:<len>:<text>`; see [`wrap`].

use std::collections::HashMap;

/// Whether an option takes a value
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValuePolicy {
    /// Bare flag
    NotAllowed,
    /// Takes the next token unless it is another option name
    Allowed,
    /// Always takes the next token
    Required,
}

/// Errors produced while parsing a request string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Opening quote without a closing one
    #[error("Unterminated quoted string")]
    UnterminatedQuote,

    /// `:<len>:` prefix longer than the remaining input
    #[error("Length-prefixed value :{0}: runs past the end of the request")]
    InvalidLengthPrefix(usize),

    /// Option requiring a value was the last token
    #[error("Option {0} requires a value")]
    MissingValue(String),

    /// Option given more often than allowed
    #[error("Option {option} may be specified at most {max} time(s)")]
    TooManyTimes {
        /// Option name
        option: String,
        /// Allowed repetitions
        max: usize,
    },

    /// More free-standing tokens than allowed
    #[error("Unexpected token '{0}'")]
    TooManyArgs(String),

    /// Wrong number of options from a group
    #[error("Between {min} and {max} of the options {names} must be specified")]
    Group {
        /// Group members, space separated
        names: String,
        /// Minimum present
        min: usize,
        /// Maximum present
        max: usize,
    },

    /// Option present without one of the options it needs
    #[error("Option {needer} requires one of {needees}")]
    MissingNeed {
        /// The option that was given
        needer: String,
        /// The options one of which must accompany it
        needees: String,
    },
}

/// Wrap a value in length-prefixed form so it survives tokenizing intact.
pub fn wrap(value: &str) -> String {
    format!(":{}:{}", value.chars().count(), value)
}

#[derive(Debug, Clone)]
struct OptionSpec {
    name: String,
    max_times: usize,
    policy: ValuePolicy,
}

#[derive(Debug, Clone)]
struct OptionGroup {
    names: Vec<String>,
    min: usize,
    max: usize,
}

#[derive(Debug, Clone)]
struct OptionNeed {
    needers: Vec<String>,
    needees: Vec<String>,
}

#[derive(Debug)]
struct Token {
    text: String,
    /// Quoted or length-prefixed; never an option name
    literal: bool,
}

fn split_names(names: &str) -> Vec<String> {
    names.split_whitespace().map(str::to_uppercase).collect()
}

/// Declarative request parser.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    options: HashMap<String, OptionSpec>,
    groups: Vec<OptionGroup>,
    needs: Vec<OptionNeed>,
    max_args: usize,
}

impl CommandParser {
    /// Create a parser with no options and no free arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option. `max_times == 0` means unlimited repetitions.
    pub fn add_option(&mut self, name: &str, max_times: usize, policy: ValuePolicy) -> &mut Self {
        let name = name.to_uppercase();
        self.options.insert(
            name.clone(),
            OptionSpec {
                name,
                max_times,
                policy,
            },
        );
        self
    }

    /// Require between `min` and `max` of the space-separated `names`.
    pub fn add_option_group(&mut self, names: &str, min: usize, max: usize) -> &mut Self {
        self.groups.push(OptionGroup {
            names: split_names(names),
            min,
            max,
        });
        self
    }

    /// If any of `needers` is given, one of `needees` must be given too.
    pub fn add_option_need(&mut self, needers: &str, needees: &str) -> &mut Self {
        self.needs.push(OptionNeed {
            needers: split_names(needers),
            needees: split_names(needees),
        });
        self
    }

    /// Allow up to `max_args` tokens that are not options or option values.
    pub fn set_max_args(&mut self, max_args: usize) -> &mut Self {
        self.max_args = max_args;
        self
    }

    fn option(&self, token: &str) -> Option<&OptionSpec> {
        self.options.get(&token.to_uppercase())
    }

    /// Parse and validate a request string.
    pub fn parse(&self, request: &str) -> Result<ParsedCommand, ParseError> {
        let mut parsed = ParsedCommand::default();
        let mut tokens = tokenize(request)?.into_iter().peekable();

        while let Some(token) = tokens.next() {
            let spec = if token.literal { None } else { self.option(&token.text) };
            let Some(spec) = spec else {
                parsed.args.push(token.text);
                continue;
            };
            let value = match spec.policy {
                ValuePolicy::NotAllowed => String::new(),
                ValuePolicy::Required => match tokens.next() {
                    Some(value) => value.text,
                    None => return Err(ParseError::MissingValue(spec.name.clone())),
                },
                ValuePolicy::Allowed => {
                    let takes_value = tokens
                        .peek()
                        .map_or(false, |next| next.literal || self.option(&next.text).is_none());
                    if takes_value {
                        tokens.next().map(|value| value.text).unwrap_or_default()
                    } else {
                        String::new()
                    }
                }
            };
            parsed.options.push((spec.name.clone(), value));
        }

        self.validate(&parsed)?;
        Ok(parsed)
    }

    fn validate(&self, parsed: &ParsedCommand) -> Result<(), ParseError> {
        if parsed.args.len() > self.max_args {
            return Err(ParseError::TooManyArgs(parsed.args[self.max_args].clone()));
        }

        for spec in self.options.values() {
            if spec.max_times > 0 && parsed.option_times(&spec.name) > spec.max_times {
                return Err(ParseError::TooManyTimes {
                    option: spec.name.clone(),
                    max: spec.max_times,
                });
            }
        }

        for group in &self.groups {
            let present = group
                .names
                .iter()
                .filter(|name| parsed.option_times(name) > 0)
                .count();
            if present < group.min || present > group.max {
                return Err(ParseError::Group {
                    names: group.names.join(" "),
                    min: group.min,
                    max: group.max,
                });
            }
        }

        for need in &self.needs {
            let needer = need.needers.iter().find(|name| parsed.option_times(name) > 0);
            if let Some(needer) = needer {
                if !need.needees.iter().any(|name| parsed.option_times(name) > 0) {
                    return Err(ParseError::MissingNeed {
                        needer: needer.clone(),
                        needees: need.needees.join(" "),
                    });
                }
            }
        }
        Ok(())
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '"' {
            i += 1;
            let mut text = String::new();
            let mut closed = false;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() && matches!(chars[i + 1], '"' | '\\') => {
                        text.push(chars[i + 1]);
                        i += 2;
                    }
                    '"' => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    other => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote);
            }
            tokens.push(Token { text, literal: true });
            continue;
        }

        if c == ':' {
            if let Some((len, start)) = length_prefix(&chars, i) {
                let end = match start.checked_add(len) {
                    Some(end) if end <= chars.len() => end,
                    _ => return Err(ParseError::InvalidLengthPrefix(len)),
                };
                tokens.push(Token {
                    text: chars[start..end].iter().collect(),
                    literal: true,
                });
                i = end;
                continue;
            }
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push(Token {
            text: chars[start..i].iter().collect(),
            literal: false,
        });
    }
    Ok(tokens)
}

/// Parse `:<digits>:` at `at`, returning the length and the index the value starts at.
fn length_prefix(chars: &[char], at: usize) -> Option<(usize, usize)> {
    let digits_start = at + 1;
    let mut end = digits_start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start || end >= chars.len() || chars[end] != ':' {
        return None;
    }
    let len = chars[digits_start..end].iter().collect::<String>().parse().ok()?;
    Some((len, end + 1))
}

/// Result of a successful parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Options in request order, names upper-cased
    options: Vec<(String, String)>,
    args: Vec<String>,
}

impl ParsedCommand {
    /// How many times `name` was given
    pub fn option_times(&self, name: &str) -> usize {
        self.options
            .iter()
            .filter(|(option, _)| option.eq_ignore_ascii_case(name))
            .count()
    }

    /// Value of the first occurrence of `name`
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.option_value_at(name, 0)
    }

    /// Value of the `index`th occurrence of `name`
    pub fn option_value_at(&self, name: &str, index: usize) -> Option<&str> {
        self.options
            .iter()
            .filter(|(option, _)| option.eq_ignore_ascii_case(name))
            .nth(index)
            .map(|(_, value)| value.as_str())
    }

    /// Free-standing token at `index`
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Number of free-standing tokens
    pub fn num_args(&self) -> usize {
        self.args.len()
    }
}
