use std::fmt;

use crate::types::PseudoState;

/// `(inline, ids, classes/attributes/pseudo-classes, types/pseudo-elements)`,
/// compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Specificity(pub u32, pub u32, pub u32, pub u32);

impl Specificity {
    pub const ZERO: Specificity = Specificity(0, 0, 0, 0);
    /// Outranks every tuple a stylesheet selector can produce.
    pub const INLINE: Specificity = Specificity(1, 0, 0, 0);

    pub fn as_array(&self) -> [u32; 4] {
        [self.0, self.1, self.2, self.3]
    }

    fn plus(self, other: Specificity) -> Specificity {
        Specificity(
            self.0 + other.0,
            self.1 + other.1,
            self.2 + other.2,
            self.3 + other.3,
        )
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.0, self.1, self.2, self.3)
    }
}

const LEGACY_PSEUDO_ELEMENTS: [&str; 4] = ["before", "after", "first-line", "first-letter"];

/// Splits a selector list on top-level commas.
pub fn split_selector_list(selector: &str) -> Vec<String> {
    let chars: Vec<char> = selector.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '"' | '\'' => {
                i = skip_string(&chars, i);
                continue;
            }
            '(' | '[' => {
                i = skip_block(&chars, i);
                continue;
            }
            ',' => {
                push_part(&chars[start..i], &mut parts);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < chars.len() {
        push_part(&chars[start..], &mut parts);
    }
    parts
}

fn push_part(chars: &[char], parts: &mut Vec<String>) {
    let part: String = chars.iter().collect();
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}

/// Specificity of a selector list: the highest among its selectors.
pub fn selector_specificity(selector: &str) -> Specificity {
    split_selector_list(selector)
        .iter()
        .map(|part| complex_specificity(part))
        .max()
        .unwrap_or(Specificity::ZERO)
}

fn complex_specificity(selector: &str) -> Specificity {
    let chars: Vec<char> = selector.chars().collect();
    let mut spec = Specificity::ZERO;
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '#' => {
                spec.1 += 1;
                i = skip_ident(&chars, i + 1);
            }
            '.' => {
                spec.2 += 1;
                i = skip_ident(&chars, i + 1);
            }
            '[' => {
                spec.2 += 1;
                i = skip_block(&chars, i);
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    spec.3 += 1;
                    let name_end = skip_ident(&chars, i + 2);
                    let name: String = chars[i + 2..name_end].iter().collect();
                    let (args, next) = read_arguments(&chars, name_end);
                    // ::slotted() and ::cue() take a selector; ::part() takes names.
                    if let Some(args) = args.as_deref() {
                        if matches!(name.to_ascii_lowercase().as_str(), "slotted" | "cue") {
                            spec = spec.plus(selector_specificity(args));
                        }
                    }
                    i = next;
                    continue;
                }
                let name_end = skip_ident(&chars, i + 1);
                let name: String = chars[i + 1..name_end].iter().collect();
                let (args, next) = read_arguments(&chars, name_end);
                spec = spec.plus(pseudo_class_specificity(
                    &name.to_ascii_lowercase(),
                    args.as_deref(),
                ));
                i = next;
            }
            c if is_ident_start(c) => {
                let end = skip_ident(&chars, i);
                // `ns|type`: the namespace prefix carries no weight
                if chars.get(end) == Some(&'|') && chars.get(end + 1) != Some(&'=') {
                    i = end + 1;
                    continue;
                }
                spec.3 += 1;
                i = end;
            }
            _ => i += 1,
        }
    }
    spec
}

fn pseudo_class_specificity(name: &str, args: Option<&str>) -> Specificity {
    match name {
        "where" => Specificity::ZERO,
        "not" | "is" | "matches" | "any" | "-webkit-any" | "-moz-any" | "has" => {
            args.map(selector_specificity).unwrap_or(Specificity::ZERO)
        }
        "nth-child" | "nth-last-child" => {
            let mut spec = Specificity(0, 0, 1, 0);
            if let Some(args) = args {
                let lowered = args.to_ascii_lowercase();
                if let Some(idx) = lowered.find(" of ") {
                    spec = spec.plus(selector_specificity(&args[idx + 4..]));
                }
            }
            spec
        }
        "host" | "host-context" => {
            Specificity(0, 0, 1, 0).plus(args.map(selector_specificity).unwrap_or_default())
        }
        _ if LEGACY_PSEUDO_ELEMENTS.contains(&name) => Specificity(0, 0, 0, 1),
        _ => Specificity(0, 0, 1, 0),
    }
}

/// Dynamic pseudo-states referenced anywhere in the selector, including
/// inside functional pseudo-classes.
pub fn dynamic_states(selector: &str) -> Vec<PseudoState> {
    let chars: Vec<char> = selector.chars().collect();
    let mut states = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' | '\'' => i = skip_string(&chars, i),
            '[' => i = skip_block(&chars, i),
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    i = skip_ident(&chars, i + 2);
                    continue;
                }
                let end = skip_ident(&chars, i + 1);
                let name: String = chars[i + 1..end].iter().collect();
                if let Some(state) = PseudoState::from_name(&name) {
                    if !states.contains(&state) {
                        states.push(state);
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    states
}

/// Removes top-level dynamic pseudo-states and pseudo-elements so the
/// remainder can be handed to a plain element matcher. A compound left empty
/// becomes `*`.
pub fn strip_pseudos(selector: &str) -> String {
    let chars: Vec<char> = selector.chars().collect();
    let mut out = String::with_capacity(selector.len());
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\\' => {
                out.push(ch);
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                }
                i += 2;
            }
            '"' | '\'' => {
                let end = skip_string(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '[' | '(' => {
                let end = skip_block(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' => {
                let double = chars.get(i + 1) == Some(&':');
                let name_start = if double { i + 2 } else { i + 1 };
                let name_end = skip_ident(&chars, name_start);
                let name = chars[name_start..name_end]
                    .iter()
                    .collect::<String>()
                    .to_ascii_lowercase();
                let (_, after) = read_arguments(&chars, name_end);
                let strip = double
                    || PseudoState::from_name(&name).is_some()
                    || LEGACY_PSEUDO_ELEMENTS.contains(&name.as_str());
                if strip {
                    let compound_empty = out
                        .chars()
                        .last()
                        .map(|c| c.is_whitespace() || matches!(c, '>' | '+' | '~'))
                        .unwrap_or(true);
                    if compound_empty {
                        out.push('*');
                    }
                } else {
                    out.extend(&chars[i..after]);
                }
                i = after;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out.trim().to_string()
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || ch == '\\' || !ch.is_ascii()
}

fn skip_ident(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' {
            i += 2;
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            i += 1;
        } else {
            break;
        }
    }
    i.min(chars.len())
}

fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn skip_block(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '"' | '\'' => {
                i = skip_string(chars, i);
                continue;
            }
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

fn read_arguments(chars: &[char], pos: usize) -> (Option<String>, usize) {
    if chars.get(pos) != Some(&'(') {
        return (None, pos);
    }
    let end = skip_block(chars, pos);
    let inner_end = if end > pos + 1 && chars.get(end - 1) == Some(&')') {
        end - 1
    } else {
        end
    };
    (Some(chars[pos + 1..inner_end].iter().collect()), end)
}
