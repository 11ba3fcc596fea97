use std::collections::HashMap;

use crate::cascade::{ElementGroup, MatchedDeclaration};

#[derive(Debug, Clone, Copy)]
struct Winner {
    group: usize,
    rule: usize,
    important: bool,
}

/// Marks every declaration that loses to another rule for its property.
///
/// Groups must be in cascade order: target first, each group's rules by
/// descending specificity. The first active declaration seen for a property
/// wins unless a later one is `!important` and it is not. Disabled and
/// invalid declarations never win and are never marked overridden.
pub fn calculate_overrides(groups: &mut [ElementGroup]) {
    let winners = find_winners(groups);
    for (group_idx, group) in groups.iter_mut().enumerate() {
        for (rule_idx, rule) in group.rules.iter_mut().enumerate() {
            for decl in rule.declarations.iter_mut() {
                decl.overridden = if decl.disabled || !decl.valid {
                    false
                } else {
                    winners
                        .get(&decl.prop)
                        .is_some_and(|winner| (winner.group, winner.rule) != (group_idx, rule_idx))
                };
            }
        }
    }
}

fn find_winners(groups: &[ElementGroup]) -> HashMap<String, Winner> {
    let mut winners: HashMap<String, Winner> = HashMap::new();
    for (group_idx, group) in groups.iter().enumerate() {
        for (rule_idx, rule) in group.rules.iter().enumerate() {
            if !rule.active {
                continue;
            }
            for decl in rule.declarations.iter().filter(|decl| !decl.disabled && decl.valid) {
                let candidate = Winner {
                    group: group_idx,
                    rule: rule_idx,
                    important: decl.important,
                };
                match winners.get(&decl.prop) {
                    None => {
                        winners.insert(decl.prop.clone(), candidate);
                    }
                    Some(current) if decl.important && !current.important => {
                        winners.insert(decl.prop.clone(), candidate);
                    }
                    Some(_) => {}
                }
            }
        }
    }
    winners
}

/// The declaration that takes effect for `prop`, if any.
pub fn winning_declaration<'a>(groups: &'a [ElementGroup], prop: &str) -> Option<&'a MatchedDeclaration> {
    let winner = *find_winners(groups).get(prop)?;
    groups
        .get(winner.group)?
        .rules
        .get(winner.rule)?
        .declarations
        .iter()
        .rev()
        .find(|decl| {
            decl.prop == prop && !decl.disabled && decl.valid && decl.important == winner.important
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{DeclarationId, MatchedRule, RuleUid};
    use crate::selector::{Specificity, selector_specificity};
    use crate::types::{LogicId, Origin};

    fn rule(id: u64, selector: &str, decls: &[(&str, &str, bool)]) -> MatchedRule {
        MatchedRule {
            uid: RuleUid::Logic(LogicId(id)),
            selector: selector.to_string(),
            declarations: decls
                .iter()
                .enumerate()
                .map(|(idx, (name, value, important))| {
                    MatchedDeclaration::new(
                        DeclarationId::Logic(LogicId(id * 100 + idx as u64)),
                        name,
                        value.to_string(),
                        *important,
                    )
                })
                .collect(),
            specificity: selector_specificity(selector),
            context: Vec::new(),
            active: true,
            origin: Origin::OnPage,
            source_name: "style".to_string(),
            readonly: false,
            line: None,
        }
    }

    fn group(is_target: bool, mut rules: Vec<MatchedRule>) -> ElementGroup {
        rules.sort_by(|a, b| b.specificity.cmp(&a.specificity));
        ElementGroup {
            is_target,
            tag_name: "p".to_string(),
            id: None,
            class_name: String::new(),
            rules,
        }
    }

    fn overridden(groups: &[ElementGroup], selector: &str) -> Vec<bool> {
        groups
            .iter()
            .flat_map(|group| group.rules.iter())
            .find(|rule| rule.selector == selector)
            .map(|rule| rule.declarations.iter().map(|decl| decl.overridden).collect())
            .unwrap_or_default()
    }

    #[test]
    fn higher_specificity_wins() {
        let mut groups = vec![group(
            true,
            vec![rule(1, ".x", &[("color", "red", false)]), rule(2, "#y", &[("color", "blue", false)])],
        )];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, "#y"), vec![false]);
        assert_eq!(overridden(&groups, ".x"), vec![true]);
        assert_eq!(winning_declaration(&groups, "color").map(|d| d.value.as_str()), Some("blue"));
    }

    #[test]
    fn important_beats_specificity() {
        let mut groups = vec![group(
            true,
            vec![rule(1, ".x", &[("color", "red", true)]), rule(2, "#y", &[("color", "blue", false)])],
        )];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, ".x"), vec![false]);
        assert_eq!(overridden(&groups, "#y"), vec![true]);
        assert_eq!(winning_declaration(&groups, "color").map(|d| d.value.as_str()), Some("red"));
    }

    #[test]
    fn equal_important_keeps_the_first_seen() {
        let mut groups = vec![group(
            true,
            vec![rule(1, ".a", &[("color", "red", true)]), rule(2, ".b", &[("color", "blue", true)])],
        )];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, ".a"), vec![false]);
        assert_eq!(overridden(&groups, ".b"), vec![true]);
    }

    #[test]
    fn disabled_declarations_never_win() {
        let mut groups = vec![group(true, vec![rule(1, ".x", &[("--disabled-color", "red", false)])])];
        calculate_overrides(&mut groups);
        let decl = &groups[0].rules[0].declarations[0];
        assert!(decl.disabled);
        assert!(!decl.overridden);
        assert!(winning_declaration(&groups, "color").is_none());

        let mut groups = vec![group(
            true,
            vec![
                rule(1, "#x", &[("--disabled-color", "red", true)]),
                rule(2, "p", &[("color", "blue", false)]),
            ],
        )];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, "p"), vec![false]);
        assert_eq!(overridden(&groups, "#x"), vec![false]);
    }

    #[test]
    fn invalid_declarations_never_win() {
        let mut groups = vec![group(
            true,
            vec![
                rule(1, "#x", &[("width", "banana", true), ("*zoom", "1", false)]),
                rule(2, "p", &[("width", "10px", false)]),
            ],
        )];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, "#x"), vec![false, false]);
        assert_eq!(overridden(&groups, "p"), vec![false]);
        assert!(!groups[0].rules[0].declarations[0].valid);
        assert_eq!(winning_declaration(&groups, "width").map(|d| d.value.as_str()), Some("10px"));
    }

    #[test]
    fn inactive_rules_do_not_compete() {
        let mut inactive = rule(1, "#y", &[("color", "blue", false)]);
        inactive.active = false;
        let mut groups = vec![group(true, vec![inactive, rule(2, ".x", &[("color", "red", false)])])];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, ".x"), vec![false]);
        assert_eq!(overridden(&groups, "#y"), vec![true]);
    }

    #[test]
    fn target_declarations_outrank_inherited_ones() {
        let mut groups = vec![
            group(true, vec![rule(1, "p", &[("color", "red", false)])]),
            group(false, vec![rule(2, "#wrap", &[("color", "blue", false), ("font-size", "2em", false)])]),
        ];
        calculate_overrides(&mut groups);
        assert_eq!(overridden(&groups, "p"), vec![false]);
        assert_eq!(overridden(&groups, "#wrap"), vec![true, false]);
    }

    #[test]
    fn same_rule_on_target_and_ancestor_competes_separately() {
        let shared = rule(1, "div", &[("color", "red", false)]);
        let mut groups = vec![group(true, vec![shared.clone()]), group(false, vec![shared])];
        calculate_overrides(&mut groups);
        assert!(!groups[0].rules[0].declarations[0].overridden);
        assert!(groups[1].rules[0].declarations[0].overridden);
        assert_eq!(groups[0].rules[0].specificity, Specificity(0, 0, 0, 1));
    }
}
