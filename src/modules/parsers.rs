// CLASSIFICATION: COMMUNITY
// Filename: parsers.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Readers for `modules.alias`, `modules.dep` and module blacklists.

use crate::matcher::NameMatcher;

/// One `alias <pattern> <module>` line.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pattern: NameMatcher,
    module: String,
}

impl AliasEntry {
    pub fn pattern(&self) -> &str {
        self.pattern.name()
    }

    pub fn module(&self) -> &str {
        &self.module
    }
}

/// Split `text` into lines of tokens. Blanks separate tokens, `#` starts a
/// comment that runs to the end of the line and double quotes group blanks
/// into a token. Empty lines are dropped.
pub fn tokenize(text: &str) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut tokens = Vec::new();
        let mut cur = String::new();
        let mut in_token = false;
        let mut quoted = false;
        for c in raw.chars() {
            if quoted {
                if c == '"' {
                    quoted = false;
                } else {
                    cur.push(c);
                }
                continue;
            }
            match c {
                '"' => {
                    quoted = true;
                    in_token = true;
                }
                '#' if !in_token => break,
                ' ' | '\t' | '\r' => {
                    if in_token {
                        tokens.push(std::mem::take(&mut cur));
                        in_token = false;
                    }
                }
                _ => {
                    cur.push(c);
                    in_token = true;
                }
            }
        }
        // An unterminated quote swallows the rest of the line.
        if in_token && !quoted {
            tokens.push(cur);
        }
        if !tokens.is_empty() {
            lines.push(tokens);
        }
    }
    lines
}

/// Alias map in file order.
pub fn parse_aliases(text: &str) -> Vec<AliasEntry> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.len() >= 3)
        .map(|t| AliasEntry {
            pattern: NameMatcher::new(&t[1], true),
            module: t[2].clone(),
        })
        .collect()
}

/// Module names listed as `blacklist <module>`.
pub fn parse_blacklist(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.len() >= 2 && t[0].starts_with("blacklist"))
        .map(|t| t[1].clone())
        .collect()
}

/// The module the first matching alias names.
pub fn resolve_alias<'a>(aliases: &'a [AliasEntry], id: &str) -> Option<&'a str> {
    aliases
        .iter()
        .find(|a| a.pattern.matches(id))
        .map(|a| a.module.as_str())
}

/// Final path component of a module entry.
pub fn strip_path(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

/// Compare module names treating `-` and `_` as the same character.
pub fn same_module_name(a: &str, b: &str) -> bool {
    let norm = |c: u8| if c == b'-' { b'_' } else { c };
    a.len() == b.len()
        && a.bytes().zip(b.bytes()).all(|(x, y)| norm(x) == norm(y))
}

/// Dependency chain for `module` from `modules.dep` text: the module's own
/// entry first, then everything it needs, in file order.
pub fn look_up_dep(dep_text: &str, module: &str) -> Option<Vec<String>> {
    let wanted = format!("{module}.ko");
    dep_text.lines().find_map(|line| {
        let (head, _) = line.split_once(':')?;
        if !same_module_name(strip_path(head.trim()), &wanted) {
            return None;
        }
        Some(
            line.split(|c: char| c == ':' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    })
}

/// Module name of a chain entry, or `None` when it is not a `.ko` path.
pub fn module_name(entry: &str) -> Option<&str> {
    strip_path(entry).strip_suffix(".ko").filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIASES: &str = "# Aliases extracted from modules themselves.\n\
alias usb:v0BDAp8179d*dc*dsc*dp*icFFiscFFipFFin* r8188eu\n\
alias pci:v00008086d00002723sv*sd*bc*sc*i* iwlwifi\n\
alias usb:v1234pABCD* \"demo_drv\"\n\
alias broken\n";

    const DEP: &str = "kernel/drivers/net/wireless/iwlwifi.ko: \
kernel/net/mac80211/mac80211.ko kernel/net/wireless/cfg80211.ko\n\
kernel/net/mac80211/mac80211.ko: kernel/net/wireless/cfg80211.ko\n\
kernel/net/wireless/cfg80211.ko:\n\
kernel/drivers/usb/demo-drv.ko:\n";

    #[test]
    fn tokenizer_handles_comments_and_quotes() {
        let lines = tokenize("a b # c\n\n  \"x y\" z\t\n# only comment\n");
        assert_eq!(lines, vec![vec!["a", "b"], vec!["x y", "z"]]);
    }

    #[test]
    fn aliases_resolve_first_match() {
        let aliases = parse_aliases(ALIASES);
        assert_eq!(aliases.len(), 3);
        assert_eq!(
            resolve_alias(&aliases, "usb:v1234pABCDd0100dc00dsc00dp00ic08isc06ip50in00"),
            Some("demo_drv")
        );
        assert_eq!(
            resolve_alias(&aliases, "pci:v00008086d00002723sv00008086sd00000084bc02sc80i00"),
            Some("iwlwifi")
        );
        assert_eq!(resolve_alias(&aliases, "platform:nothing"), None);
    }

    #[test]
    fn blacklist_lines() {
        let list =
            parse_blacklist("blacklist pcspkr\nblacklist\noptions x y\nblacklist  nouveau # gpu\n");
        assert_eq!(list, vec!["pcspkr", "nouveau"]);
    }

    #[test]
    fn dep_chain_lookup() {
        let chain = look_up_dep(DEP, "iwlwifi").unwrap();
        assert_eq!(
            chain,
            vec![
                "kernel/drivers/net/wireless/iwlwifi.ko",
                "kernel/net/mac80211/mac80211.ko",
                "kernel/net/wireless/cfg80211.ko"
            ]
        );
        assert_eq!(look_up_dep(DEP, "cfg80211").unwrap().len(), 1);
        assert!(look_up_dep(DEP, "mac").is_none());
    }

    #[test]
    fn dash_and_underscore_are_equivalent() {
        assert_eq!(look_up_dep(DEP, "demo_drv").unwrap(), vec!["kernel/drivers/usb/demo-drv.ko"]);
        assert!(same_module_name("a-b_c", "a_b-c"));
        assert!(!same_module_name("ab", "abc"));
    }

    #[test]
    fn module_names() {
        assert_eq!(module_name("kernel/x/foo.ko"), Some("foo"));
        assert_eq!(module_name("foo.o"), None);
        assert_eq!(module_name(".ko"), None);
    }
}
