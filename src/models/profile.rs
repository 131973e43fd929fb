use serde::{Deserialize, Serialize};

/// Name of the built-in profile targeting patch 25.S1.3
pub const BASE_PROFILE: &str = "base";

/// Name of the built-in profile targeting patch 25.S1.4 (PBE)
pub const EXTENDED_PROFILE: &str = "extended";

/// How a rule's `find` text is interpreted
///
/// Both modes match case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// `find` is matched verbatim and `replace` is inserted verbatim
    #[default]
    Literal,
    /// `find` is a regular expression; `replace` may reference groups (`$1`, `${name}`)
    Pattern,
}

/// A single find/replace pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl Rule {
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            mode: MatchMode::Literal,
        }
    }

    pub fn pattern(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            mode: MatchMode::Pattern,
        }
    }
}

/// An ordered list of rules applied one pass per rule.
///
/// A later rule sees the text produced by every earlier rule, so order is part
/// of a profile's meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProfile {
    pub name: String,
    pub description: String,
    pub rules: Vec<Rule>,
}

impl RuleProfile {
    pub fn new(name: impl Into<String>, description: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rules,
        }
    }

    /// `textureName` -> `texturePath`
    pub fn base() -> Self {
        Self::new(BASE_PROFILE, "PatchFixer 25.S1.3", texture_rules())
    }

    /// The base rules followed by `samplerName` -> `textureName`.
    ///
    /// The sampler rules run after the texture rules, so a freshly renamed
    /// sampler is not turned into a `texturePath` within the same run.
    pub fn extended() -> Self {
        let mut rules = texture_rules();
        rules.extend(sampler_rules());
        Self::new(EXTENDED_PROFILE, "PatchFixer 25.S1.4 (PBE)", rules)
    }

    /// Built-in profiles in menu order
    pub fn builtins() -> Vec<RuleProfile> {
        vec![Self::base(), Self::extended()]
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn texture_rules() -> Vec<Rule> {
    ["textureName", "TextureName", "texturename"]
        .into_iter()
        .map(|name| Rule::literal(format!("{name}: string ="), "texturePath: string ="))
        .collect()
}

fn sampler_rules() -> Vec<Rule> {
    ["samplerName", "SamplerName", "samplername"]
        .into_iter()
        .map(|name| Rule::literal(format!("{name}: string ="), "textureName: string ="))
        .collect()
}
