use crate::models::profile::{Rule, RuleProfile};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User configuration from PatchFixer Config.yaml
///
/// Holds tool locations, runtime knobs and any user-defined rule profiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "PatchFixer_Settings", default)]
    pub settings: Settings,

    #[serde(rename = "Profiles", default)]
    pub profiles: IndexMap<String, ProfileDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "Manager Process", default = "default_manager_process")]
    pub manager_process: String,

    #[serde(rename = "Extractor EXE", default = "default_extractor_exe")]
    pub extractor_exe: String,

    #[serde(rename = "Repacker EXE", default = "default_repacker_exe")]
    pub repacker_exe: String,

    #[serde(rename = "Converter EXE", default = "default_converter_exe")]
    pub converter_exe: String,

    #[serde(rename = "Hash Directory", default = "default_hash_directory")]
    pub hash_directory: String,

    #[serde(rename = "Hash Base URL", default = "default_hash_base_url")]
    pub hash_base_url: String,

    /// 0 means "use available parallelism"
    #[serde(rename = "Max Parallel Tasks", default)]
    pub max_parallel_tasks: usize,

    /// Seconds; 0 disables the timeout
    #[serde(rename = "Tool Timeout", default)]
    pub tool_timeout: u64,

    #[serde(rename = "Strict Hashes", default)]
    pub strict_hashes: bool,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manager_process: default_manager_process(),
            extractor_exe: default_extractor_exe(),
            repacker_exe: default_repacker_exe(),
            converter_exe: default_converter_exe(),
            hash_directory: default_hash_directory(),
            hash_base_url: default_hash_base_url(),
            max_parallel_tasks: 0,
            tool_timeout: 0,
            strict_hashes: false,
            debug_mode: false,
        }
    }
}

impl Settings {
    pub fn hash_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.hash_directory)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout > 0).then(|| Duration::from_secs(self.tool_timeout))
    }
}

fn default_manager_process() -> String {
    "cslol-manager".to_string()
}

fn default_extractor_exe() -> String {
    "OtherTools/hashes/wad-extract.exe".to_string()
}

fn default_repacker_exe() -> String {
    "OtherTools/hashes/wad-make.exe".to_string()
}

fn default_converter_exe() -> String {
    "OtherTools/ritobin_cli.exe".to_string()
}

fn default_hash_directory() -> String {
    "OtherTools/hashes".to_string()
}

fn default_hash_base_url() -> String {
    "https://raw.communitydragon.org/data/hashes/lol/".to_string()
}

/// A user-defined profile as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDefinition {
    #[serde(default)]
    pub description: String,
    pub rules: Vec<Rule>,
}

impl UserConfig {
    /// Built-in profiles followed by user profiles.
    ///
    /// A user profile sharing a built-in's name replaces it in place.
    pub fn profiles(&self) -> Vec<RuleProfile> {
        let mut profiles = RuleProfile::builtins();

        for (name, definition) in &self.profiles {
            let profile = RuleProfile::new(
                name.clone(),
                if definition.description.is_empty() {
                    name.clone()
                } else {
                    definition.description.clone()
                },
                definition.rules.clone(),
            );

            match profiles.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
        }

        profiles
    }
}
