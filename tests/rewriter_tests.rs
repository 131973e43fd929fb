//! Integration tests for rule profiles and the rewrite stage
//!
//! These tests verify:
//! - Built-in profile behavior on realistic decompiled text
//! - Idempotence and case-insensitivity of the base profile (property-based)
//! - Rule ordering within a profile
//! - Permission-denied files are skipped without stopping siblings

use camino::{Utf8Path, Utf8PathBuf};
use patchfixer::models::{FileStatus, Rule};
use patchfixer::services::{AccessProbe, CompiledProfile, RuleRewriter, StageContext};
use patchfixer::{Metrics, RuleProfile, Stage, StateManager};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const MATERIAL: &str = r#"StaticMaterialDef {
    samplerValues: list2[embed] = {
        StaticMaterialShaderSamplerDef {
            TextureName: string = "Diffuse_Texture"
            texturePath: string = "ASSETS/Characters/Ahri/Skins/Skin0/Ahri_Base_TX_CM.dds"
        }
        StaticMaterialShaderSamplerDef {
            samplerName: string = "Mask_Texture"
            texturePath: string = "ASSETS/Shared/Mask.dds"
        }
    }
}
"#;

fn compile(profile: RuleProfile) -> CompiledProfile {
    CompiledProfile::compile(&profile).unwrap()
}

#[test]
fn test_base_profile_on_material() {
    let (out, count) = compile(RuleProfile::base()).apply(MATERIAL);

    assert_eq!(count, 1);
    assert!(out.contains(r#"texturePath: string = "Diffuse_Texture""#));
    // Sampler names are left alone by the base profile
    assert!(out.contains(r#"samplerName: string = "Mask_Texture""#));
}

#[test]
fn test_extended_profile_on_material() {
    let (out, count) = compile(RuleProfile::extended()).apply(MATERIAL);

    assert_eq!(count, 2);
    assert!(out.contains(r#"texturePath: string = "Diffuse_Texture""#));
    assert!(out.contains(r#"textureName: string = "Mask_Texture""#));
    assert!(!out.to_lowercase().contains("samplername"));
}

#[test]
fn test_every_case_variant_is_rewritten() {
    let text = "textureName: string = a\nTextureName: string = b\ntexturename: string = c\nTEXTURENAME: string = d\n";
    let (out, count) = compile(RuleProfile::base()).apply(text);

    assert_eq!(count, 4);
    assert_eq!(out.matches("texturePath: string =").count(), 4);
}

#[test]
fn test_later_rules_see_earlier_output() {
    let profile = RuleProfile::new(
        "chain",
        "",
        vec![Rule::literal("alpha", "beta"), Rule::literal("beta", "gamma")],
    );
    let (out, count) = compile(profile).apply("alpha beta");

    assert_eq!(out, "gamma gamma");
    assert_eq!(count, 3);
}

#[test]
fn test_rule_order_changes_result() {
    let forward = RuleProfile::new(
        "forward",
        "",
        vec![Rule::literal("alpha", "beta"), Rule::literal("beta", "gamma")],
    );
    let reversed = RuleProfile::new(
        "reversed",
        "",
        vec![Rule::literal("beta", "gamma"), Rule::literal("alpha", "beta")],
    );

    assert_eq!(compile(forward).apply("alpha").0, "gamma");
    assert_eq!(compile(reversed).apply("alpha").0, "beta");
}

#[test]
fn test_extended_is_not_idempotent_for_sampler_text() {
    // A sampler renamed to textureName on the first run becomes texturePath
    // on the second
    let profile = compile(RuleProfile::extended());
    let (once, _) = profile.apply(r#"samplerName: string = "x""#);
    let (twice, _) = profile.apply(&once);

    assert_eq!(once, r#"textureName: string = "x""#);
    assert_eq!(twice, r#"texturePath: string = "x""#);
}

fn material_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("textureName: string = ".to_string()),
        Just("TextureName: string = ".to_string()),
        Just("texturename: string = ".to_string()),
        Just("texturePath: string = ".to_string()),
        Just("samplerName: string = ".to_string()),
        "[a-zA-Z0-9_ :=\"./{}]{0,24}",
    ]
}

fn material_text() -> impl Strategy<Value = String> {
    prop::collection::vec(material_line(), 0..16).prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn prop_base_profile_is_idempotent(text in material_text()) {
        let profile = compile(RuleProfile::base());
        let (once, _) = profile.apply(&text);
        let (twice, count) = profile.apply(&once);

        prop_assert_eq!(&twice, &once);
        prop_assert_eq!(count, 0);
    }

    #[test]
    fn prop_any_casing_is_rewritten(upper in prop::collection::vec(any::<bool>(), 11)) {
        let name: String = "texturename"
            .chars()
            .zip(&upper)
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();
        let text = format!("{}: string = \"a.dds\"", name);

        let (out, count) = compile(RuleProfile::base()).apply(&text);

        prop_assert_eq!(count, 1);
        prop_assert_eq!(out, "texturePath: string = \"a.dds\"");
    }

    #[test]
    fn prop_no_matches_means_unchanged(text in "[a-zA-Z0-9 \n]{0,64}") {
        prop_assume!(!text.to_lowercase().contains("texturename"));
        let (out, count) = compile(RuleProfile::base()).apply(&text);

        prop_assert_eq!(count, 0);
        prop_assert_eq!(out, text);
    }

    #[test]
    fn prop_extended_leaves_converted_text_alone(
        values in prop::collection::vec("[a-zA-Z0-9_./]{0,12}", 0..8)
    ) {
        let text: String = values
            .iter()
            .map(|v| format!("texturePath: string = \"{}\"\n", v))
            .collect();
        let (out, count) = compile(RuleProfile::extended()).apply(&text);

        prop_assert_eq!(count, 0);
        prop_assert_eq!(out, text);
    }
}

/// Denies modification of files whose name contains `marker`
struct DenyListProbe {
    marker: &'static str,
}

impl AccessProbe for DenyListProbe {
    fn can_modify(&self, path: &Utf8Path) -> bool {
        !path.as_str().contains(self.marker)
    }
}

#[tokio::test]
async fn test_permission_skip_does_not_stop_siblings() {
    let temp = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

    let files: Vec<Utf8PathBuf> = ["a.py", "readonly.py", "b.py"]
        .iter()
        .map(|name| {
            let path = root.join(name);
            fs::write(&path, "textureName: string = \"x\"").unwrap();
            path
        })
        .collect();

    let state = Arc::new(StateManager::new());
    let metrics = Arc::new(Metrics::new());
    state.start_run("base");
    state.begin_stage(Stage::Rewrite, files.len());

    let rewriter = RuleRewriter::new(
        Arc::new(compile(RuleProfile::base())),
        Arc::new(DenyListProbe { marker: "readonly" }),
        StageContext::new(Arc::clone(&state), Arc::clone(&metrics), 2),
    );
    let outcomes = rewriter.apply(&files).await;

    assert_eq!(outcomes[0].status, FileStatus::Succeeded);
    assert_eq!(outcomes[1].status, FileStatus::Skipped);
    assert_eq!(outcomes[1].message, "Permission denied");
    assert_eq!(outcomes[2].status, FileStatus::Succeeded);

    assert_eq!(
        fs::read_to_string(&files[1]).unwrap(),
        "textureName: string = \"x\""
    );
    assert_eq!(
        fs::read_to_string(&files[2]).unwrap(),
        "texturePath: string = \"x\""
    );

    let tally = state.read(|s| s.summary.tally(Stage::Rewrite));
    assert_eq!(tally.succeeded, 2);
    assert_eq!(tally.skipped, 1);
    assert_eq!(
        metrics.files_skipped.load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_unmatched_file_is_not_rewritten() {
    let temp = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    let path = root.join("plain.py");
    fs::write(&path, "mesh: string = \"a\"").unwrap();
    let modified_before = fs::metadata(&path).unwrap().modified().unwrap();

    let rewriter = RuleRewriter::new(
        Arc::new(compile(RuleProfile::base())),
        Arc::new(DenyListProbe { marker: "\0" }),
        StageContext::new(Arc::new(StateManager::new()), Arc::new(Metrics::new()), 1),
    );
    let outcomes = rewriter.apply(&[path.clone()]).await;

    assert_eq!(outcomes[0].replacements, 0);
    assert_eq!(outcomes[0].message, "No matches");
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified_before);
}
