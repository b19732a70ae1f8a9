//! Matching a local toolchain against the remote compiler list.
//!
//! `match_compilers` is a pure function: no I/O, no caches, identical output
//! for identical input. Callers that want caching key it by the
//! [`SourceSettings`] value (its equality contract covers everything the
//! match depends on except the remote list itself).

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::model::{RemoteCompilerInfo, SourceSettings};

/// Quality classification of a local-to-remote compiler pairing, ordered:
/// `Exact > MinorVersionMismatch > NameOnly > NoMatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerMatchKind {
    Exact,
    MinorVersionMismatch,
    NameOnly,
    NoMatch,
}

impl CompilerMatchKind {
    fn quality(self) -> u8 {
        match self {
            Self::Exact => 3,
            Self::MinorVersionMismatch => 2,
            Self::NameOnly => 1,
            Self::NoMatch => 0,
        }
    }
}

impl Ord for CompilerMatchKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.quality().cmp(&other.quality())
    }
}

impl PartialOrd for CompilerMatchKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CompilerMatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match_kind_label(*self))
    }
}

/// Short label for a match kind, e.g. for a compiler picker entry.
pub fn match_kind_label(kind: CompilerMatchKind) -> &'static str {
    match kind {
        CompilerMatchKind::Exact => "exact match",
        CompilerMatchKind::MinorVersionMismatch => "minor version mismatch",
        CompilerMatchKind::NameOnly => "matched by name",
        CompilerMatchKind::NoMatch => "no match",
    }
}

/// Full description of a match kind, e.g. for a tooltip.
pub fn describe_match_kind(kind: CompilerMatchKind) -> String {
    match kind {
        CompilerMatchKind::Exact => "Name and version match exactly".into(),
        CompilerMatchKind::MinorVersionMismatch => {
            "Name matches, versions differ in the minor component".into()
        }
        CompilerMatchKind::NameOnly => "Only the name matches".into(),
        CompilerMatchKind::NoMatch => "No matching remote compiler".into(),
    }
}

/// One remote compiler with its classification against the local toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerMatch {
    pub info: RemoteCompilerInfo,
    pub kind: CompilerMatchKind,
}

/// The chosen match plus every classified alternative.
///
/// Invariants: `alternatives` is sorted by non-increasing quality, stable with
/// respect to remote-list order; `chosen` is the best alternative unless a
/// caller overrode it, and is always one of `alternatives` when that list is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerMatches {
    pub chosen: Option<CompilerMatch>,
    pub alternatives: Vec<CompilerMatch>,
}

impl CompilerMatches {
    pub fn empty() -> Self {
        Self {
            chosen: None,
            alternatives: Vec::new(),
        }
    }

    /// Re-chose by remote compiler id, keeping the alternatives untouched.
    /// Returns `None` when no alternative carries that id.
    pub fn with_chosen_id(&self, id: &str) -> Option<Self> {
        self.alternatives
            .iter()
            .find(|m| m.info.id == id)
            .map(|m| Self {
                chosen: Some(m.clone()),
                alternatives: self.alternatives.clone(),
            })
    }
}

/// Name and optional version token derived from a local compiler identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCompilerIdentity {
    pub name: String,
    pub version: Option<String>,
}

static VERSION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(\.\d+)*$").expect("version token pattern")
});
static TRAILING_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)[-_]?(\d+(?:\.\d+)*)$").expect("trailing version pattern")
});

/// Derive the local name/version tokens from a source unit's compiler
/// identity.
///
/// Version extraction is a per-kind capability: known kind tags give the name
/// directly, with the binary filename consulted only for a version suffix
/// (`gcc-11.2`, `clang++-15`). Unknown kinds fall back entirely to filename
/// heuristics. No universal version format is assumed beyond dot-separated
/// numeric components.
pub fn identify(settings: &SourceSettings) -> LocalCompilerIdentity {
    let kind = settings.compiler_kind.trim().to_lowercase();
    let file_name = std::path::Path::new(&settings.compiler_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let (stem_name, stem_version) = split_trailing_version(&file_name);

    match kind.as_str() {
        "gcc" | "clang" => LocalCompilerIdentity {
            name: kind,
            version: stem_version,
        },
        _ => LocalCompilerIdentity {
            name: if stem_name.is_empty() { kind } else { stem_name },
            version: stem_version,
        },
    }
}

/// Split a trailing `-11.2` / `_15` / `91` style suffix off a binary name.
fn split_trailing_version(file_name: &str) -> (String, Option<String>) {
    if let Some(caps) = TRAILING_VERSION.captures(file_name) {
        let name = caps[1].trim_end_matches(|c| c == '-' || c == '_').to_string();
        if !name.is_empty() {
            return (name, Some(caps[2].to_string()));
        }
    }
    (file_name.to_string(), None)
}

/// Split a remote compiler's advertised name into name and version tokens:
/// the last whitespace-separated token that parses as a dotted numeric
/// version is the version, the remaining tokens are the name.
fn remote_identity(advertised: &str) -> (String, Option<String>) {
    let mut tokens: Vec<&str> = advertised.split_whitespace().collect();
    let mut version = None;
    if let Some(last) = tokens.last() {
        if VERSION_TOKEN.is_match(last) {
            version = Some((*last).to_string());
            tokens.pop();
        }
    }
    (tokens.join(" ").to_lowercase(), version)
}

fn version_components(version: &str) -> Option<Vec<u64>> {
    version.split('.').map(|c| c.parse().ok()).collect()
}

/// Versions differ only in a minor component: every component equal except
/// the last, and both sides carry at least two components.
fn is_minor_mismatch(local: &[u64], remote: &[u64]) -> bool {
    local.len() == remote.len()
        && local.len() >= 2
        && local[..local.len() - 1] == remote[..remote.len() - 1]
        && local[local.len() - 1] != remote[remote.len() - 1]
}

fn classify(
    local: &LocalCompilerIdentity,
    language: &str,
    remote: &RemoteCompilerInfo,
    allow_minor_version_mismatch: bool,
) -> CompilerMatchKind {
    if !remote.language.eq_ignore_ascii_case(language) {
        return CompilerMatchKind::NoMatch;
    }
    let (remote_name, remote_version) = remote_identity(&remote.name);
    if remote_name != local.name {
        return CompilerMatchKind::NoMatch;
    }
    let (local_version, remote_version) = match (&local.version, &remote_version) {
        // With no version to compare on either side the name match stands.
        (None, _) | (_, None) => return CompilerMatchKind::Exact,
        (Some(l), Some(r)) => (l, r),
    };
    if local_version == remote_version {
        return CompilerMatchKind::Exact;
    }
    match (
        version_components(local_version),
        version_components(remote_version),
    ) {
        (Some(l), Some(r)) if l == r => CompilerMatchKind::Exact,
        (Some(l), Some(r)) if allow_minor_version_mismatch && is_minor_mismatch(&l, &r) => {
            CompilerMatchKind::MinorVersionMismatch
        }
        _ => CompilerMatchKind::NameOnly,
    }
}

/// Classify and rank the whole remote list against a local toolchain.
///
/// The result is deterministic for fixed inputs. Alternatives keep remote-list
/// order within equal quality (stable sort); the chosen match defaults to the
/// best-ranked alternative. An empty remote list yields an empty result.
pub fn match_compilers(
    settings: &SourceSettings,
    remote_list: &[RemoteCompilerInfo],
    allow_minor_version_mismatch: bool,
) -> CompilerMatches {
    if remote_list.is_empty() {
        return CompilerMatches::empty();
    }
    let local = identify(settings);
    let mut alternatives: Vec<CompilerMatch> = remote_list
        .iter()
        .map(|info| CompilerMatch {
            kind: classify(&local, &settings.language, info, allow_minor_version_mismatch),
            info: info.clone(),
        })
        .collect();
    alternatives.sort_by_key(|m| std::cmp::Reverse(m.kind.quality()));
    let chosen = alternatives.first().cloned();
    debug!(
        local = %local.name,
        version = local.version.as_deref().unwrap_or("-"),
        candidates = remote_list.len(),
        chosen = chosen.as_ref().map(|m| m.info.id.as_str()).unwrap_or("-"),
        "matched local compiler against remote list"
    );
    CompilerMatches {
        chosen,
        alternatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(compiler_path: &str, kind: &str) -> SourceSettings {
        SourceSettings::new("/w/a.cpp", "c++", "-x c++", compiler_path, kind, vec![])
    }

    fn remote(id: &str, name: &str, lang: &str) -> RemoteCompilerInfo {
        RemoteCompilerInfo {
            id: id.into(),
            name: name.into(),
            language: lang.into(),
        }
    }

    #[test]
    fn kind_ordering_follows_quality() {
        assert!(CompilerMatchKind::Exact > CompilerMatchKind::MinorVersionMismatch);
        assert!(CompilerMatchKind::MinorVersionMismatch > CompilerMatchKind::NameOnly);
        assert!(CompilerMatchKind::NameOnly > CompilerMatchKind::NoMatch);
    }

    #[test]
    fn identify_takes_name_from_kind_and_version_from_binary() {
        let id = identify(&settings("/usr/bin/gcc-11.2", "GCC"));
        assert_eq!(id.name, "gcc");
        assert_eq!(id.version.as_deref(), Some("11.2"));
    }

    #[test]
    fn identify_without_version_suffix() {
        let id = identify(&settings("/usr/bin/clang", "Clang"));
        assert_eq!(id.name, "clang");
        assert_eq!(id.version, None);
    }

    #[test]
    fn identify_unknown_kind_falls_back_to_filename() {
        let id = identify(&settings("/opt/bin/icc-2021.4", ""));
        assert_eq!(id.name, "icc");
        assert_eq!(id.version.as_deref(), Some("2021.4"));
    }

    #[test]
    fn exact_match_on_equal_name_and_version() {
        // Remote list [{id:"g1",name:"gcc 11.2",lang:"c++"}], local gcc 11.2.
        let matches = match_compilers(
            &settings("/usr/bin/gcc-11.2", "GCC"),
            &[remote("g1", "gcc 11.2", "c++")],
            false,
        );
        let chosen = matches.chosen.unwrap();
        assert_eq!(chosen.kind, CompilerMatchKind::Exact);
        assert_eq!(chosen.info.id, "g1");
    }

    #[test]
    fn minor_version_mismatch_honors_the_flag() {
        let local = settings("/usr/bin/gcc-11.1", "GCC");
        let remote_list = [remote("g1", "gcc 11.2", "c++")];

        let allowed = match_compilers(&local, &remote_list, true);
        assert_eq!(
            allowed.chosen.unwrap().kind,
            CompilerMatchKind::MinorVersionMismatch
        );

        let refused = match_compilers(&local, &remote_list, false);
        assert_eq!(refused.chosen.unwrap().kind, CompilerMatchKind::NameOnly);
    }

    #[test]
    fn major_version_difference_is_never_minor() {
        let matches = match_compilers(
            &settings("/usr/bin/gcc-10.2", "GCC"),
            &[remote("g1", "gcc 11.2", "c++")],
            true,
        );
        assert_eq!(matches.chosen.unwrap().kind, CompilerMatchKind::NameOnly);
    }

    #[test]
    fn missing_version_on_either_side_is_exact() {
        let matches = match_compilers(
            &settings("/usr/bin/gcc", "GCC"),
            &[remote("g1", "gcc 11.2", "c++")],
            false,
        );
        assert_eq!(matches.chosen.unwrap().kind, CompilerMatchKind::Exact);
    }

    #[test]
    fn different_name_is_no_match() {
        let matches = match_compilers(
            &settings("/usr/bin/gcc-11.2", "GCC"),
            &[remote("c1", "clang 11.2", "c++")],
            false,
        );
        assert_eq!(matches.chosen.unwrap().kind, CompilerMatchKind::NoMatch);
    }

    #[test]
    fn different_language_is_no_match() {
        let matches = match_compilers(
            &settings("/usr/bin/gcc-11.2", "GCC"),
            &[remote("g1", "gcc 11.2", "rust")],
            false,
        );
        assert_eq!(matches.chosen.unwrap().kind, CompilerMatchKind::NoMatch);
    }

    #[test]
    fn empty_remote_list_yields_empty_result() {
        let matches = match_compilers(&settings("/usr/bin/gcc", "GCC"), &[], false);
        assert!(matches.chosen.is_none());
        assert!(matches.alternatives.is_empty());
        assert_eq!(matches, CompilerMatches::empty());
    }

    #[test]
    fn kind_labels_are_presentable() {
        assert_eq!(match_kind_label(CompilerMatchKind::Exact), "exact match");
        assert_eq!(CompilerMatchKind::NameOnly.to_string(), "matched by name");
        assert!(describe_match_kind(CompilerMatchKind::MinorVersionMismatch).contains("minor"));
    }

    #[test]
    fn alternatives_are_ranked_and_stable() {
        let remote_list = [
            remote("other", "clang 11.2", "c++"),
            remote("old", "gcc 9.4", "c++"),
            remote("exact", "gcc 11.2", "c++"),
            remote("near", "gcc 11.1", "c++"),
        ];
        let matches = match_compilers(&settings("/usr/bin/gcc-11.2", "GCC"), &remote_list, true);
        let ids: Vec<&str> = matches
            .alternatives
            .iter()
            .map(|m| m.info.id.as_str())
            .collect();
        assert_eq!(ids, ["exact", "near", "old", "other"]);
        let kinds: Vec<CompilerMatchKind> =
            matches.alternatives.iter().map(|m| m.kind).collect();
        assert!(kinds.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(matches.chosen.unwrap().info.id, "exact");
    }

    #[test]
    fn matching_is_deterministic() {
        let remote_list = [
            remote("a", "gcc 11.2", "c++"),
            remote("b", "gcc 11.1", "c++"),
            remote("c", "clang 14.0", "c++"),
        ];
        let local = settings("/usr/bin/gcc-11.2", "GCC");
        let first = match_compilers(&local, &remote_list, true);
        let second = match_compilers(&local, &remote_list, true);
        assert_eq!(first, second);
    }

    #[test]
    fn ties_keep_remote_list_order() {
        let remote_list = [
            remote("first", "gcc 9.1", "c++"),
            remote("second", "gcc 9.2", "c++"),
        ];
        let matches = match_compilers(&settings("/usr/bin/gcc-11.2", "GCC"), &remote_list, false);
        let ids: Vec<&str> = matches
            .alternatives
            .iter()
            .map(|m| m.info.id.as_str())
            .collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn with_chosen_id_overrides_without_reordering() {
        let remote_list = [
            remote("exact", "gcc 11.2", "c++"),
            remote("near", "gcc 11.1", "c++"),
        ];
        let matches = match_compilers(&settings("/usr/bin/gcc-11.2", "GCC"), &remote_list, true);
        let overridden = matches.with_chosen_id("near").unwrap();
        assert_eq!(overridden.chosen.unwrap().info.id, "near");
        assert_eq!(overridden.alternatives, matches.alternatives);
        assert!(matches.with_chosen_id("absent").is_none());
    }
}
