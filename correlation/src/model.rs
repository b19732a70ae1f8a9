//! Identity of a compilable unit and its pairing with a remote compiler.

use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::matcher::CompilerMatches;
use crate::path::normalize_path;

/// Identity of one compilable unit as extracted from the local build
/// configuration. Immutable once constructed.
///
/// Equality and hashing follow the configuration identity contract: normalized
/// source path, language, language switch, normalized compiler path, compiler
/// kind, and the switch list joined order-sensitively. Two settings that agree
/// on all of these describe the same unit and share cached match state.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSettings {
    pub source_path: String,
    /// Presentable name, the file name component of `source_path`.
    pub source_name: String,
    pub language: String,
    pub language_switch: String,
    pub compiler_path: String,
    /// Compiler kind tag from the build configuration, e.g. "GCC" or "Clang".
    pub compiler_kind: String,
    pub switches: Vec<String>,
}

impl SourceSettings {
    pub fn new(
        source_path: impl Into<String>,
        language: impl Into<String>,
        language_switch: impl Into<String>,
        compiler_path: impl Into<String>,
        compiler_kind: impl Into<String>,
        switches: Vec<String>,
    ) -> Self {
        let source_path = source_path.into();
        let source_name = Path::new(&source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.clone());
        Self {
            source_path,
            source_name,
            language: language.into(),
            language_switch: language_switch.into(),
            compiler_path: compiler_path.into(),
            compiler_kind: compiler_kind.into(),
            switches,
        }
    }

    fn joined_switches(&self) -> String {
        self.switches.join(" ")
    }
}

impl PartialEq for SourceSettings {
    fn eq(&self, other: &Self) -> bool {
        normalize_path(&self.source_path) == normalize_path(&other.source_path)
            && self.language == other.language
            && self.language_switch == other.language_switch
            && normalize_path(&self.compiler_path) == normalize_path(&other.compiler_path)
            && self.compiler_kind == other.compiler_kind
            && self.joined_switches() == other.joined_switches()
    }
}

impl Eq for SourceSettings {}

impl Hash for SourceSettings {
    fn hash<H: Hasher>(&self, state: &mut H) {
        normalize_path(&self.source_path).hash(state);
        self.language.hash(state);
        self.language_switch.hash(state);
        normalize_path(&self.compiler_path).hash(state);
        self.compiler_kind.hash(state);
        self.joined_switches().hash(state);
    }
}

/// A compiler descriptor advertised by the remote service. Value-equal;
/// `lang` is the service's wire name for the language field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCompilerInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "lang")]
    pub language: String,
}

/// A source unit paired with its current remote matches. Rebuilt whenever
/// either input changes, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRemoteMatched {
    pub settings: SourceSettings,
    pub matches: CompilerMatches,
}

/// The text actually submitted for compilation: either the raw source or the
/// output of local preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessedSource {
    pub matched: SourceRemoteMatched,
    pub text: String,
}
