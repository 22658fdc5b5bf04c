/// Supported Languages - Closed Lookup Table
///
/// Every language the platform can run is a variant of [`Language`]. The
/// image, file name and shell command for a language come from a `match`
/// over the enum, so adding a language is an exhaustiveness concern and a
/// parsed `Language` can always be executed.
///
/// Wire form is upper case (`PYTHON`, `CPP`, ...). Parsing is
/// case-insensitive and accepts the short aliases clients send (`js`, `ts`,
/// `c++`).
use crate::error::RunwayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    #[serde(alias = "python", alias = "py")]
    Python,
    #[serde(alias = "javascript", alias = "js")]
    JavaScript,
    #[serde(alias = "typescript", alias = "ts")]
    TypeScript,
    #[serde(alias = "c")]
    C,
    #[serde(alias = "cpp", alias = "c++")]
    Cpp,
    #[serde(alias = "java")]
    Java,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::C,
        Language::Cpp,
        Language::Java,
    ];

    /// Upper-case wire name, as stored with a submission
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "PYTHON",
            Language::JavaScript => "JAVASCRIPT",
            Language::TypeScript => "TYPESCRIPT",
            Language::C => "C",
            Language::Cpp => "CPP",
            Language::Java => "JAVA",
        }
    }

    /// Lower-case slug used for image tags, config keys and container names
    pub fn slug(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    /// Default container image
    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "python:3.12-alpine",
            Language::JavaScript => "node:22-alpine",
            Language::TypeScript => "runway-typescript:latest",
            Language::C | Language::Cpp => "gcc:13.3",
            Language::Java => "eclipse-temurin:21-jdk-alpine",
        }
    }

    /// Sandbox memory ceiling in MiB. The JVM and the C++/TypeScript
    /// toolchains do not start in the 64 MiB that suits the interpreters.
    pub fn default_memory_mb(&self) -> u32 {
        match self {
            Language::Java => 256,
            Language::TypeScript | Language::Cpp => 128,
            Language::Python | Language::JavaScript | Language::C => 64,
        }
    }

    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    /// Name the source file must carry inside the sandbox.
    /// Java requires the public class and file name to agree.
    pub fn file_name(&self) -> String {
        match self {
            Language::Java => "Main.java".to_string(),
            _ => format!("script.{}", self.extension()),
        }
    }

    /// Shell command run from the sandbox working directory.
    /// Build artifacts go to /tmp so the working directory can stay read-only
    /// for the sandbox user.
    pub fn command(&self) -> String {
        let file = self.file_name();
        match self {
            Language::Python => format!("python3 {}", file),
            Language::JavaScript => format!("node {}", file),
            Language::TypeScript => format!("ts-node {}", file),
            Language::C => format!("gcc {} -o /tmp/script && /tmp/script", file),
            Language::Cpp => format!("g++ {} -o /tmp/script && /tmp/script", file),
            Language::Java => format!("javac -d /tmp {} && java -cp /tmp Main", file),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Language {
    type Err = RunwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            _ => Err(RunwayError::UnsupportedLanguage(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PYTHON".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("Js".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
    }

    #[test]
    fn test_unsupported_language() {
        let err = "cobol".parse::<Language>().unwrap_err();
        assert!(matches!(err, RunwayError::UnsupportedLanguage(ref l) if l == "cobol"));
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }

    #[test]
    fn test_every_language_round_trips_its_wire_name() {
        for language in Language::ALL {
            assert_eq!(language.as_str().parse::<Language>().unwrap(), language);
            let json = serde_json::to_string(&language).unwrap();
            assert_eq!(json, format!("\"{}\"", language.as_str()));
        }
    }

    #[test]
    fn test_serde_accepts_lowercase_aliases() {
        let language: Language = serde_json::from_str("\"cpp\"").unwrap();
        assert_eq!(language, Language::Cpp);
    }

    #[test]
    fn test_heavier_toolchains_get_more_memory() {
        assert_eq!(Language::Python.default_memory_mb(), 64);
        assert_eq!(Language::Cpp.default_memory_mb(), 128);
        assert_eq!(Language::TypeScript.default_memory_mb(), 128);
        assert_eq!(Language::Java.default_memory_mb(), 256);
    }

    #[test]
    fn test_java_uses_main_class_file() {
        assert_eq!(Language::Java.file_name(), "Main.java");
        assert!(Language::Java.command().contains("java -cp /tmp Main"));
        assert_eq!(Language::Python.file_name(), "script.py");
        assert_eq!(Language::Python.command(), "python3 script.py");
    }
}
