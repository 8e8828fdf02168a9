// Language registry: maps a language identifier to everything needed to run
// it - a Kubernetes job template for the orchestrated backend, and a
// compile/run command pair (or interpreter invocation) for the local backend.

use std::collections::HashMap;
use std::str::FromStr;

use k8s_openapi::api::batch::v1::Job;
use serde_json::Value;

use crate::error::EngineError;
use crate::types::Language;

/// Token replaced by the submitted code when a job manifest is materialized.
/// Substitution is a literal string replacement inside exec argv elements;
/// the code never passes through a shell.
pub const CODE_PLACEHOLDER: &str = "__CODE__";

/// How the local backend runs a language.
#[derive(Debug, Clone)]
pub enum LocalCommand {
    /// Interpreter invoked with the code appended as the final argument,
    /// e.g. `python3 -c <code>`.
    Interpreted {
        program: &'static str,
        args: &'static [&'static str],
    },
    /// Source staged into a scratch directory, compiled, then executed.
    /// `compile` and `run` are full argv lists relative to the scratch dir;
    /// a leading `./` in the run program refers to the produced artifact.
    Compiled {
        source_file: &'static str,
        compile: &'static [&'static str],
        run: &'static [&'static str],
    },
}

/// Static per-language execution artifacts. Loaded once at startup,
/// read-only thereafter.
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub language: Language,
    pub job_template: Value,
    pub local: LocalCommand,
}

impl LanguageSpec {
    /// Materialize a typed Job manifest from the template: assign the unique
    /// job name and substitute `CODE_PLACEHOLDER` in container args with the
    /// submitted code, treated as an opaque literal.
    pub fn render_manifest(&self, code: &str, job_name: &str) -> Result<Job, EngineError> {
        let mut manifest = self.job_template.clone();
        if let Some(metadata) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("name".to_string(), Value::String(job_name.to_string()));
        }

        let args = manifest
            .get_mut("spec")
            .and_then(|v| v.get_mut("template"))
            .and_then(|v| v.get_mut("spec"))
            .and_then(|v| v.get_mut("containers"))
            .and_then(|v| v.get_mut(0))
            .and_then(|v| v.get_mut("args"))
            .and_then(Value::as_array_mut);
        if let Some(args) = args {
            for arg in args.iter_mut() {
                if let Some(text) = arg.as_str() {
                    if text.contains(CODE_PLACEHOLDER) {
                        *arg = Value::String(text.replace(CODE_PLACEHOLDER, code));
                    }
                }
            }
        }

        Ok(serde_json::from_value(manifest)?)
    }
}

/// Registry of supported languages.
///
/// A malformed embedded template fails `load` - misconfiguration is a
/// startup-time fatal error, never a per-request one.
pub struct LanguageRegistry {
    specs: HashMap<Language, LanguageSpec>,
}

impl LanguageRegistry {
    pub fn load() -> Result<Self, EngineError> {
        let definitions: [(Language, &str, LocalCommand); 3] = [
            (
                Language::Python,
                include_str!("templates/python.json"),
                LocalCommand::Interpreted {
                    program: "python3",
                    args: &["-c"],
                },
            ),
            (
                Language::Java,
                include_str!("templates/java.json"),
                LocalCommand::Compiled {
                    source_file: "Main.java",
                    compile: &["javac", "Main.java"],
                    run: &["java", "Main"],
                },
            ),
            (
                Language::Cpp,
                include_str!("templates/cpp.json"),
                LocalCommand::Compiled {
                    source_file: "main.cpp",
                    compile: &["g++", "main.cpp", "-o", "main"],
                    run: &["./main"],
                },
            ),
        ];

        let mut specs = HashMap::new();
        for (language, template, local) in definitions {
            let job_template: Value = serde_json::from_str(template)?;
            let spec = LanguageSpec {
                language,
                job_template,
                local,
            };
            // Trial render: a template that parses as JSON but not as a
            // typed Job must fail here, not on the first request.
            spec.render_manifest("", "startup-check")?;
            specs.insert(language, spec);
        }

        Ok(Self { specs })
    }

    /// Resolve a caller-supplied language identifier, normalized
    /// case-insensitively. Unknown identifiers fail fast before any
    /// execution side effect.
    pub fn resolve(&self, language: &str) -> Result<&LanguageSpec, EngineError> {
        let language = Language::from_str(language)?;
        self.specs
            .get(&language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))
    }

    pub fn languages(&self) -> Vec<Language> {
        self.specs.keys().copied().collect()
    }
}
