//! Layered resolution: defaults, file, environment, command line, prompts.

use super::Configuration;
use super::Environment;
use super::field::{ConfigField, FieldValue, Requirement, Source};
use super::prompt::{ConsolePrompter, Prompter};
use super::sources::{self, LayerEntry};
use super::validate;
use crate::credentials::{CredentialGenerator, CredentialRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use warden_shared::constants::{defaults, envs};
use warden_shared::{ValidationReport, Violation, WardenError, WardenResult};

/// A value and the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: FieldValue,
    pub source: Source,
}

/// Builds a [`Configuration`] from every configured layer.
pub struct ConfigResolver {
    file: Option<PathBuf>,
    env: BTreeMap<String, String>,
    overrides: Vec<(ConfigField, FieldValue)>,
    prompter: Option<Box<dyn Prompter>>,
}

impl ConfigResolver {
    /// Resolver reading the process environment, no file, no prompts.
    pub fn new() -> Self {
        let env = std::env::vars()
            .filter(|(key, _)| key.starts_with(envs::FIELD_PREFIX))
            .collect();
        Self {
            file: None,
            env,
            overrides: Vec::new(),
            prompter: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment snapshot.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Highest-precedence value, typically from a command-line flag.
    pub fn with_override(mut self, field: ConfigField, value: FieldValue) -> Self {
        self.overrides.push((field, value));
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Enable console prompts when `allowed` and a terminal is attached.
    pub fn interactive(mut self, allowed: bool) -> Self {
        if allowed && let Some(console) = ConsolePrompter::attended() {
            self.prompter = Some(Box::new(console));
        }
        self
    }

    /// Layer every source and validate what is present.
    ///
    /// Generatable secrets may still be missing afterwards; every other
    /// required field must be present. All violations are reported together.
    pub fn collect(&self) -> WardenResult<ConfigDraft> {
        let mut layers = Layers::default();
        let mut report = ValidationReport::new();

        for field in ConfigField::ALL {
            if let Some(value) = field.default_value() {
                layers.set(field, value, Source::Default);
            }
        }

        if let Some(path) = &self.file {
            match sources::read_file(path) {
                Ok(entries) => layers.apply(entries, Source::File),
                Err(violation) => report.push(violation),
            }
        }

        layers.apply(sources::read_env(&self.env), Source::Environment);

        let overrides: Vec<LayerEntry> = self
            .overrides
            .iter()
            .map(|(field, value)| (*field, Ok(value.clone())))
            .collect();
        layers.apply(overrides, Source::CommandLine);

        if let Some(prompter) = &self.prompter {
            self.prompt_missing(prompter.as_ref(), &mut layers)?;
        }

        report.extend(layers.validate(false));
        report.into_result()?;

        tracing::debug!(
            fields = layers.values.len(),
            file = ?self.file,
            "Collected configuration"
        );
        Ok(ConfigDraft {
            values: layers.values,
        })
    }

    /// Collect, then generate missing secrets and build the configuration.
    pub fn resolve(&self, generator: &mut CredentialGenerator) -> WardenResult<Configuration> {
        self.collect()?.finalize(generator)
    }

    fn prompt_missing(&self, prompter: &dyn Prompter, layers: &mut Layers) -> WardenResult<()> {
        for field in ConfigField::ALL {
            let Some(question) = field.prompt() else {
                continue;
            };
            if layers.values.contains_key(&field) || layers.errors.contains_key(&field) {
                continue;
            }
            if let Some(raw) = prompter.ask(field, question)? {
                layers.apply(vec![(field, FieldValue::parse(field, &raw))], Source::Prompt);
            }
        }
        Ok(())
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Layers {
    values: BTreeMap<ConfigField, Entry>,
    /// Unparsable values; a later layer with a valid value clears them.
    errors: BTreeMap<ConfigField, String>,
}

impl Layers {
    fn set(&mut self, field: ConfigField, value: FieldValue, source: Source) {
        self.errors.remove(&field);
        self.values.insert(field, Entry { value, source });
    }

    fn apply(&mut self, entries: Vec<LayerEntry>, source: Source) {
        for (field, parsed) in entries {
            match parsed {
                Ok(value) => self.set(field, value, source),
                Err(message) => {
                    self.values.remove(&field);
                    self.errors.insert(field, message);
                }
            }
        }
    }

    fn validate(&self, complete: bool) -> ValidationReport {
        validate_entries(&self.values, &self.errors, complete)
    }
}

/// Presence, then format, then policy, for every field.
fn validate_entries(
    values: &BTreeMap<ConfigField, Entry>,
    errors: &BTreeMap<ConfigField, String>,
    complete: bool,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for field in ConfigField::ALL {
        if let Some(message) = errors.get(&field) {
            report.push(Violation::new(field.key(), message.clone()));
            continue;
        }
        match values.get(&field) {
            None => {
                let required = match field.requirement() {
                    Requirement::Required => true,
                    Requirement::Generated => complete,
                    Requirement::Optional => false,
                };
                if required {
                    report.push(Violation::new(
                        field.key(),
                        format!(
                            "is required (set `{}` in the config file or {})",
                            field.key(),
                            field.env_var()
                        ),
                    ));
                }
            }
            Some(entry) => {
                if let Err(rejection) = validate::check(field, &entry.value) {
                    report.push(Violation::new(field.key(), rejection.message()));
                }
            }
        }
    }
    report
}

/// Validated configuration whose generatable secrets may still be unset.
#[derive(Debug, Clone)]
pub struct ConfigDraft {
    values: BTreeMap<ConfigField, Entry>,
}

impl ConfigDraft {
    pub fn get(&self, field: ConfigField) -> Option<&FieldValue> {
        self.values.get(&field).map(|entry| &entry.value)
    }

    pub fn source(&self, field: ConfigField) -> Option<Source> {
        self.values.get(&field).map(|entry| entry.source)
    }

    fn text_or(&self, field: ConfigField, fallback: &str) -> String {
        self.get(field)
            .and_then(FieldValue::as_text)
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn install_id(&self) -> String {
        self.text_or(ConfigField::InstallId, defaults::INSTALL_ID)
    }

    pub fn service_user(&self) -> String {
        self.text_or(ConfigField::ServiceUser, defaults::SERVICE_USER)
    }

    pub fn environment(&self) -> Environment {
        Environment::from_str(&self.text_or(ConfigField::Environment, defaults::ENVIRONMENT))
            .unwrap_or_default()
    }

    pub fn install_dir(&self) -> PathBuf {
        PathBuf::from(self.text_or(ConfigField::InstallDir, defaults::INSTALL_DIR))
    }

    pub fn skip_checks(&self) -> bool {
        matches!(self.get(ConfigField::SkipChecks), Some(FieldValue::Flag(true)))
    }

    /// Secret fields nobody supplied yet.
    pub fn missing_secrets(&self) -> Vec<ConfigField> {
        ConfigField::ALL
            .into_iter()
            .filter(|field| field.requirement() == Requirement::Generated)
            .filter(|field| !self.values.contains_key(field))
            .collect()
    }

    /// Fill unset secrets from a previously written credential record.
    ///
    /// Returns how many fields were filled. A record from another install is
    /// a conflict; a record value that no longer passes policy is rejected.
    pub fn apply_credential_record(&mut self, record: &CredentialRecord) -> WardenResult<usize> {
        let install_id = self.install_id();
        if record.install_id != install_id {
            return Err(WardenError::StateConflict(format!(
                "credential record belongs to install '{}', not '{}'; \
                 run `warden reset --purge-credentials` to discard it",
                record.install_id, install_id
            )));
        }

        let mut report = ValidationReport::new();
        let mut applied = 0;
        for field in ConfigField::ALL.into_iter().filter(|f| f.is_secret()) {
            if self.values.contains_key(&field) {
                continue;
            }
            let Some(secret) = record.get(field.key()) else {
                continue;
            };
            let value = FieldValue::Secret(secret.clone());
            if let Err(rejection) = validate::check(field, &value) {
                report.push(Violation::new(
                    field.key(),
                    format!("stored credential rejected: {}", rejection.message()),
                ));
                continue;
            }
            self.values.insert(
                field,
                Entry {
                    value,
                    source: Source::CredentialRecord,
                },
            );
            applied += 1;
        }
        report.into_result()?;

        tracing::debug!(applied, "Applied credential record");
        Ok(applied)
    }

    /// Generate every missing generatable secret and build the configuration.
    pub fn finalize(mut self, generator: &mut CredentialGenerator) -> WardenResult<Configuration> {
        for field in self.missing_secrets() {
            let Some(policy) = field.policy() else {
                continue;
            };
            let secret = generator.secret(&policy);
            tracing::info!(field = %field, secret = %secret, "Generated secret");
            self.values.insert(
                field,
                Entry {
                    value: FieldValue::Secret(secret),
                    source: Source::Generated,
                },
            );
        }

        validate_entries(&self.values, &BTreeMap::new(), true).into_result()?;
        Configuration::from_entries(self.values)
    }

    /// Non-default values as `WARDEN_*` variables for the re-executed process.
    ///
    /// Secrets are included in cleartext; pass only through the environment
    /// of the hand-off, never log.
    pub fn handoff_env(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter(|(_, entry)| entry.source != Source::Default)
            .map(|(field, entry)| (field.env_var(), entry.value.render()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Secret;
    use parking_lot::Mutex;
    use std::io::Write;

    fn base_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("WARDEN_HOST_ADDRESS", "10.0.0.5"),
            ("WARDEN_DOMAIN", "misp.example.org"),
            ("WARDEN_ADMIN_EMAIL", "soc@example.org"),
            ("WARDEN_ADMIN_ORG", "Example SOC"),
        ]
    }

    struct ScriptedPrompter {
        answers: BTreeMap<ConfigField, String>,
        asked: Mutex<Vec<ConfigField>>,
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&self, field: ConfigField, _question: &str) -> WardenResult<Option<String>> {
            self.asked.lock().push(field);
            Ok(self.answers.get(&field).cloned())
        }
    }

    #[test]
    fn test_three_bad_fields_reported_together() {
        let resolver = ConfigResolver::new().with_env(vec![
            ("WARDEN_HOST_ADDRESS", "10.0.0.5"),
            ("WARDEN_DOMAIN", "not_a_domain"),
            ("WARDEN_ADMIN_ORG", "Example SOC"),
            ("WARDEN_ADMIN_PASSWORD", "Ab1!"),
        ]);

        let err = resolver.collect().unwrap_err();
        let WardenError::Configuration(report) = err else {
            panic!("expected configuration error");
        };
        assert_eq!(report.len(), 3);
        assert!(report.mentions("admin_password"));
        assert!(report.mentions("domain"));
        assert!(report.mentions("admin_email"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "domain: file.example.org\nadmin_org: From File").unwrap();

        let draft = ConfigResolver::new()
            .with_file(file.path())
            .with_env(base_env())
            .collect()
            .unwrap();

        assert_eq!(
            draft.get(ConfigField::Domain),
            Some(&FieldValue::Text("misp.example.org".into()))
        );
        assert_eq!(draft.source(ConfigField::Domain), Some(Source::Environment));
        assert_eq!(draft.source(ConfigField::InstallDir), Some(Source::Default));
    }

    #[test]
    fn test_valid_later_layer_clears_earlier_type_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "domain: [not, a, string]").unwrap();

        let draft = ConfigResolver::new()
            .with_file(file.path())
            .with_env(base_env())
            .collect();
        assert!(draft.is_ok());
    }

    #[test]
    fn test_type_error_is_not_also_reported_missing() {
        let mut env = base_env();
        env.retain(|(k, _)| *k != "WARDEN_DOMAIN");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "domain: [a, b]").unwrap();

        let err = ConfigResolver::new()
            .with_file(file.path())
            .with_env(env)
            .collect()
            .unwrap_err();
        let WardenError::Configuration(report) = err else {
            panic!("expected configuration error");
        };
        assert_eq!(report.len(), 1);
        assert!(report.violations()[0].message.contains("expected a string"));
    }

    #[test]
    fn test_missing_secrets_are_generated_on_finalize() {
        let draft = ConfigResolver::new().with_env(base_env()).collect().unwrap();
        assert_eq!(draft.missing_secrets().len(), 3);

        let config = draft.finalize(&mut CredentialGenerator::seeded(3)).unwrap();
        assert_eq!(config.admin_password().len(), 24);
        assert_eq!(config.signing_passphrase().len(), 32);
        assert!(config.encryption_key().is_none());
        assert_eq!(
            config.source(ConfigField::AdminPassword),
            Some(Source::Generated)
        );
    }

    #[test]
    fn test_prompts_fill_only_unset_fields() {
        let mut answers = BTreeMap::new();
        answers.insert(ConfigField::AdminEmail, "soc@example.org".to_string());
        let prompter = ScriptedPrompter {
            answers,
            asked: Mutex::new(Vec::new()),
        };

        let mut env = base_env();
        env.retain(|(k, _)| *k != "WARDEN_ADMIN_EMAIL");
        let resolver = ConfigResolver::new()
            .with_env(env)
            .with_prompter(Box::new(prompter));
        let draft = resolver.collect().unwrap();

        assert_eq!(draft.source(ConfigField::AdminEmail), Some(Source::Prompt));
        // Blank secret answers leave them for generation.
        assert_eq!(draft.missing_secrets().len(), 3);
    }

    #[test]
    fn test_credential_record_fills_unset_secrets() {
        let mut draft = ConfigResolver::new().with_env(base_env()).collect().unwrap();
        let mut record = CredentialRecord::new("default");
        record.insert("admin_password", Secret::new("Stored-Pass-123"), None);

        assert_eq!(draft.apply_credential_record(&record).unwrap(), 1);
        assert_eq!(
            draft.source(ConfigField::AdminPassword),
            Some(Source::CredentialRecord)
        );
    }

    #[test]
    fn test_credential_record_from_other_install_conflicts() {
        let mut draft = ConfigResolver::new().with_env(base_env()).collect().unwrap();
        let record = CredentialRecord::new("other");
        let err = draft.apply_credential_record(&record).unwrap_err();
        assert!(matches!(err, WardenError::StateConflict(_)));
    }

    #[test]
    fn test_handoff_env_round_trips() {
        let resolver = ConfigResolver::new()
            .with_env(base_env())
            .with_override(ConfigField::SkipChecks, FieldValue::Flag(true));
        let draft = resolver.collect().unwrap();
        let env = draft.handoff_env();

        assert!(env.contains(&("WARDEN_SKIP_CHECKS".to_string(), "true".to_string())));
        assert!(!env.iter().any(|(k, _)| k == "WARDEN_INSTALL_DIR"));

        let again = ConfigResolver::new().with_env(env).collect().unwrap();
        assert_eq!(again.get(ConfigField::Domain), draft.get(ConfigField::Domain));
        assert!(again.skip_checks());
    }
}
