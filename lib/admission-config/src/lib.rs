//! Loading typed configuration from files and the environment.
#![deny(missing_docs)]

use std::{borrow::Cow, path::Path};

use admission_error::GenericError;
use figment::{error::Kind, Figment};
use serde::Deserialize;
use snafu::Snafu;
use tracing::debug;

mod provider;
use self::provider::ResolvedProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Field had a different data type than expected.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration: {}", source))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl ConfigurationError {
    fn from_figment(env_prefix: Option<&str>, e: figment::Error) -> Self {
        match e.kind {
            Kind::MissingField(field) => {
                let help_text = match env_prefix {
                    Some(prefix) => format!("Try setting `{}` or `{}{}`.", field, prefix, field.to_uppercase()),
                    None => format!("Try setting `{}`.", field),
                };
                Self::MissingField { help_text, field }
            }
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e.into() },
        }
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources take precedence in the order they are added: later sources override values from earlier ones. Once all
/// sources are added, the merged configuration is deserialized with [`into_typed`][Self::into_typed].
///
/// # Supported sources
///
/// - YAML file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    env_prefix: Option<String>,
    providers: Vec<ResolvedProvider>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = ResolvedProvider::from_yaml(&path).map_err(|e| ConfigurationError::Generic { source: e.into() })?;
        debug!(file_path = %path.as_ref().display(), "Loaded YAML configuration file.");
        self.providers.push(provider);
        Ok(self)
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `ADMISSION`, the variable `ADMISSION_LISTEN_ADDRESS` sets the `listen_address` field.
    ///
    /// The prefix is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        let provider =
            ResolvedProvider::from_environment(&prefix).map_err(|e| ConfigurationError::Generic { source: e.into() })?;
        self.providers.push(provider);
        self.env_prefix = Some(prefix);
        Ok(self)
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// ## Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<'a, T>(self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        let env_prefix = self.env_prefix;
        self.providers
            .iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider))
            .extract()
            .map_err(|e| ConfigurationError::from_figment(env_prefix.as_deref(), e))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        name: String,
        #[serde(default)]
        port: u16,
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn typed_from_yaml() {
        let file = yaml_file("name: receiver\nport: 6969\n");

        let config: TestConfig = ConfigurationLoader::default()
            .from_yaml(file.path())
            .unwrap()
            .into_typed()
            .unwrap();
        assert_eq!(
            config,
            TestConfig {
                name: "receiver".to_string(),
                port: 6969
            }
        );
    }

    #[test]
    fn missing_yaml_is_an_error() {
        assert!(matches!(
            ConfigurationLoader::default().from_yaml("/nonexistent/admission.yaml"),
            Err(ConfigurationError::Generic { .. })
        ));
    }

    #[test]
    fn environment_overrides_yaml() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ADMCFGTEST_PORT", "7070");
            let file = yaml_file("name: receiver\nport: 6969\n");

            let config: TestConfig = ConfigurationLoader::default()
                .from_yaml(file.path())
                .unwrap()
                .from_environment("admcfgtest")
                .unwrap()
                .into_typed()
                .unwrap();
            assert_eq!(config.port, 7070);
            assert_eq!(config.name, "receiver");
            Ok(())
        });
    }

    #[test]
    fn empty_prefix() {
        assert!(matches!(
            ConfigurationLoader::default().from_environment(""),
            Err(ConfigurationError::EmptyPrefix)
        ));
    }

    #[test]
    fn missing_field_help_mentions_environment() {
        figment::Jail::expect_with(|_| {
            let err = ConfigurationLoader::default()
                .from_environment("ADMCFGMISSING")
                .unwrap()
                .into_typed::<TestConfig>()
                .unwrap_err();

            match err {
                ConfigurationError::MissingField { field, help_text } => {
                    assert_eq!(field, "name");
                    assert!(help_text.contains("ADMCFGMISSING_NAME"), "{}", help_text);
                }
                other => panic!("unexpected error: {}", other),
            }
            Ok(())
        });
    }

    #[test]
    fn invalid_field_type() {
        let file = yaml_file("name: receiver\nport: [1, 2]\n");

        let err = ConfigurationLoader::default()
            .from_yaml(file.path())
            .unwrap()
            .into_typed::<TestConfig>()
            .unwrap_err();
        assert!(
            matches!(err, ConfigurationError::InvalidFieldType { ref field, .. } if field == "port"),
            "unexpected error: {}",
            err
        );
    }
}
