//! Database configuration and connection identity construction.
//!
//! Two configurations that normalize to the same connection string share a
//! single underlying connection, so the string built here doubles as the
//! cache key in the [`ConnectionRegistry`](crate::registry::ConnectionRegistry).

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

use crate::error::{DaoError, DaoResult};

/// Characters escaped in the userinfo section of the connection string.
/// Everything outside the URI unreserved set is percent-encoded so that
/// credentials cannot corrupt the identity's structure.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Authentication mechanisms accepted in a [`DbConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMechanism {
    /// Let the server negotiate the mechanism.
    #[default]
    Default,
    /// MONGODB-CR (legacy challenge-response).
    MongodbCr,
    /// SCRAM-SHA-1.
    ScramSha1,
    /// SCRAM-SHA-256.
    ScramSha256,
}

impl AuthMechanism {
    /// All recognized values, in canonical spelling.
    pub const ALL: [&'static str; 4] = ["DEFAULT", "MONGODB-CR", "SCRAM-SHA-1", "SCRAM-SHA-256"];

    /// Canonical spelling used in the connection string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::MongodbCr => "MONGODB-CR",
            Self::ScramSha1 => "SCRAM-SHA-1",
            Self::ScramSha256 => "SCRAM-SHA-256",
        }
    }

    /// Parse a configured value, rejecting anything outside the allow-list.
    pub fn parse(value: &str) -> DaoResult<Self> {
        match value {
            "DEFAULT" => Ok(Self::Default),
            "MONGODB-CR" => Ok(Self::MongodbCr),
            "SCRAM-SHA-1" => Ok(Self::ScramSha1),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            _ => Err(DaoError::config(format!(
                "database config 'authMechanism' must be one of {}",
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// Read preferences accepted in a [`DbConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// Read from primary only.
    #[default]
    Primary,
    /// Read from primary preferred, fallback to secondary.
    PrimaryPreferred,
    /// Read from secondary only.
    Secondary,
    /// Read from secondary preferred, fallback to primary.
    SecondaryPreferred,
    /// Read from nearest member.
    Nearest,
}

impl ReadPreference {
    /// All recognized values, in canonical spelling.
    pub const ALL: [&'static str; 5] = [
        "primary",
        "primaryPreferred",
        "secondary",
        "secondaryPreferred",
        "nearest",
    ];

    /// Canonical spelling used in the connection string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }

    /// Parse a configured value, rejecting anything outside the allow-list.
    pub fn parse(value: &str) -> DaoResult<Self> {
        match value {
            "primary" => Ok(Self::Primary),
            "primaryPreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondaryPreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            _ => Err(DaoError::config(format!(
                "when specified, database config 'readPreference' must be one of {}",
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// Database connection options.
///
/// `auth_mechanism` and `read_preference` are kept as the raw configured
/// strings and validated when the connection string is built, so a config
/// loaded from an external source fails with a descriptive error naming the
/// allowed set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbOptions {
    /// Database name.
    pub database: String,
    /// Username; an empty string means unauthenticated.
    pub username: String,
    /// Password.
    pub password: String,
    /// Authentication mechanism, one of [`AuthMechanism::ALL`].
    pub auth_mechanism: Option<String>,
    /// Read preference, one of [`ReadPreference::ALL`].
    pub read_preference: Option<String>,
    /// Replica set name.
    pub replica_set: Option<String>,
}

/// Database configuration: options plus one `host:port` uri per server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    /// Connection options.
    pub options: DbOptions,
    /// Server addresses, `host:port`. Multiple entries form a multi-host
    /// connection string (replica sets).
    pub uris: Vec<String>,
}

impl DbConfig {
    /// Build the canonical connection string for this configuration.
    ///
    /// Format: `[user:pass@]host1,host2/database[?authMechanism=X][&readPreference=Y][&replicaSet=Z]`.
    ///
    /// The output is deterministic and order-stable, so identical configs
    /// always normalize to identical identities. Fails with a
    /// [`DaoError::Config`] when an enumerated option is not recognized.
    pub fn connection_string(&self) -> DaoResult<String> {
        let auth_mechanism = match self.options.auth_mechanism.as_deref() {
            Some(value) => Some(AuthMechanism::parse(value)?),
            None => None,
        };
        let read_preference = match self.options.read_preference.as_deref() {
            Some(value) => Some(ReadPreference::parse(value)?),
            None => None,
        };

        let mut identity = String::new();

        let authenticated = !self.options.username.is_empty();
        if authenticated {
            identity.push_str(&utf8_percent_encode(&self.options.username, USERINFO).to_string());
            identity.push(':');
            identity.push_str(&utf8_percent_encode(&self.options.password, USERINFO).to_string());
            identity.push('@');
        }

        identity.push_str(&self.uris.join(","));
        identity.push('/');
        identity.push_str(&self.options.database);

        let mut params = Vec::new();
        if authenticated {
            let mechanism = auth_mechanism.unwrap_or_default();
            params.push(format!("authMechanism={}", mechanism.as_str()));
        }
        if let Some(preference) = read_preference {
            params.push(format!("readPreference={}", preference.as_str()));
        }
        if let Some(replica_set) = &self.options.replica_set {
            params.push(format!("replicaSet={replica_set}"));
        }
        if !params.is_empty() {
            identity.push('?');
            identity.push_str(&params.join("&"));
        }

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(username: &str, password: &str, uris: &[&str]) -> DbConfig {
        DbConfig {
            options: DbOptions {
                database: "dao_test".to_string(),
                username: username.to_string(),
                password: password.to_string(),
                ..Default::default()
            },
            uris: uris.iter().map(|uri| uri.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_server_without_credentials() {
        let config = config("", "", &["127.0.0.1:27017"]);
        assert_eq!(
            config.connection_string().unwrap(),
            "127.0.0.1:27017/dao_test"
        );
    }

    #[test]
    fn test_single_server_with_credentials() {
        let config = config("usr", "pwd", &["127.0.0.1:27017"]);
        assert_eq!(
            config.connection_string().unwrap(),
            "usr:pwd@127.0.0.1:27017/dao_test?authMechanism=DEFAULT"
        );
    }

    #[test]
    fn test_multiple_servers() {
        let config = config("usr", "pwd", &["127.0.0.1:27017", "127.0.0.2:27018"]);
        assert_eq!(
            config.connection_string().unwrap(),
            "usr:pwd@127.0.0.1:27017,127.0.0.2:27018/dao_test?authMechanism=DEFAULT"
        );
    }

    #[test]
    fn test_credentials_are_percent_encoded() {
        let config = config("us@r", "p:w/d", &["127.0.0.1:27017"]);
        assert_eq!(
            config.connection_string().unwrap(),
            "us%40r:p%3Aw%2Fd@127.0.0.1:27017/dao_test?authMechanism=DEFAULT"
        );
    }

    #[test]
    fn test_every_auth_mechanism() {
        for mechanism in AuthMechanism::ALL {
            let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
            config.options.auth_mechanism = Some(mechanism.to_string());
            assert_eq!(
                config.connection_string().unwrap(),
                format!("usr:pwd@127.0.0.1:27017/dao_test?authMechanism={mechanism}")
            );
        }
    }

    #[test]
    fn test_invalid_auth_mechanism() {
        let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
        config.options.auth_mechanism = Some("some_invalid_auth_mechanism".to_string());
        let err = config.connection_string().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: database config 'authMechanism' must be one of \
             DEFAULT, MONGODB-CR, SCRAM-SHA-1, SCRAM-SHA-256"
        );
    }

    #[test]
    fn test_auth_mechanism_omitted_without_credentials() {
        let mut config = config("", "", &["127.0.0.1:27017"]);
        config.options.auth_mechanism = Some("SCRAM-SHA-1".to_string());
        // No credentials, no auth clause; the value is still validated.
        assert_eq!(
            config.connection_string().unwrap(),
            "127.0.0.1:27017/dao_test"
        );
    }

    #[test]
    fn test_every_read_preference() {
        for preference in ReadPreference::ALL {
            let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
            config.options.read_preference = Some(preference.to_string());
            assert_eq!(
                config.connection_string().unwrap(),
                format!(
                    "usr:pwd@127.0.0.1:27017/dao_test?authMechanism=DEFAULT&readPreference={preference}"
                )
            );
        }
    }

    #[test]
    fn test_invalid_read_preference() {
        let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
        config.options.read_preference = Some("some_invalid_read_preference".to_string());
        let err = config.connection_string().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: when specified, database config 'readPreference' must be one of \
             primary, primaryPreferred, secondary, secondaryPreferred, nearest"
        );
    }

    #[test]
    fn test_read_preference_without_credentials() {
        let mut config = config("", "", &["127.0.0.1:27017"]);
        config.options.read_preference = Some("nearest".to_string());
        assert_eq!(
            config.connection_string().unwrap(),
            "127.0.0.1:27017/dao_test?readPreference=nearest"
        );
    }

    #[test]
    fn test_replica_set() {
        let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
        config.options.replica_set = Some("replica_set_name".to_string());
        assert_eq!(
            config.connection_string().unwrap(),
            "usr:pwd@127.0.0.1:27017/dao_test?authMechanism=DEFAULT&replicaSet=replica_set_name"
        );
    }

    #[test]
    fn test_identity_is_deterministic() {
        let mut config = config("usr", "pwd", &["127.0.0.1:27017"]);
        config.options.read_preference = Some("secondary".to_string());
        config.options.replica_set = Some("rs0".to_string());
        assert_eq!(
            config.connection_string().unwrap(),
            config.connection_string().unwrap()
        );
    }

    #[test]
    fn test_deserialize_camel_case() {
        let config: DbConfig = serde_json::from_value(serde_json::json!({
            "options": {
                "database": "d",
                "username": "",
                "password": "",
                "readPreference": "primary"
            },
            "uris": ["h:1"]
        }))
        .unwrap();
        assert_eq!(config.options.read_preference.as_deref(), Some("primary"));
        assert_eq!(config.connection_string().unwrap(), "h:1/d?readPreference=primary");
    }
}
